//! Input validation and sanitization
//!
//! Everything typed at a prompt or passed on the command line goes through
//! here before it is parsed, and nothing reaches nft unvalidated.

/// Strips control characters and surrounding whitespace from raw input.
///
/// # Examples
///
/// ```
/// use nftassist::validators::sanitize_input;
///
/// assert_eq!(sanitize_input("  22\r\n"), "22");
/// assert_eq!(sanitize_input("80\u{1b}[A,443"), "80[A,443");
/// ```
pub fn sanitize_input(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Validates a single port number.
///
/// # Errors
///
/// Returns `Err` if port is 0 (reserved).
pub fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        Err("Port must be between 1 and 65535".to_string())
    } else {
        Ok(port)
    }
}

/// Validates a port range.
///
/// # Errors
///
/// Returns `Err` if:
/// - Either port is 0
/// - Start port is greater than end port
pub fn validate_port_range(start: u16, end: u16) -> Result<(u16, u16), String> {
    validate_port(start)?;
    validate_port(end)?;

    if start > end {
        Err("Start port must be less than or equal to end port".to_string())
    } else {
        Ok((start, end))
    }
}

/// Validates a protocol name nft will see verbatim.
///
/// Names are 1-16 characters of lowercase ASCII letters, digits and `-`.
/// Anything else could change the meaning of the generated command.
///
/// # Errors
///
/// Returns `Err` for empty, overlong, or out-of-alphabet names.
pub fn validate_protocol_name(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("Protocol name cannot be empty".to_string());
    }
    if name.len() > 16 {
        return Err("Protocol name too long (max 16 characters)".to_string());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("Protocol name may only contain a-z, 0-9 and '-'".to_string());
    }
    Ok(name.to_string())
}

/// Validates a table or chain name from the configuration.
///
/// nft identifiers start with a letter and continue with letters, digits,
/// `_` or `-`.
///
/// # Errors
///
/// Returns `Err` if the name is empty, longer than 64 bytes, or not an
/// identifier.
pub fn validate_object_name(name: &str) -> Result<String, String> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err("Name cannot be empty".to_string()),
        Some(c) if !c.is_ascii_alphabetic() => {
            return Err("Name must start with a letter".to_string());
        }
        Some(_) => {}
    }
    if name.len() > 64 {
        return Err("Name too long (max 64 characters)".to_string());
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-')) {
        return Err("Name may only contain letters, digits, '_' and '-'".to_string());
    }
    Ok(name.to_string())
}

/// Validates the table family. Only families where `ip daddr` matches
/// are accepted.
///
/// # Errors
///
/// Returns `Err` for anything but `ip` or `inet`.
pub fn validate_family(family: &str) -> Result<String, String> {
    match family {
        "ip" | "inet" => Ok(family.to_string()),
        _ => Err(format!("Unsupported family '{family}' (use ip or inet)")),
    }
}

/// Checks if a port is well-known and returns informational message.
///
/// This is informational only and does not block the rule.
pub fn check_well_known_port(port: u16) -> Option<String> {
    if port <= 1024 {
        let name = match port {
            22 => "SSH",
            80 => "HTTP",
            443 => "HTTPS",
            53 => "DNS",
            25 => "SMTP",
            21 => "FTP",
            110 => "POP3",
            143 => "IMAP",
            _ => return Some(format!("Privileged port {port}")),
        };
        Some(format!("Port {port}: {name}"))
    } else {
        match port {
            3306 => Some("Port 3306: MySQL".to_string()),
            3389 => Some("Port 3389: RDP".to_string()),
            5432 => Some("Port 5432: PostgreSQL".to_string()),
            27017 => Some("Port 27017: MongoDB".to_string()),
            _ => None,
        }
    }
}

/// Checks if an address is in a reserved range and returns informational warning.
///
/// This is informational only and does not block the rule.
pub fn check_reserved_ip(ip: std::net::Ipv4Addr) -> Option<String> {
    if ip.is_unspecified() {
        return Some("0.0.0.0 - matches nothing as a single address".to_string());
    }
    if ip.is_private() {
        return Some("Private IP range (RFC 1918) - usually safe for LAN".to_string());
    }
    if ip.is_loopback() {
        return Some("Loopback range (127.x) - traffic never leaves this host".to_string());
    }
    if ip.is_link_local() {
        return Some("Link-local range (169.254.x.x) - APIPA addresses".to_string());
    }
    if ip.is_multicast() {
        return Some("Multicast range (224.0.0.0/4)".to_string());
    }
    None
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_sanitize_input_no_control_chars(input in "\\PC*|[\\x00-\\x1f]*") {
            let sanitized = sanitize_input(&input);
            prop_assert!(!sanitized.chars().any(char::is_control));
            prop_assert_eq!(sanitized.trim(), sanitized.as_str());
        }

        #[test]
        fn test_validate_port_rejects_zero(port in any::<u16>()) {
            let result = validate_port(port);
            if port == 0 {
                prop_assert!(result.is_err());
            } else {
                prop_assert_eq!(result.unwrap(), port);
            }
        }

        #[test]
        fn test_validate_port_range_consistency(
            start in 1u16..=65535,
            end in 1u16..=65535
        ) {
            let result = validate_port_range(start, end);
            prop_assert_eq!(result.is_ok(), start <= end);
        }

        #[test]
        fn test_valid_protocol_names_accepted(name in "[a-z0-9-]{1,16}") {
            prop_assert!(validate_protocol_name(&name).is_ok());
        }

        #[test]
        fn test_protocol_name_rejects_foreign_chars(
            prefix in "[a-z]{1,8}",
            bad in "[^a-z0-9-]"
        ) {
            let name = format!("{prefix}{bad}");
            prop_assert!(validate_protocol_name(&name).is_err());
        }
    }
}
