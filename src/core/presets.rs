//! Preset services
//!
//! A preset bundles the (protocol, ports) pairs a common application needs.
//! The table is static so the compiler stays a plain lookup; adding a
//! service means adding a variant and a row.

use crate::core::firewall::Protocol;

/// Named services offered in preset mode
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum PresetService {
    #[strum(serialize = "web")]
    Web,
    #[strum(serialize = "ssh")]
    Ssh,
    #[strum(serialize = "mail")]
    Mail,
    #[strum(serialize = "database")]
    Database,
    #[strum(serialize = "ftp")]
    Ftp,
    #[strum(serialize = "dns")]
    Dns,
}

/// One row of the preset table
#[derive(Debug)]
pub struct PresetDefinition {
    pub service: PresetService,
    pub label: &'static str,
    /// Expanded in order: every port of the first pair, then the next pair
    pub entries: &'static [(Protocol, &'static [u16])],
}

pub static PRESETS: &[PresetDefinition] = &[
    PresetDefinition {
        service: PresetService::Web,
        label: "Web (HTTP/HTTPS)",
        entries: &[(Protocol::Tcp, &[80, 443])],
    },
    PresetDefinition {
        service: PresetService::Ssh,
        label: "SSH (TCP 22)",
        entries: &[(Protocol::Tcp, &[22])],
    },
    PresetDefinition {
        service: PresetService::Mail,
        label: "Mail (SMTP/POP3/IMAP)",
        entries: &[(Protocol::Tcp, &[25, 110, 143, 993, 995])],
    },
    PresetDefinition {
        service: PresetService::Database,
        label: "Database (MySQL/PostgreSQL/MongoDB)",
        entries: &[(Protocol::Tcp, &[3306, 5432, 27017])],
    },
    PresetDefinition {
        service: PresetService::Ftp,
        label: "File transfer (FTP)",
        entries: &[(Protocol::Tcp, &[21])],
    },
    PresetDefinition {
        service: PresetService::Dns,
        label: "DNS (TCP/UDP 53)",
        entries: &[(Protocol::Tcp, &[53]), (Protocol::Udp, &[53])],
    },
];

impl PresetService {
    pub fn definition(self) -> &'static PresetDefinition {
        PRESETS
            .iter()
            .find(|def| def.service == self)
            .unwrap_or_else(|| unreachable!("every PresetService has a PRESETS row"))
    }

    /// Flattened (protocol, port) pairs in compile order
    pub fn expand(self) -> Vec<(Protocol, u16)> {
        self.definition()
            .entries
            .iter()
            .flat_map(|(protocol, ports)| ports.iter().map(move |port| (*protocol, *port)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_every_service_has_definition() {
        for service in PresetService::iter() {
            let def = service.definition();
            assert_eq!(def.service, service);
            assert!(!def.entries.is_empty());
        }
        assert_eq!(PRESETS.len(), PresetService::iter().count());
    }

    #[test]
    fn test_mail_expansion() {
        assert_eq!(
            PresetService::Mail.expand(),
            vec![
                (Protocol::Tcp, 25),
                (Protocol::Tcp, 110),
                (Protocol::Tcp, 143),
                (Protocol::Tcp, 993),
                (Protocol::Tcp, 995),
            ]
        );
    }

    #[test]
    fn test_dns_expansion() {
        assert_eq!(
            PresetService::Dns.expand(),
            vec![(Protocol::Tcp, 53), (Protocol::Udp, 53)]
        );
    }

    #[test]
    fn test_preset_ports_are_valid() {
        for def in PRESETS {
            for (protocol, ports) in def.entries {
                assert!(protocol.carries_ports());
                assert!(ports.iter().all(|p| *p != 0));
            }
        }
    }

    #[test]
    fn test_service_from_str() {
        assert_eq!("DNS".parse::<PresetService>().unwrap(), PresetService::Dns);
        assert!("smtp".parse::<PresetService>().is_err());
    }
}
