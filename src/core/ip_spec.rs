//! IPv4 match specification parsing
//!
//! Empty input means "any address". Otherwise the text is one of
//! `a.b.c.d`, `a.b.c.d-a.b.c.d`, or `a.b.c.d/n`. Hostnames are never
//! resolved and IPv6 literals are rejected.

use crate::core::error::{Error, Result};
use ipnetwork::Ipv4Network;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Rendered form of [`IpSpec::Any`]
pub const ANY_IPV4: &str = "0.0.0.0/0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpSpec {
    #[default]
    Any,
    Single(Ipv4Addr),
    /// Inclusive; `low <= high` as 32-bit integers
    Range(Ipv4Addr, Ipv4Addr),
    Cidr(Ipv4Network),
}

impl IpSpec {
    /// Parses operator address text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIp`] for malformed octets or separators, a
    /// prefix above 32, or a range whose start is above its end.
    pub fn parse(input: &str) -> Result<Self> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(IpSpec::Any);
        }

        if text.contains(':') {
            return Err(Error::invalid_ip(input, "IPv6 addresses are not supported"));
        }

        if let Some((low, high)) = text.split_once('-') {
            if high.contains('-') {
                return Err(Error::invalid_ip(
                    input,
                    "malformed range, use start-end (e.g. 192.168.1.0-192.168.1.255)",
                ));
            }
            let low = parse_addr(low.trim(), input)?;
            let high = parse_addr(high.trim(), input)?;
            if u32::from(low) > u32::from(high) {
                return Err(Error::invalid_ip(
                    input,
                    "range start must not be above range end",
                ));
            }
            return Ok(IpSpec::Range(low, high));
        }

        if let Some((addr, prefix)) = text.split_once('/') {
            let addr = parse_addr(addr.trim(), input)?;
            let prefix = prefix.trim();
            if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::invalid_ip(input, "prefix length must be a number"));
            }
            let prefix: u8 = prefix
                .parse()
                .map_err(|_| Error::invalid_ip(input, "prefix length must be 0-32"))?;
            let network = Ipv4Network::new(addr, prefix)
                .map_err(|_| Error::invalid_ip(input, "prefix length must be 0-32"))?;
            return Ok(IpSpec::Cidr(network));
        }

        parse_addr(text, input).map(IpSpec::Single)
    }

    /// Text used in the `ip daddr` clause
    pub fn to_nft(&self) -> String {
        match self {
            IpSpec::Any => ANY_IPV4.to_string(),
            IpSpec::Single(addr) => addr.to_string(),
            IpSpec::Range(low, high) => format!("{low}-{high}"),
            IpSpec::Cidr(network) => format!("{}/{}", network.ip(), network.prefix()),
        }
    }

    /// First address the spec names, used for informational hints
    pub fn first_addr(&self) -> Option<Ipv4Addr> {
        match self {
            IpSpec::Any => None,
            IpSpec::Single(addr) | IpSpec::Range(addr, _) => Some(*addr),
            IpSpec::Cidr(network) => Some(network.ip()),
        }
    }
}

impl FromStr for IpSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for IpSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_nft())
    }
}

fn parse_addr(token: &str, original: &str) -> Result<Ipv4Addr> {
    token.parse::<Ipv4Addr>().map_err(|_| {
        Error::invalid_ip(
            original,
            format!("'{token}' is not a dotted IPv4 address"),
        )
    })
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_any_dotted_quad_parses(a in any::<u8>(), b in any::<u8>(), c in any::<u8>(), d in any::<u8>()) {
            let text = format!("{a}.{b}.{c}.{d}");
            prop_assert_eq!(IpSpec::parse(&text).unwrap(), IpSpec::Single(Ipv4Addr::new(a, b, c, d)));
        }

        #[test]
        fn test_prefix_bound(prefix in 0u32..=64) {
            let result = IpSpec::parse(&format!("10.0.0.0/{prefix}"));
            prop_assert_eq!(result.is_ok(), prefix <= 32);
        }

        #[test]
        fn test_range_order(low in any::<u32>(), high in any::<u32>()) {
            let text = format!("{}-{}", Ipv4Addr::from(low), Ipv4Addr::from(high));
            prop_assert_eq!(IpSpec::parse(&text).is_ok(), low <= high);
        }
    }
}
