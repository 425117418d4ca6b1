//! Port specification parsing
//!
//! Accepts the three forms an operator types at the port prompt:
//!
//! - a single port: `22`
//! - an inclusive range: `8080-8090`
//! - a comma-separated list of the two above: `80,443,8000-8100`
//!
//! List entries are not de-duplicated; overlap is left to the caller.

use crate::core::error::{Error, Result};
use crate::validators::{validate_port, validate_port_range};
use std::fmt;
use std::str::FromStr;

/// One element of a port list: a single port or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortUnit {
    Single(u16),
    Range(u16, u16),
}

impl PortUnit {
    /// Parses one `digits` or `digits-digits` token.
    ///
    /// `original` is the full operator input, echoed back in errors.
    fn parse_token(token: &str, original: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(Error::invalid_port(original, "empty port entry"));
        }

        if let Some((low, high)) = token.split_once('-') {
            if high.contains('-') {
                return Err(Error::invalid_port(
                    original,
                    format!("malformed range '{token}', use start-end"),
                ));
            }
            let low = parse_port_number(low.trim(), original)?;
            let high = parse_port_number(high.trim(), original)?;
            let (low, high) =
                validate_port_range(low, high).map_err(|e| Error::invalid_port(original, e))?;
            return Ok(PortUnit::Range(low, high));
        }

        parse_port_number(token, original).map(PortUnit::Single)
    }

    /// Rendered in nft syntax: `22` or `8080-8090`
    pub fn to_nft(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PortUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortUnit::Single(port) => write!(f, "{port}"),
            PortUnit::Range(low, high) => write!(f, "{low}-{high}"),
        }
    }
}

/// Validated port specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    Single(u16),
    Range(u16, u16),
    List(Vec<PortUnit>),
}

impl PortSpec {
    /// Parses operator port text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPort`] if a token is not numeric, a value is
    /// outside 1-65535, or a range has its start above its end.
    pub fn parse(input: &str) -> Result<Self> {
        let text = input.trim();
        if text.is_empty() {
            return Err(Error::invalid_port(input, "input cannot be empty"));
        }

        if text.contains(',') {
            let units = text
                .split(',')
                .map(|token| PortUnit::parse_token(token.trim(), input))
                .collect::<Result<Vec<_>>>()?;
            return Ok(PortSpec::List(units));
        }

        Ok(match PortUnit::parse_token(text, input)? {
            PortUnit::Single(port) => PortSpec::Single(port),
            PortUnit::Range(low, high) => PortSpec::Range(low, high),
        })
    }

    /// Flattens the spec into the units that each become one rule.
    pub fn units(&self) -> Vec<PortUnit> {
        match self {
            PortSpec::Single(port) => vec![PortUnit::Single(*port)],
            PortSpec::Range(low, high) => vec![PortUnit::Range(*low, *high)],
            PortSpec::List(units) => units.clone(),
        }
    }
}

impl FromStr for PortSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units: Vec<String> = self.units().iter().map(ToString::to_string).collect();
        write!(f, "{}", units.join(","))
    }
}

fn parse_port_number(token: &str, original: &str) -> Result<u16> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid_port(
            original,
            format!("'{token}' is not a number"),
        ));
    }

    // Digit strings longer than u16 can hold are simply out of range
    let value: u16 = token
        .parse()
        .map_err(|_| Error::invalid_port(original, "port must be between 1 and 65535"))?;

    validate_port(value).map_err(|e| Error::invalid_port(original, e))
}
