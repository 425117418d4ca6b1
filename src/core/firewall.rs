//! Rule intent types shared by the compiler, indexer and deletion planner
//!
//! A [`RuleIntent`] is what the operator asked for. It is built per
//! operation and never stored. Compiling it yields [`NftCommand`]s, which
//! are also what the deletion planner produces.
//!
//! # Example
//!
//! ```
//! use nftassist::core::firewall::{Action, ChainRef, Protocol, ProtocolSpec, RuleIntent};
//! use nftassist::core::ip_spec::IpSpec;
//! use nftassist::core::port_spec::PortSpec;
//!
//! let intent = RuleIntent {
//!     action: Action::Drop,
//!     protocol: ProtocolSpec::Named(Protocol::Tcp),
//!     ports: Some(PortSpec::parse("5667").unwrap()),
//!     ip: IpSpec::Any,
//! };
//! let commands = nftassist::core::compiler::compile(&intent, &ChainRef::default());
//! assert_eq!(commands[0].as_str(), "add rule ip filter input ip daddr 0.0.0.0/0 tcp dport 5667 drop");
//! ```

use crate::core::error::{Error, Result};
use crate::core::ip_spec::IpSpec;
use crate::core::port_spec::PortSpec;
use crate::core::presets::PresetService;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Layer-4 protocols offered at the protocol prompt.
///
/// `Copy` trait allows the static preset table to hold these directly.
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
pub enum Protocol {
    /// Transmission Control Protocol
    #[strum(serialize = "tcp")]
    Tcp,
    /// User Datagram Protocol
    #[strum(serialize = "udp")]
    Udp,
    /// Stream Control Transmission Protocol
    #[strum(serialize = "sctp")]
    Sctp,
    /// Datagram Congestion Control Protocol
    #[strum(serialize = "dccp")]
    Dccp,
    #[strum(serialize = "udplite")]
    UdpLite,
    /// Internet Control Message Protocol (IPv4)
    #[strum(serialize = "icmp")]
    Icmp,
    #[strum(serialize = "igmp")]
    Igmp,
    #[strum(serialize = "esp")]
    Esp,
    #[strum(serialize = "ah")]
    Ah,
}

impl Protocol {
    /// Protocols offered as numbered choices, in menu order
    pub const COMMON: [Protocol; 5] = [
        Protocol::Tcp,
        Protocol::Udp,
        Protocol::Icmp,
        Protocol::Sctp,
        Protocol::Dccp,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Sctp => "sctp",
            Protocol::Dccp => "dccp",
            Protocol::UdpLite => "udplite",
            Protocol::Icmp => "icmp",
            Protocol::Igmp => "igmp",
            Protocol::Esp => "esp",
            Protocol::Ah => "ah",
        }
    }

    /// Whether nft accepts a `dport` match for this protocol
    pub const fn carries_ports(self) -> bool {
        matches!(
            self,
            Protocol::Tcp | Protocol::Udp | Protocol::Sctp | Protocol::Dccp | Protocol::UdpLite
        )
    }

    pub const fn description(self) -> &'static str {
        match self {
            Protocol::Tcp => "Transmission Control Protocol (connection-oriented)",
            Protocol::Udp => "User Datagram Protocol (connectionless)",
            Protocol::Sctp => "Stream Control Transmission Protocol",
            Protocol::Dccp => "Datagram Congestion Control Protocol",
            Protocol::UdpLite => "Lightweight User Datagram Protocol",
            Protocol::Icmp => "Internet Control Message Protocol",
            Protocol::Igmp => "Internet Group Management Protocol",
            Protocol::Esp => "IPsec Encapsulating Security Payload",
            Protocol::Ah => "IPsec Authentication Header",
        }
    }
}

/// Rule action (Accept or Drop)
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Let the packet through
    #[default]
    #[strum(serialize = "accept")]
    Accept,
    /// Discard the packet silently
    #[strum(serialize = "drop")]
    Drop,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Accept => "accept",
            Action::Drop => "drop",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Action::Accept => "Accept",
            Action::Drop => "Drop",
        }
    }
}

/// What the protocol prompt resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolSpec {
    Named(Protocol),
    /// Operator-typed protocol name nft is left to judge; treated as port-bearing
    Custom(String),
    Preset(PresetService),
}

impl ProtocolSpec {
    /// Resolves typed protocol text. Known names map to [`Protocol`], anything
    /// else must pass [`crate::validators::validate_protocol_name`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProtocol`] for empty names or names containing
    /// characters outside `[a-z0-9-]`.
    pub fn parse(input: &str) -> Result<Self> {
        let text = input.trim().to_ascii_lowercase();
        if let Ok(protocol) = Protocol::from_str(&text) {
            return Ok(ProtocolSpec::Named(protocol));
        }
        crate::validators::validate_protocol_name(&text)
            .map(ProtocolSpec::Custom)
            .map_err(|reason| Error::InvalidProtocol {
                input: input.to_string(),
                reason,
            })
    }
}

impl fmt::Display for ProtocolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolSpec::Named(protocol) => f.write_str(protocol.as_str()),
            ProtocolSpec::Custom(name) => f.write_str(name),
            ProtocolSpec::Preset(service) => write!(f, "preset:{service}"),
        }
    }
}

/// The chain rules are added to and deleted from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainRef {
    pub family: String,
    pub table: String,
    pub chain: String,
}

impl Default for ChainRef {
    fn default() -> Self {
        Self {
            family: "ip".to_string(),
            table: "filter".to_string(),
            chain: "input".to_string(),
        }
    }
}

impl ChainRef {
    /// True when a listed rule lives in this chain
    pub fn matches(&self, family: &str, table: &str, chain: &str) -> bool {
        self.family == family && self.table == table && self.chain == chain
    }
}

impl fmt::Display for ChainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.family, self.table, self.chain)
    }
}

/// One operator request to add rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleIntent {
    pub action: Action,
    pub protocol: ProtocolSpec,
    /// Ignored for presets and port-less protocols
    pub ports: Option<PortSpec>,
    pub ip: IpSpec,
}

impl RuleIntent {
    /// Intent for a preset service; the preset supplies every port
    pub fn preset(action: Action, service: PresetService, ip: IpSpec) -> Self {
        Self {
            action,
            protocol: ProtocolSpec::Preset(service),
            ports: None,
            ip,
        }
    }
}

/// A single atomic nft invocation, without the leading `nft`.
///
/// Arguments never contain whitespace, so the text splits back into argv.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NftCommand(String);

impl NftCommand {
    pub(crate) fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Argument vector passed to the nft binary
    pub fn args(&self) -> Vec<String> {
        self.0.split_whitespace().map(String::from).collect()
    }
}

impl fmt::Display for NftCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nft {}", self.0)
    }
}
