//! nftassist - everyday firewall intent to nftables commands
//!
//! Parses port and address text typed by an operator, compiles it into
//! atomic `nft add rule` commands, and maps the numbers shown in a rule
//! listing back to kernel rule handles for safe deletion.
//!
//! # Architecture
//!
//! - [`core`] - Parsing, compilation, ruleset indexing, deletion planning and nft execution
//! - [`audit`] - JSON-lines audit log of every change to the live ruleset
//! - [`validators`] - Input sanitization and validation
//! - [`config`] - Target chain and behaviour settings
//! - [`elevation`] - Building the (possibly elevated) `nft` process
//! - [`utils`] - XDG directories and file naming
//!
//! # Example
//!
//! ```
//! use nftassist::core::compiler::compile;
//! use nftassist::core::firewall::{Action, ChainRef, ProtocolSpec, RuleIntent};
//! use nftassist::{IpSpec, PortSpec};
//!
//! let intent = RuleIntent {
//!     action: Action::Accept,
//!     protocol: ProtocolSpec::parse("udp").unwrap(),
//!     ports: Some(PortSpec::parse("53,123").unwrap()),
//!     ip: IpSpec::parse("10.0.0.0/8").unwrap(),
//! };
//! let commands = compile(&intent, &ChainRef::default());
//! assert_eq!(commands.len(), 2);
//! assert_eq!(
//!     commands[1].as_str(),
//!     "add rule ip filter input ip daddr 10.0.0.0/8 udp dport 123 accept"
//! );
//! ```

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod elevation;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::firewall::{Action, ChainRef, NftCommand, Protocol, RuleIntent};
pub use core::ip_spec::IpSpec;
pub use core::port_spec::PortSpec;
pub use core::ruleset::{RulesetEntry, RulesetSnapshot};
