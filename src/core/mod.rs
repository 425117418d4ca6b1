//! Core rule handling
//!
//! - [`port_spec`] and [`ip_spec`]: parsing operator input
//! - [`firewall`]: intent, chain and command types
//! - [`presets`]: the static service table
//! - [`compiler`]: intent to `add rule` commands
//! - [`ruleset`]: numbered view of a `nft -j -a` listing
//! - [`deletion`]: display indices to `delete rule ... handle` commands
//! - [`executor`]: running commands against nft
//! - [`export`]: ruleset backups
//! - [`error`]: error types and nft diagnostic translation

pub mod compiler;
pub mod deletion;
pub mod error;
pub mod executor;
pub mod export;
pub mod firewall;
pub mod ip_spec;
pub mod port_spec;
pub mod presets;
pub mod ruleset;

#[cfg(test)]
pub mod test_helpers;
