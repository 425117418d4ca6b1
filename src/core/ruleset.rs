//! Ruleset indexing
//!
//! Parses the JSON produced by `nft -j -a list ruleset` into a numbered
//! table of the port rules in one chain. The numbering only means something
//! for the listing it came from: any change to the live ruleset invalidates
//! it, so callers list again before every deletion.
//!
//! Rules without a port match (policy helpers such as `ct state
//! established accept`) are counted but never numbered.

use crate::core::error::{Error, Result};
use crate::core::firewall::{Action, ChainRef};
use crate::core::port_spec::PortUnit;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, warn};

/// Shown when a rule has no address match
pub const ANY_ADDRESS: &str = "any";

/// Hex digits kept from the snapshot digest
pub const FINGERPRINT_LEN: usize = 12;

/// One operator-visible row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesetEntry {
    /// 1-based, only valid for the snapshot that produced it
    pub display_index: usize,
    pub handle: u64,
    /// Protocol named by the port match (`tcp`, `udp`, or `th`)
    pub protocol: String,
    /// `dport` or `sport`
    pub port_field: String,
    /// Port value as nft printed it: `22`, `8000-8100`, `{ 80, 443 }`
    pub port_text: String,
    /// Numeric ports the rule matches; empty if nft printed a service name
    pub ports: Vec<PortUnit>,
    /// `ip daddr 10.0.0.0/8`, or [`ANY_ADDRESS`]
    pub ip_match: String,
    /// `None` when the rule has no accept/drop/reject verdict
    pub action: Option<Action>,
    pub description: String,
}

impl RulesetEntry {
    pub fn matches_port(&self, port: u16) -> bool {
        self.ports.iter().any(|unit| match unit {
            PortUnit::Single(p) => *p == port,
            PortUnit::Range(low, high) => (*low..=*high).contains(&port),
        })
    }
}

impl fmt::Display for RulesetEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:>2}] {} (handle {})",
            self.display_index, self.description, self.handle
        )
    }
}

/// Counts for the status line under the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RulesetSummary {
    pub chain_rules: usize,
    pub port_rules: usize,
}

/// Index of one listing. Built fresh per display/delete cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesetSnapshot {
    pub chain: ChainRef,
    pub entries: Vec<RulesetEntry>,
    /// Whether the listing contained the target chain at all
    pub chain_present: bool,
    chain_rules: usize,
}

impl RulesetSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for a 1-based display index
    pub fn get(&self, display_index: usize) -> Option<&RulesetEntry> {
        display_index
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
    }

    pub fn summary(&self) -> RulesetSummary {
        RulesetSummary {
            chain_rules: self.chain_rules,
            port_rules: self.entries.len(),
        }
    }

    /// Short digest of the chain and its numbered entries.
    ///
    /// Two snapshots share a fingerprint exactly when every display index
    /// resolves to the same handle and match.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.chain.to_string().as_bytes());
        for entry in &self.entries {
            let row = format!(
                "\n{}|{}|{}",
                entry.display_index, entry.handle, entry.description
            );
            hasher.update(row.as_bytes());
        }
        let digest = format!("{:x}", hasher.finalize());
        digest[..FINGERPRINT_LEN].to_string()
    }

    /// Entries matching `port`, optionally restricted to one protocol
    pub fn find_by_port(&self, port: u16, protocol: Option<&str>) -> Vec<&RulesetEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.matches_port(port))
            .filter(|entry| protocol.is_none_or(|p| entry.protocol == p))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct Listing {
    nftables: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawChain {
    family: String,
    table: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    family: String,
    table: String,
    chain: String,
    #[serde(default)]
    handle: Option<Value>,
    #[serde(default)]
    expr: Vec<Value>,
}

/// Port match extracted from an expression list
struct PortMatch {
    protocol: String,
    field: String,
    op: String,
    text: String,
    units: Vec<PortUnit>,
}

/// Parses a `nft -j -a list ruleset` listing for `chain`.
///
/// # Errors
///
/// Returns [`Error::RulesetParse`] if the listing is not JSON, has no
/// `nftables` array, or a rule in the target chain has no integer handle
/// (the listing was produced without `-a`).
pub fn index_ruleset(listing: &str, chain: &ChainRef) -> Result<RulesetSnapshot> {
    let listing: Listing = serde_json::from_str(listing)
        .map_err(|e| Error::RulesetParse(format!("expected nft JSON listing: {e}")))?;

    let mut entries = Vec::new();
    let mut chain_present = false;
    let mut chain_rules = 0;

    for item in &listing.nftables {
        if let Some(raw) = item.get("chain") {
            let raw: RawChain = serde_json::from_value(raw.clone())
                .map_err(|e| Error::RulesetParse(format!("malformed chain object: {e}")))?;
            if chain.matches(&raw.family, &raw.table, &raw.name) {
                chain_present = true;
            }
            continue;
        }

        let Some(raw) = item.get("rule") else {
            continue;
        };
        let rule: RawRule = serde_json::from_value(raw.clone())
            .map_err(|e| Error::RulesetParse(format!("malformed rule object: {e}")))?;
        if !chain.matches(&rule.family, &rule.table, &rule.chain) {
            continue;
        }
        chain_rules += 1;

        let handle = rule
            .handle
            .as_ref()
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                Error::RulesetParse(
                    "rule without a numeric handle (list the ruleset with -a)".to_string(),
                )
            })?;

        let Some(port) = find_port_match(&rule.expr) else {
            debug!("Skipping handle {handle}: no port match");
            continue;
        };

        let ip_match = find_ip_match(&rule.expr).unwrap_or_else(|| ANY_ADDRESS.to_string());
        let action = find_action(&rule.expr);
        let description = describe(&port, &ip_match, action);

        entries.push(RulesetEntry {
            display_index: entries.len() + 1,
            handle,
            protocol: port.protocol,
            port_field: port.field,
            port_text: port.text,
            ports: port.units,
            ip_match,
            action,
            description,
        });
    }

    if !chain_present && chain_rules == 0 {
        warn!("Chain {chain} not present in listing");
    }

    Ok(RulesetSnapshot {
        chain: chain.clone(),
        entries,
        chain_present,
        chain_rules,
    })
}

fn describe(port: &PortMatch, ip_match: &str, action: Option<Action>) -> String {
    let op = if port.op == "==" {
        String::new()
    } else {
        format!("{} ", port.op)
    };
    let verdict = action.map_or("(no verdict)", Action::as_str);
    format!(
        "{ip_match} {} {} {op}{} {verdict}",
        port.protocol, port.field, port.text
    )
}

/// Match objects from the expression list: `(op, payload protocol, payload field, right)`
fn payload_matches(expr: &[Value]) -> impl Iterator<Item = (&str, &str, &str, &Value)> {
    expr.iter().filter_map(|e| {
        let m = e.get("match")?;
        let payload = m.get("left")?.get("payload")?;
        let protocol = payload.get("protocol")?.as_str()?;
        let field = payload.get("field")?.as_str()?;
        let op = m.get("op").and_then(Value::as_str).unwrap_or("==");
        Some((op, protocol, field, m.get("right")?))
    })
}

fn find_port_match(expr: &[Value]) -> Option<PortMatch> {
    payload_matches(expr)
        .find(|(_, _, field, _)| matches!(*field, "dport" | "sport"))
        .map(|(op, protocol, field, right)| {
            let mut units = Vec::new();
            collect_port_units(right, &mut units);
            PortMatch {
                protocol: protocol.to_string(),
                field: field.to_string(),
                op: op.to_string(),
                text: render_value(right),
                units,
            }
        })
}

fn find_ip_match(expr: &[Value]) -> Option<String> {
    payload_matches(expr)
        .find(|(_, protocol, field, _)| *protocol == "ip" && matches!(*field, "daddr" | "saddr"))
        .map(|(op, protocol, field, right)| {
            if op == "==" {
                format!("{protocol} {field} {}", render_value(right))
            } else {
                format!("{protocol} {field} {op} {}", render_value(right))
            }
        })
}

fn find_action(expr: &[Value]) -> Option<Action> {
    expr.iter().find_map(|e| {
        if e.get("accept").is_some() {
            Some(Action::Accept)
        } else if e.get("drop").is_some() || e.get("reject").is_some() {
            Some(Action::Drop)
        } else {
            None
        }
    })
}

fn collect_port_units(value: &Value, units: &mut Vec<PortUnit>) {
    let as_port = |v: &Value| v.as_u64().and_then(|n| u16::try_from(n).ok());

    if let Some(port) = as_port(value) {
        units.push(PortUnit::Single(port));
    } else if let Some([low, high]) = value.get("range").and_then(Value::as_array).map(Vec::as_slice)
    {
        if let (Some(low), Some(high)) = (as_port(low), as_port(high)) {
            units.push(PortUnit::Range(low, high));
        }
    } else if let Some(set) = value.get("set").and_then(Value::as_array) {
        for element in set {
            collect_port_units(element, units);
        }
    }
}

/// Renders a match right-hand side the way `nft list` prints it
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Object(obj) => {
            if let Some(prefix) = obj.get("prefix") {
                let addr = prefix.get("addr").map(render_value).unwrap_or_default();
                let len = prefix.get("len").map(render_value).unwrap_or_default();
                format!("{addr}/{len}")
            } else if let Some(Value::Array(bounds)) = obj.get("range") {
                bounds
                    .iter()
                    .map(render_value)
                    .collect::<Vec<_>>()
                    .join("-")
            } else if let Some(Value::Array(set)) = obj.get("set") {
                let items: Vec<String> = set.iter().map(render_value).collect();
                format!("{{ {} }}", items.join(", "))
            } else {
                value.to_string()
            }
        }
        other => other.to_string(),
    }
}
