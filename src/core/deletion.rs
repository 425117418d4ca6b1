//! Deletion planning
//!
//! Maps operator display indices onto kernel handles from one
//! [`RulesetSnapshot`]. The whole request is validated before any command
//! is produced, so a bad token deletes nothing.
//!
//! Numbers are bound to the listing the operator read through
//! [`RulesetSnapshot::fingerprint`]: [`check_fingerprint`] compares it with
//! a digest printed earlier and [`recheck_snapshot`] lists again right
//! before execution.

use crate::core::error::{Error, Result};
use crate::core::executor::{NftRunner, list_ruleset};
use crate::core::firewall::NftCommand;
use crate::core::ruleset::{RulesetSnapshot, index_ruleset};
use tracing::{debug, warn};

/// Parses a comma-separated index list such as `1,3,5`.
///
/// Whitespace around tokens is ignored. Duplicates are kept in request order.
///
/// # Errors
///
/// - [`Error::UnsupportedIndexRange`] for any token containing `-`
/// - [`Error::InvalidIndex`] for empty or non-numeric tokens
/// - [`Error::IndexOutOfRange`] for indices outside `1..=max`
pub fn parse_indices(request: &str, max: usize) -> Result<Vec<usize>> {
    let mut indices = Vec::new();
    for token in request.split(',').map(str::trim) {
        if token.is_empty() {
            return Err(Error::InvalidIndex(request.trim().to_string()));
        }
        if token.contains('-') {
            return Err(Error::UnsupportedIndexRange(token.to_string()));
        }
        let index: usize = token.parse().map_err(|_| Error::InvalidIndex(token.to_string()))?;
        if index == 0 || index > max {
            return Err(Error::IndexOutOfRange { index, max });
        }
        indices.push(index);
    }
    Ok(indices)
}

/// Produces one `delete rule ... handle N` command per requested index.
///
/// # Errors
///
/// Propagates every [`parse_indices`] error. Nothing is planned unless the
/// whole request is valid.
pub fn plan_deletion(request: &str, snapshot: &RulesetSnapshot) -> Result<Vec<NftCommand>> {
    let indices = parse_indices(request, snapshot.len())?;
    let mut commands = Vec::with_capacity(indices.len());
    for index in indices {
        let entry = snapshot.get(index).ok_or(Error::IndexOutOfRange {
            index,
            max: snapshot.len(),
        })?;
        commands.push(NftCommand::new(format!(
            "delete rule {} handle {}",
            snapshot.chain, entry.handle
        )));
    }
    debug!("Planned {} deletion(s) in {}", commands.len(), snapshot.chain);
    Ok(commands)
}

/// Fails unless `expected` is the fingerprint of `snapshot`.
///
/// # Errors
///
/// [`Error::StaleSnapshot`] on mismatch.
pub fn check_fingerprint(snapshot: &RulesetSnapshot, expected: &str) -> Result<()> {
    let actual = snapshot.fingerprint();
    if expected.trim().eq_ignore_ascii_case(&actual) {
        Ok(())
    } else {
        warn!("Snapshot {} is stale, {} is now {}", expected.trim(), snapshot.chain, actual);
        Err(Error::StaleSnapshot {
            expected: expected.trim().to_string(),
            actual,
        })
    }
}

/// Lists the ruleset again and fails if `snapshot` no longer describes it.
///
/// # Errors
///
/// [`Error::StaleSnapshot`] when any number would now resolve differently,
/// or the listing/indexing error.
pub async fn recheck_snapshot(runner: &impl NftRunner, snapshot: &RulesetSnapshot) -> Result<()> {
    let listing = list_ruleset(runner).await?;
    let current = index_ruleset(&listing, &snapshot.chain)?;
    check_fingerprint(&current, &snapshot.fingerprint())
}
