//! Shared test utilities for core module tests
//!
//! This module is only compiled in test mode.

use crate::core::error::Result;
use crate::core::executor::{NftOutput, NftRunner};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Once};

/// Mutex for tests that need exclusive access to environment variables.
///
/// For tests that just need mock nft, use `setup_mock_nft()` instead.
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("NFTASSIST_ELEVATION_METHOD", "sudo");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("NFTASSIST_ELEVATION_METHOD");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

static MOCK_NFT_INIT: Once = Once::new();

/// Points `NFTASSIST_NFT_COMMAND` at `tests/mock_nft.sh`.
///
/// Safe to call from any number of tests; the variable is set once.
pub fn setup_mock_nft() {
    MOCK_NFT_INIT.call_once(|| {
        let mock_path = format!("{}/tests/mock_nft.sh", env!("CARGO_MANIFEST_DIR"));
        // SAFETY: only called once due to Once, and only in test code.
        unsafe {
            std::env::set_var(crate::elevation::NFT_COMMAND_VAR, &mock_path);
        }
    });
}

/// What nft prints when the table does not exist
pub const MISSING_TABLE_STDERR: &str = "Error: Could not process rule: No such file or directory\nadd rule ip filter input ip daddr 0.0.0.0/0 tcp dport 22 accept\n                  ^^^^^^";

/// `ip filter input` with two port rules around a policy rule:
///
/// | handle | rule |
/// |--------|------|
/// | 4 | `ip daddr 0.0.0.0/0 tcp dport 22 accept` |
/// | 5 | `ct state established,related accept` |
/// | 6 | `ip daddr 192.168.1.0-192.168.1.255 tcp dport 8080-8090 drop` |
pub const SAMPLE_LISTING: &str = r#"{"nftables": [
  {"metainfo": {"version": "1.0.9", "release_name": "Old Doc Yak #3", "json_schema_version": 1}},
  {"table": {"family": "ip", "name": "filter", "handle": 1}},
  {"chain": {"family": "ip", "table": "filter", "name": "input", "handle": 1, "type": "filter", "hook": "input", "prio": 0, "policy": "accept"}},
  {"chain": {"family": "ip", "table": "filter", "name": "output", "handle": 2, "type": "filter", "hook": "output", "prio": 0, "policy": "accept"}},
  {"rule": {"family": "ip", "table": "filter", "chain": "input", "handle": 4, "expr": [
    {"match": {"op": "==", "left": {"payload": {"protocol": "ip", "field": "daddr"}}, "right": {"prefix": {"addr": "0.0.0.0", "len": 0}}}},
    {"match": {"op": "==", "left": {"payload": {"protocol": "tcp", "field": "dport"}}, "right": 22}},
    {"accept": null}
  ]}},
  {"rule": {"family": "ip", "table": "filter", "chain": "input", "handle": 5, "expr": [
    {"match": {"op": "in", "left": {"ct": {"key": "state"}}, "right": ["established", "related"]}},
    {"accept": null}
  ]}},
  {"rule": {"family": "ip", "table": "filter", "chain": "input", "handle": 6, "expr": [
    {"match": {"op": "==", "left": {"payload": {"protocol": "ip", "field": "daddr"}}, "right": {"range": ["192.168.1.0", "192.168.1.255"]}}},
    {"match": {"op": "==", "left": {"payload": {"protocol": "tcp", "field": "dport"}}, "right": {"range": [8080, 8090]}}},
    {"drop": null}
  ]}}
]}"#;

/// A rule object with one port match and a verdict
pub fn port_rule(
    family: &str,
    table: &str,
    chain: &str,
    handle: u64,
    protocol: &str,
    port: Value,
    verdict: &str,
) -> Value {
    json!({
        "family": family,
        "table": table,
        "chain": chain,
        "handle": handle,
        "expr": [
            { "match": { "op": "==", "left": { "payload": { "protocol": protocol, "field": "dport" } }, "right": port } },
            { verdict: null }
        ]
    })
}

/// Wraps rule objects into a listing
pub fn listing_with_rules(rules: Vec<Value>) -> String {
    let mut items = vec![json!({ "metainfo": { "json_schema_version": 1 } })];
    items.extend(rules.into_iter().map(|rule| json!({ "rule": rule })));
    json!({ "nftables": items }).to_string()
}

type Responder = Box<dyn Fn(&[String]) -> Result<NftOutput> + Send + Sync>;

/// Runner that records every invocation and answers from a closure
pub struct RecordingRunner {
    responder: Responder,
    calls: Mutex<Vec<Vec<String>>>,
    scripts: Mutex<Vec<String>>,
    /// `Some` when simulating a table that only exists after `-f -`
    table_exists: Option<AtomicBool>,
}

impl RecordingRunner {
    pub fn new(responder: impl Fn(&[String]) -> Result<NftOutput> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
            table_exists: None,
        }
    }

    /// `add` commands fail with [`MISSING_TABLE_STDERR`] until a script is applied
    pub fn with_missing_table() -> Self {
        let mut runner = Self::new(|_| Ok(Self::ok("")));
        runner.table_exists = Some(AtomicBool::new(false));
        runner
    }

    pub fn ok(stdout: &str) -> NftOutput {
        NftOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    pub fn fail(stderr: &str) -> NftOutput {
        NftOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            success: false,
            code: Some(1),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

impl NftRunner for RecordingRunner {
    async fn run(&self, args: &[String]) -> Result<NftOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        if let Some(exists) = &self.table_exists
            && !exists.load(Ordering::SeqCst)
            && args.first().is_some_and(|a| a == "add")
        {
            return Ok(Self::fail(MISSING_TABLE_STDERR));
        }
        (self.responder)(args)
    }

    async fn run_script(&self, args: &[String], script: &str) -> Result<NftOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        self.scripts.lock().unwrap().push(script.to_string());
        if let Some(exists) = &self.table_exists {
            exists.store(true, Ordering::SeqCst);
        }
        (self.responder)(args)
    }
}
