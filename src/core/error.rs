use thiserror::Error;

/// Core error types for nftassist
#[derive(Debug, Error)]
pub enum Error {
    /// Port text did not parse as a single port, range, or list
    #[error("Invalid port '{input}': {reason}")]
    InvalidPort { input: String, reason: String },

    /// Address text did not parse as an IPv4 address, range, or CIDR
    #[error("Invalid IP '{input}': {reason}")]
    InvalidIp { input: String, reason: String },

    /// Protocol name rejected before it reaches nft
    #[error("Invalid protocol '{input}': {reason}")]
    InvalidProtocol { input: String, reason: String },

    /// Display-index ranges like `1-3` are not accepted for deletion
    #[error("Index ranges are not supported: '{0}' (list indices separated by commas, e.g. 1,2,3)")]
    UnsupportedIndexRange(String),

    /// Deletion token is not a rule number
    #[error("Invalid rule number '{0}' (enter numbers from the list, e.g. 1,3)")]
    InvalidIndex(String),

    /// Display index outside the current table
    #[error("Rule number {index} is out of range ({})", valid_range(*max))]
    IndexOutOfRange { index: usize, max: usize },

    /// The listing changed after the operator read its numbers
    #[error(
        "Ruleset changed since snapshot {expected} (now {actual}); run `nftassist list` again and use the new numbers"
    )]
    StaleSnapshot { expected: String, actual: String },

    /// Ruleset listing did not have the expected structure
    #[error("Could not parse ruleset listing: {0}")]
    RulesetParse(String),

    /// nft exited non-zero for a command
    #[error("Command failed: {command}: {message}")]
    CommandExecutionFailed {
        command: String,
        message: String,
        exit_code: Option<i32>,
    },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Privilege escalation failed
    #[error("Elevation error: {0}")]
    Elevation(#[from] crate::elevation::ElevationError),
}

fn valid_range(max: usize) -> String {
    if max == 0 {
        "the chain has no port rules".to_string()
    } else {
        format!("valid: 1-{max}")
    }
}

impl Error {
    pub(crate) fn invalid_port(input: &str, reason: impl Into<String>) -> Self {
        Error::InvalidPort {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_ip(input: &str, reason: impl Into<String>) -> Self {
        Error::InvalidIp {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    /// Validation errors are reported and re-prompted; nothing changed on the system.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidPort { .. }
                | Error::InvalidIp { .. }
                | Error::InvalidProtocol { .. }
                | Error::UnsupportedIndexRange(_)
                | Error::InvalidIndex(_)
                | Error::IndexOutOfRange { .. }
        )
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

/// Database of nftables error patterns and their translations
pub struct NftablesErrorPattern;

impl NftablesErrorPattern {
    /// Returns true when the diagnostic means the target table or chain is absent.
    ///
    /// nft reports a missing table as `No such file or directory` and usually
    /// adds `Could not process rule` on the same line.
    pub fn is_missing_table(msg: &str) -> bool {
        let lower = msg.to_lowercase();
        lower.contains("no such file or directory") || lower.contains("could not process rule")
    }

    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("permission denied") || lower.contains("operation not permitted") {
            return ErrorTranslation::new("Insufficient permissions to modify firewall rules")
                .with_suggestion("Run as root, or make sure sudo/run0 is available")
                .with_suggestion("Set NFTASSIST_ELEVATION_METHOD=sudo to force sudo")
                .with_suggestion("Check if CAP_NET_ADMIN capability is available")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Quick_reference-nftables_in_10_minutes");
        }

        if lower.contains("cache initialization failed") {
            return ErrorTranslation::new(
                "Failed to initialize nftables cache - insufficient privileges",
            )
            .with_suggestion("This usually means you need elevated privileges")
            .with_suggestion("Re-run the command with sudo");
        }

        if lower.contains("command not found") || lower.contains("failed to spawn") {
            return ErrorTranslation::new("nftables is not installed or not found in PATH")
                .with_suggestion("Install nftables: sudo apt-get install nftables  (Debian/Ubuntu)")
                .with_suggestion("Or: sudo dnf install nftables  (Fedora/RHEL)")
                .with_suggestion("Or: sudo pacman -S nftables  (Arch)")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Main_Page");
        }

        if Self::is_missing_table(&lower) {
            return ErrorTranslation::new("Firewall table or chain does not exist")
                .with_suggestion("Create the base table first: nftassist init")
                .with_suggestion("Or enable auto_init_table in the configuration")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Configuring_tables");
        }

        if lower.contains("syntax error") {
            return ErrorTranslation::new("Invalid firewall rule syntax")
                .with_suggestion("Check the protocol name for typos")
                .with_suggestion("Verify port numbers are between 1 and 65535")
                .with_suggestion("Ensure IP addresses and network masks are valid")
                .with_help(
                    "https://wiki.nftables.org/wiki-nftables/index.php/Simple_rule_management",
                );
        }

        if lower.contains("invalid lhs of relational") || lower.contains("unknown expression type")
        {
            return ErrorTranslation::new("Protocol mismatch - trying to match incompatible field")
                .with_suggestion("Don't use port matching with ICMP")
                .with_suggestion("Use TCP, UDP, SCTP or DCCP when matching ports");
        }

        if lower.contains("resource busy") {
            return ErrorTranslation::new("Firewall resource is busy")
                .with_suggestion("Another process may be modifying nftables")
                .with_suggestion("Wait a moment and try again");
        }

        if lower.contains("timeout") || lower.contains("timed out") {
            return ErrorTranslation::new("Operation timed out")
                .with_suggestion("Check system load: uptime")
                .with_suggestion("Try again when the system is less busy");
        }

        if lower.contains("netlink") {
            return ErrorTranslation::new("Communication error with kernel netlink interface")
                .with_suggestion("Check kernel modules: lsmod | grep nf_tables")
                .with_suggestion("Load nf_tables module: sudo modprobe nf_tables")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Troubleshooting");
        }

        // Generic fallback
        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Verify nftables is working: sudo nft list ruleset")
            .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Troubleshooting")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
