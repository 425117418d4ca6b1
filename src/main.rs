//! nftassist - firewall rules from everyday intent
//!
//! # Usage
//!
//! ```bash
//! nftassist add --action drop --protocol tcp --port 5667
//! nftassist add --protocol udp --port 53,123 --ip 10.0.0.0/8
//! nftassist preset mail --action accept
//! nftassist list                     # numbered port rules and their snapshot id
//! nftassist list --raw               # the JSON listing as nft printed it
//! nftassist search --port 22
//! nftassist delete 1,3               # lists again, then asks
//! nftassist delete 1,3 --yes --snapshot 3f2a9c01b7de
//! nftassist init                     # create table ip filter with base chains
//! nftassist export --output /root/backups
//! nftassist config --chain services
//! ```
//!
//! Every command that changes the ruleset is previewed and confirmed first
//! unless `--yes` is given or `confirm_before_execute` is off. An unattended
//! delete must name the snapshot id printed by `list`, so its numbers cannot
//! silently point at other rules.

use clap::{Parser, Subcommand};
use nftassist::audit;
use nftassist::config::{self, AppConfig};
use nftassist::core::compiler::compile;
use nftassist::core::deletion::{check_fingerprint, parse_indices, plan_deletion, recheck_snapshot};
use nftassist::core::error::{Error, NftablesErrorPattern};
use nftassist::core::executor::{
    BatchOptions, BatchReport, SystemNft, execute_batch, init_table, list_ruleset,
};
use nftassist::core::export::{export_ruleset, export_ruleset_to};
use nftassist::core::firewall::{Action, ChainRef, NftCommand, Protocol, ProtocolSpec, RuleIntent};
use nftassist::core::ip_spec::IpSpec;
use nftassist::core::port_spec::{PortSpec, PortUnit};
use nftassist::core::presets::{PRESETS, PresetService};
use nftassist::core::ruleset::{RulesetSnapshot, index_ruleset};
use nftassist::validators::{check_reserved_ip, check_well_known_port, sanitize_input};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nftassist", version)]
#[command(about = "Turn everyday firewall intent into nftables rules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add rules for a protocol, ports and address
    Add {
        /// accept or drop
        #[arg(short, long, default_value = "accept")]
        action: Action,
        /// tcp, udp, icmp, sctp, dccp, or another nft protocol name
        #[arg(short, long, default_value = "tcp")]
        protocol: String,
        /// 22, 8000-8100, or 80,443,8000-8100
        #[arg(long)]
        port: Option<String>,
        /// Address, range (a.b.c.d-e.f.g.h) or CIDR; any address when omitted
        #[arg(long)]
        ip: Option<String>,
        /// Run without asking
        #[arg(short, long)]
        yes: bool,
    },
    /// Add the rules of a preset service
    Preset {
        /// web, ssh, mail, database, ftp or dns
        service: PresetService,
        #[arg(short, long, default_value = "accept")]
        action: Action,
        #[arg(long)]
        ip: Option<String>,
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the preset services and their ports
    Presets,
    /// List the port rules of the target chain with their numbers
    List {
        /// Print the full JSON listing instead of the table
        #[arg(long)]
        raw: bool,
    },
    /// Find port rules matching a port
    Search {
        #[arg(long)]
        port: u16,
        #[arg(short, long, default_value = "tcp")]
        protocol: String,
    },
    /// Delete rules by the numbers shown by `list`
    Delete {
        /// Comma-separated rule numbers, e.g. 1,3,5
        indices: String,
        /// Snapshot id printed by `list`; required with --yes
        #[arg(long)]
        snapshot: Option<String>,
        #[arg(short, long)]
        yes: bool,
    },
    /// Create the base table and chains
    Init,
    /// Save the full ruleset as JSON
    Export {
        /// Target file or directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show or change the configuration
    Config {
        /// Restore defaults
        #[arg(long)]
        reset: bool,
        #[arg(long)]
        family: Option<String>,
        #[arg(long)]
        table: Option<String>,
        #[arg(long)]
        chain: Option<String>,
        #[arg(long)]
        confirm: Option<bool>,
        #[arg(long)]
        auto_init: Option<bool>,
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let _ = nftassist::utils::ensure_dirs();
    init_logging();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to `nftassist.log` in the state directory, stderr if that fails.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = nftassist::utils::get_state_dir().and_then(|dir| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("nftassist.log"))
            .ok()
    });

    match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(file)
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

async fn handle_cli(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config().await;
    let chain = config.chain_ref();

    match command {
        Commands::Add {
            action,
            protocol,
            port,
            ip,
            yes,
        } => {
            let protocol = ProtocolSpec::parse(&sanitize_input(&protocol))?;
            let ports = port
                .map(|p| PortSpec::parse(&sanitize_input(&p)))
                .transpose()?;
            let ip = parse_ip(ip.as_deref())?;
            if let Some(ports) = &ports {
                for unit in ports.units() {
                    if let PortUnit::Single(p) = unit
                        && let Some(note) = check_well_known_port(p)
                    {
                        println!("  note: {note}");
                    }
                }
            }
            let intent = RuleIntent {
                action,
                protocol,
                ports,
                ip,
            };
            add_rules(&config, &chain, &intent, yes).await?;
        }
        Commands::Preset {
            service,
            action,
            ip,
            yes,
        } => {
            let ip = parse_ip(ip.as_deref())?;
            println!("Preset: {} ({})", service.definition().label, action.display_name());
            let intent = RuleIntent::preset(action, service, ip);
            add_rules(&config, &chain, &intent, yes).await?;
        }
        Commands::Presets => {
            for def in PRESETS {
                let pairs: Vec<String> = def
                    .service
                    .expand()
                    .into_iter()
                    .map(|(protocol, port)| format!("{protocol}/{port}"))
                    .collect();
                println!("  {:<9} {:<36} {}", def.service.as_ref(), def.label, pairs.join(" "));
            }
            println!("Common protocols for `add --protocol`:");
            for protocol in Protocol::COMMON {
                println!("  {:<9} {}", protocol.as_str(), protocol.description());
            }
        }
        Commands::List { raw: true } => match list_ruleset(&SystemNft).await {
            Ok(listing) => println!("{}", listing.trim_end()),
            Err(e) => {
                print_hints(&e);
                return Err(e.into());
            }
        },
        Commands::List { raw: false } => {
            let snapshot = fetch_snapshot(&chain).await?;
            print_table(&snapshot);
        }
        Commands::Search { port, protocol } => {
            let protocol = sanitize_input(&protocol).to_ascii_lowercase();
            let snapshot = fetch_snapshot(&chain).await?;
            let matches = snapshot.find_by_port(port, Some(&protocol));
            if matches.is_empty() {
                println!("No {protocol} rules match port {port} in {chain}.");
            } else {
                println!("Rules in {chain} matching {protocol} port {port}:");
                for entry in matches {
                    println!("  {entry}");
                }
            }
        }
        Commands::Delete {
            indices,
            snapshot,
            yes,
        } => {
            let expected = snapshot.as_deref().map(sanitize_input);
            delete_rules(&config, &chain, &sanitize_input(&indices), expected.as_deref(), yes).await?;
        }
        Commands::Init => {
            let table = format!("{} {}", chain.family, chain.table);
            let result = init_table(&SystemNft, &chain).await;
            audit::log_init_table(&table, result.is_ok(), result.as_ref().err().map(ToString::to_string))
                .await;
            match result {
                Ok(()) => println!("✓ Table {table} ready (input, output, forward; policy accept)"),
                Err(e) => {
                    print_hints(&e);
                    return Err(e.into());
                }
            }
        }
        Commands::Export { output } => {
            let result = match output {
                Some(path) if !path.is_dir() => export_ruleset_to(&SystemNft, path).await,
                Some(dir) => export_ruleset(&SystemNft, &dir).await,
                None => {
                    let dir = match &config.export_dir {
                        Some(dir) => dir.clone(),
                        None => std::env::current_dir()?,
                    };
                    export_ruleset(&SystemNft, &dir).await
                }
            };
            match result {
                Ok(record) => {
                    audit::log_export(Some(&record.path), Some(&record.checksum), None).await;
                    println!("✓ Ruleset exported to {}", record.path.display());
                    println!("  {} bytes, sha256 {}", record.bytes, record.checksum);
                }
                Err(e) => {
                    audit::log_export(None, None, Some(e.to_string())).await;
                    print_hints(&e);
                    return Err(e.into());
                }
            }
        }
        Commands::Config {
            reset,
            family,
            table,
            chain: chain_name,
            confirm,
            auto_init,
            export_dir,
        } => {
            let mut updated = if reset { AppConfig::default() } else { config.clone() };
            if let Some(family) = family {
                updated.family = family;
            }
            if let Some(table) = table {
                updated.table = table;
            }
            if let Some(chain_name) = chain_name {
                updated.chain = chain_name;
            }
            if let Some(confirm) = confirm {
                updated.confirm_before_execute = confirm;
            }
            if let Some(auto_init) = auto_init {
                updated.auto_init_table = auto_init;
            }
            if export_dir.is_some() {
                updated.export_dir = export_dir;
            }

            if updated != config || reset {
                updated.validate()?;
                let path = config::save_config(&updated).await?;
                println!("Saved {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
    }
    Ok(())
}

fn parse_ip(input: Option<&str>) -> nftassist::Result<IpSpec> {
    let ip = IpSpec::parse(&sanitize_input(input.unwrap_or_default()))?;
    if let Some(note) = ip.first_addr().and_then(check_reserved_ip) {
        println!("  note: {note}");
    }
    Ok(ip)
}

async fn fetch_snapshot(chain: &ChainRef) -> nftassist::Result<RulesetSnapshot> {
    let listing = match list_ruleset(&SystemNft).await {
        Ok(listing) => listing,
        Err(e) => {
            print_hints(&e);
            return Err(e);
        }
    };
    index_ruleset(&listing, chain)
}

fn print_table(snapshot: &RulesetSnapshot) {
    if !snapshot.chain_present {
        println!("Chain {} does not exist yet. Run `nftassist init` to create it.", snapshot.chain);
        return;
    }
    if snapshot.is_empty() {
        println!("No port rules in {}.", snapshot.chain);
    } else {
        println!("Port rules in {}:", snapshot.chain);
        for entry in &snapshot.entries {
            println!("  {entry}");
        }
    }
    let summary = snapshot.summary();
    println!(
        "{} rule(s) in chain, {} with a port match.",
        summary.chain_rules, summary.port_rules
    );
    println!("Snapshot: {}", snapshot.fingerprint());
}

/// Prints the commands and asks for Enter/`y`. Returns false on anything else.
fn confirm(commands: &[NftCommand], config: &AppConfig, yes: bool) -> std::io::Result<bool> {
    println!("Commands to run:");
    for (i, command) in commands.iter().enumerate() {
        println!("  {:>2}. {command}", i + 1);
    }
    if yes || !config.confirm_before_execute {
        return Ok(true);
    }

    print!("Execute {} command(s)? [Y/n] ", commands.len());
    std::io::stdout().flush()?;
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer)? == 0 {
        return Ok(false);
    }
    let answer = sanitize_input(&answer).to_ascii_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}

fn print_hints(error: &Error) {
    let Error::CommandExecutionFailed { message, .. } = error else {
        return;
    };
    let translation = NftablesErrorPattern::match_error(message);
    eprintln!("  {}", translation.user_message);
    for suggestion in &translation.suggestions {
        eprintln!("    - {suggestion}");
    }
    if let Some(url) = &translation.help_url {
        eprintln!("    see {url}");
    }
}

fn print_report(report: &BatchReport) {
    for outcome in &report.outcomes {
        match &outcome.error {
            None if outcome.retried => {
                println!("  ✓ {} (after creating the table)", outcome.command);
            }
            None => println!("  ✓ {}", outcome.command),
            Some(e) => {
                println!("  ✗ {}", outcome.command);
                print_hints(e);
            }
        }
    }
    if report.table_initialized {
        println!("Base table was missing and has been created.");
    }
    println!(
        "{} succeeded, {} failed.",
        report.succeeded(),
        report.failed()
    );
}

fn batch_result(report: &BatchReport) -> Result<(), Box<dyn std::error::Error>> {
    if report.all_succeeded() {
        Ok(())
    } else {
        Err(format!(
            "{} of {} command(s) failed; the others were applied",
            report.failed(),
            report.outcomes.len()
        )
        .into())
    }
}

fn first_error(report: &BatchReport) -> Option<String> {
    report
        .failures()
        .find_map(|o| o.error.as_ref().map(ToString::to_string))
}

async fn add_rules(
    config: &AppConfig,
    chain: &ChainRef,
    intent: &RuleIntent,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let commands = compile(intent, chain);
    if !confirm(&commands, config, yes)? {
        println!("Cancelled, nothing changed.");
        return Ok(());
    }

    let options = BatchOptions {
        auto_init_table: config.auto_init_table,
    };
    let report = execute_batch(&SystemNft, &commands, chain, options).await;
    print_report(&report);

    if report.table_initialized {
        audit::log_init_table(&format!("{} {}", chain.family, chain.table), true, None).await;
    }
    let texts: Vec<String> = commands.iter().map(ToString::to_string).collect();
    audit::log_add_rules(
        &chain.to_string(),
        &texts,
        report.failed(),
        report.table_initialized,
        first_error(&report),
    )
    .await;

    batch_result(&report)
}

async fn delete_rules(
    config: &AppConfig,
    chain: &ChainRef,
    request: &str,
    expected: Option<&str>,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = fetch_snapshot(chain).await?;
    print_table(&snapshot);

    let commands = plan_deletion(request, &snapshot)?;
    let unattended = yes || !config.confirm_before_execute;
    match expected {
        Some(expected) => check_fingerprint(&snapshot, expected)?,
        None if unattended => {
            return Err(format!(
                "Deleting without confirmation needs the snapshot id of the listing you read; \
                 pass --snapshot {} if the table above is what you meant",
                snapshot.fingerprint()
            )
            .into());
        }
        None => {}
    }
    if !confirm(&commands, config, yes)? {
        println!("Cancelled, nothing changed.");
        return Ok(());
    }

    // Numbers are only valid for the listing they were read from
    recheck_snapshot(&SystemNft, &snapshot).await?;

    let handles: Vec<u64> = parse_indices(request, snapshot.len())?
        .into_iter()
        .filter_map(|i| snapshot.get(i).map(|e| e.handle))
        .collect();

    let report = execute_batch(&SystemNft, &commands, chain, BatchOptions::default()).await;
    print_report(&report);
    audit::log_delete_rules(
        &chain.to_string(),
        &handles,
        report.failed(),
        first_error(&report),
    )
    .await;

    batch_result(&report)
}
