//! Rule compilation
//!
//! Turns a [`RuleIntent`] into the ordered list of `add rule` commands that
//! realize it. One command per (protocol, port unit) pair; each carries the
//! full IP clause.
//!
//! | intent                         | commands |
//! |--------------------------------|----------|
//! | tcp, `22`                      | 1        |
//! | tcp, `8000-8100`               | 1        |
//! | udp, `53,123,5000-5100`        | 3        |
//! | icmp (ports ignored)           | 1        |
//! | preset `mail`                  | 5        |
//! | preset `dns`                   | 2        |
//!
//! Compilation is pure and never fails: every input was validated by the
//! port and IP parsers already.

use crate::core::firewall::{Action, ChainRef, NftCommand, ProtocolSpec, RuleIntent};
use crate::core::ip_spec::IpSpec;
use crate::core::port_spec::PortUnit;
use std::fmt::Write;
use tracing::{debug, warn};

/// How the protocol part of one command is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtocolClause<'a> {
    /// `<proto> dport <unit>`
    Port(&'a str, PortUnit),
    /// `ip protocol <proto>`, for protocols without ports
    ProtocolOnly(&'a str),
    /// `meta l4proto <proto>`, a port-bearing protocol given no ports
    AnyPort(&'a str),
}

/// Expands an intent into atomic `add rule` commands, in execution order.
pub fn compile(intent: &RuleIntent, chain: &ChainRef) -> Vec<NftCommand> {
    let clauses = resolve_clauses(intent);
    let commands: Vec<NftCommand> = clauses
        .into_iter()
        .map(|clause| render_add(chain, &intent.ip, clause, intent.action))
        .collect();

    debug!(
        "Compiled {} command(s) for {} {}",
        commands.len(),
        intent.action,
        intent.protocol
    );
    commands
}

fn resolve_clauses(intent: &RuleIntent) -> Vec<ProtocolClause<'_>> {
    match &intent.protocol {
        ProtocolSpec::Preset(service) => service
            .expand()
            .into_iter()
            .map(|(protocol, port)| ProtocolClause::Port(protocol.as_str(), PortUnit::Single(port)))
            .collect(),
        ProtocolSpec::Named(protocol) if !protocol.carries_ports() => {
            if intent.ports.is_some() {
                warn!("Protocol {protocol} has no ports, ignoring the port specification");
            }
            vec![ProtocolClause::ProtocolOnly(protocol.as_str())]
        }
        ProtocolSpec::Named(protocol) => port_clauses(protocol.as_str(), intent),
        ProtocolSpec::Custom(name) => port_clauses(name, intent),
    }
}

fn port_clauses<'a>(name: &'a str, intent: &RuleIntent) -> Vec<ProtocolClause<'a>> {
    match &intent.ports {
        Some(ports) => ports
            .units()
            .into_iter()
            .map(|unit| ProtocolClause::Port(name, unit))
            .collect(),
        None => vec![ProtocolClause::AnyPort(name)],
    }
}

fn render_add(chain: &ChainRef, ip: &IpSpec, clause: ProtocolClause<'_>, action: Action) -> NftCommand {
    let mut out = String::new();
    let _ = write!(out, "add rule {chain} ip daddr {}", ip.to_nft());
    match clause {
        ProtocolClause::Port(name, unit) => {
            let _ = write!(out, " {name} dport {}", unit.to_nft());
        }
        ProtocolClause::ProtocolOnly(name) => {
            let _ = write!(out, " ip protocol {name}");
        }
        ProtocolClause::AnyPort(name) => {
            let _ = write!(out, " meta l4proto {name}");
        }
    }
    let _ = write!(out, " {}", action.as_str());
    NftCommand::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::firewall::Protocol;
    use crate::core::port_spec::PortSpec;
    use crate::core::presets::PresetService;

    fn intent(action: Action, protocol: Protocol, ports: Option<&str>, ip: &str) -> RuleIntent {
        RuleIntent {
            action,
            protocol: ProtocolSpec::Named(protocol),
            ports: ports.map(|p| PortSpec::parse(p).unwrap()),
            ip: IpSpec::parse(ip).unwrap(),
        }
    }

    fn texts(commands: &[NftCommand]) -> Vec<&str> {
        commands.iter().map(NftCommand::as_str).collect()
    }

    #[test]
    fn test_single_port_drop() {
        let commands = compile(
            &intent(Action::Drop, Protocol::Tcp, Some("5667"), ""),
            &ChainRef::default(),
        );
        assert_eq!(commands.len(), 1);
        let text = commands[0].as_str();
        assert!(text.contains("ip daddr 0.0.0.0/0"));
        assert!(text.contains("tcp dport 5667"));
        assert!(text.ends_with("drop"));
        assert_eq!(
            text,
            "add rule ip filter input ip daddr 0.0.0.0/0 tcp dport 5667 drop"
        );
    }

    #[test]
    fn test_range_is_one_command() {
        let commands = compile(
            &intent(Action::Accept, Protocol::Udp, Some("8080-8090"), "10.0.0.0/8"),
            &ChainRef::default(),
        );
        assert_eq!(
            texts(&commands),
            vec!["add rule ip filter input ip daddr 10.0.0.0/8 udp dport 8080-8090 accept"]
        );
    }

    #[test]
    fn test_list_is_one_command_per_entry() {
        let commands = compile(
            &intent(Action::Accept, Protocol::Tcp, Some("80,443,9000-9100"), "192.168.1.10"),
            &ChainRef::default(),
        );
        assert_eq!(
            texts(&commands),
            vec![
                "add rule ip filter input ip daddr 192.168.1.10 tcp dport 80 accept",
                "add rule ip filter input ip daddr 192.168.1.10 tcp dport 443 accept",
                "add rule ip filter input ip daddr 192.168.1.10 tcp dport 9000-9100 accept",
            ]
        );
    }

    #[test]
    fn test_ip_range_clause() {
        let commands = compile(
            &intent(Action::Drop, Protocol::Tcp, Some("22"), "192.168.1.0-192.168.1.255"),
            &ChainRef::default(),
        );
        assert!(commands[0].as_str().contains("ip daddr 192.168.1.0-192.168.1.255"));
    }

    #[test]
    fn test_icmp_has_no_port_clause() {
        let commands = compile(
            &intent(Action::Drop, Protocol::Icmp, Some("80,443"), ""),
            &ChainRef::default(),
        );
        assert_eq!(
            texts(&commands),
            vec!["add rule ip filter input ip daddr 0.0.0.0/0 ip protocol icmp drop"]
        );
        assert!(!commands[0].as_str().contains("dport"));
    }

    #[test]
    fn test_port_protocol_without_ports() {
        let commands = compile(
            &intent(Action::Accept, Protocol::Sctp, None, ""),
            &ChainRef::default(),
        );
        assert_eq!(
            texts(&commands),
            vec!["add rule ip filter input ip daddr 0.0.0.0/0 meta l4proto sctp accept"]
        );
    }

    #[test]
    fn test_custom_protocol_keeps_ports() {
        let intent = RuleIntent {
            action: Action::Accept,
            protocol: ProtocolSpec::Custom("udplite2".to_string()),
            ports: Some(PortSpec::parse("5000").unwrap()),
            ip: IpSpec::Any,
        };
        let commands = compile(&intent, &ChainRef::default());
        assert!(commands[0].as_str().contains("udplite2 dport 5000"));
    }

    #[test]
    fn test_mail_preset() {
        let commands = compile(
            &RuleIntent::preset(Action::Accept, PresetService::Mail, IpSpec::Any),
            &ChainRef::default(),
        );
        assert_eq!(commands.len(), 5);
        for (cmd, port) in commands.iter().zip([25, 110, 143, 993, 995]) {
            assert!(cmd.as_str().contains(&format!("tcp dport {port} ")));
            assert!(cmd.as_str().ends_with(" accept"));
            assert!(cmd.as_str().contains("ip daddr 0.0.0.0/0"));
        }
    }

    #[test]
    fn test_dns_preset() {
        let commands = compile(
            &RuleIntent::preset(Action::Drop, PresetService::Dns, IpSpec::Any),
            &ChainRef::default(),
        );
        assert_eq!(
            texts(&commands),
            vec![
                "add rule ip filter input ip daddr 0.0.0.0/0 tcp dport 53 drop",
                "add rule ip filter input ip daddr 0.0.0.0/0 udp dport 53 drop",
            ]
        );
    }

    #[test]
    fn test_preset_ignores_port_spec() {
        let mut intent = RuleIntent::preset(Action::Accept, PresetService::Ssh, IpSpec::Any);
        intent.ports = Some(PortSpec::parse("1-100").unwrap());
        let commands = compile(&intent, &ChainRef::default());
        assert_eq!(commands.len(), 1);
        assert!(commands[0].as_str().contains("tcp dport 22"));
    }

    #[test]
    fn test_custom_chain() {
        let chain = ChainRef {
            family: "inet".to_string(),
            table: "fw".to_string(),
            chain: "in".to_string(),
        };
        let commands = compile(&intent(Action::Accept, Protocol::Tcp, Some("22"), ""), &chain);
        assert!(commands[0].as_str().starts_with("add rule inet fw in "));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let intent = intent(Action::Accept, Protocol::Tcp, Some("1,2,3"), "10.1.2.3/32");
        let chain = ChainRef::default();
        assert_eq!(compile(&intent, &chain), compile(&intent, &chain));
    }
}
