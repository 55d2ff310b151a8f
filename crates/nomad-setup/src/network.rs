// ABOUTME: LAN IPv4 detection through an ordered list of strategies.
// ABOUTME: Each strategy returns Option; loopback and link-local results are discarded.

use std::net::{IpAddr, Ipv4Addr};
use std::process::Command;

/// One way of finding the machine's primary LAN address.
///
/// Implementations never panic or propagate errors; a failure is `None`.
pub trait AddressStrategy {
    fn name(&self) -> &'static str;
    fn detect(&self) -> Option<Ipv4Addr>;
}

/// Whether `addr` is worth putting in a payload.
///
/// Rejects loopback (`127.0.0.0/8`), link-local (`169.254.0.0/16`),
/// unspecified and broadcast addresses.
pub fn is_usable(addr: &Ipv4Addr) -> bool {
    !(addr.is_loopback() || addr.is_link_local() || addr.is_unspecified() || addr.is_broadcast())
}

/// Try each strategy in order and return the first usable address.
pub fn detect_primary_ipv4(strategies: &[Box<dyn AddressStrategy>]) -> Option<Ipv4Addr> {
    for strategy in strategies {
        match strategy.detect() {
            Some(addr) if is_usable(&addr) => {
                tracing::info!(strategy = strategy.name(), %addr, "detected LAN address");
                return Some(addr);
            }
            Some(addr) => {
                tracing::debug!(strategy = strategy.name(), %addr, "ignoring unusable address");
            }
            None => {
                tracing::debug!(strategy = strategy.name(), "no address found");
            }
        }
    }
    None
}

/// Strategies for the current platform, most reliable first.
pub fn default_strategies() -> Vec<Box<dyn AddressStrategy>> {
    let mut strategies: Vec<Box<dyn AddressStrategy>> =
        vec![Box::new(DefaultInterface), Box::new(LanInterfaces)];

    if cfg!(windows) {
        strategies.push(Box::new(CommandStrategy {
            name: "ipconfig",
            program: "ipconfig",
            args: &[],
            parse: parse_ipconfig,
        }));
    } else {
        strategies.push(Box::new(CommandStrategy {
            name: "ifconfig",
            program: "ifconfig",
            args: &[],
            parse: parse_ifconfig,
        }));
    }

    strategies
}

/// First usable IPv4 address among `addrs`.
pub fn first_usable_ipv4<I>(addrs: I) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = IpAddr>,
{
    addrs.into_iter().find_map(|addr| match addr {
        IpAddr::V4(v4) if is_usable(&v4) => Some(v4),
        _ => None,
    })
}

fn interface_ipv4(intf: &netdev::Interface) -> Option<Ipv4Addr> {
    first_usable_ipv4(
        intf.ipv4
            .iter()
            .map(|&net| netdev::ip::IpNet::from(net).addr()),
    )
}

/// Addresses of the interface that carries the default route.
pub struct DefaultInterface;

impl AddressStrategy for DefaultInterface {
    fn name(&self) -> &'static str {
        "default-interface"
    }

    fn detect(&self) -> Option<Ipv4Addr> {
        match netdev::get_default_interface() {
            Ok(intf) => {
                tracing::debug!(interface = %intf.name, "found default interface");
                interface_ipv4(&intf)
            }
            Err(e) => {
                tracing::debug!(error = %e, "no default interface");
                None
            }
        }
    }
}

/// Any wired or wireless interface that is up, default-route interfaces first.
pub struct LanInterfaces;

impl AddressStrategy for LanInterfaces {
    fn name(&self) -> &'static str {
        "lan-interfaces"
    }

    fn detect(&self) -> Option<Ipv4Addr> {
        let mut candidates: Vec<_> = netdev::get_interfaces()
            .into_iter()
            .filter(|intf| intf.is_up())
            .filter(|intf| {
                matches!(
                    intf.if_type,
                    netdev::interface::InterfaceType::Ethernet
                        | netdev::interface::InterfaceType::Wireless80211
                )
            })
            .collect();
        candidates.sort_by_key(|intf| !intf.default);
        candidates.iter().find_map(interface_ipv4)
    }
}

/// Runs a command and parses its stdout.
pub struct CommandStrategy {
    pub name: &'static str,
    pub program: &'static str,
    pub args: &'static [&'static str],
    pub parse: fn(&str) -> Option<Ipv4Addr>,
}

impl AddressStrategy for CommandStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn detect(&self) -> Option<Ipv4Addr> {
        let output = Command::new(self.program).args(self.args).output().ok()?;
        if !output.status.success() {
            return None;
        }
        (self.parse)(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `ifconfig` output, both `inet 10.0.0.2` and legacy `inet addr:10.0.0.2`.
pub fn parse_ifconfig(output: &str) -> Option<Ipv4Addr> {
    let mut tokens = output.split_whitespace();
    while let Some(token) = tokens.next() {
        let candidate = if let Some(rest) = token.strip_prefix("addr:") {
            rest
        } else if token == "inet" {
            match tokens.next() {
                Some(next) => next.strip_prefix("addr:").unwrap_or(next),
                None => break,
            }
        } else {
            continue;
        };
        if let Ok(addr) = candidate.parse::<Ipv4Addr>() {
            if is_usable(&addr) {
                return Some(addr);
            }
        }
    }
    None
}

/// Parse Windows `ipconfig` output: `IPv4 Address. . . . : 192.168.1.42`.
pub fn parse_ipconfig(output: &str) -> Option<Ipv4Addr> {
    output
        .lines()
        .filter(|line| line.contains("IPv4"))
        .filter_map(|line| line.rsplit(':').next())
        .filter_map(|value| value.trim().trim_end_matches("(Preferred)").trim().parse().ok())
        .find(is_usable)
}
