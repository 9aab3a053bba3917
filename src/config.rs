use std::net::{IpAddr, UdpSocket};
use std::time::Duration;

/// Runtime settings of a node. Built once and shared by the node, its server and its clients.
#[derive(Clone, Debug)]
pub struct Config {
    /// Host part of the node address.
    pub ip: String,
    /// Sleep between two ticks of each maintenance loop.
    pub stabilize_interval: Duration,
    /// How long a single dial attempt may take before it is abandoned.
    pub dial_timeout: Duration,
    /// Number of dial attempts before a peer is considered unreachable.
    pub dial_attempts: usize,
    /// Read and write timeout on an established RPC connection.
    pub call_timeout: Duration,
}

impl Config {
    /// Constructs a `Config` with the default timings and an explicit host.
    pub fn with_ip(ip: &str) -> Self {
        Config {
            ip: ip.to_string(),
            stabilize_interval: Duration::from_millis(200),
            dial_timeout: Duration::from_millis(250),
            dial_attempts: 5,
            call_timeout: Duration::from_millis(5000),
        }
    }
}

impl Default for Config {
    /// Uses the routable address of this host.
    ///
    /// # Panics
    ///
    /// Panics if the host has no non-loopback IPv4 address.
    fn default() -> Self {
        Config::with_ip(&local_address())
    }
}

/// Returns this host's routable non-loopback IPv4 address.
///
/// # Panics
///
/// Panics if no such address is found, since a node cannot build its identity without one.
pub fn local_address() -> String {
    match probe_local_address() {
        Some(ip) => ip.to_string(),
        None => panic!("Error: failed to find a non-loopback interface with a valid IPv4 address."),
    }
}

/// Connecting a UDP socket only selects a route; no packet leaves the host.
fn probe_local_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    match ip {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(ip),
        _ => None,
    }
}
