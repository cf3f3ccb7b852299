//! Table, chain, protocol, and well-known address constants

pub const NAT: &str = "nat";
pub const POSTROUTING: &str = "POSTROUTING";
pub const PREROUTING: &str = "PREROUTING";
pub const INPUT: &str = "INPUT";
pub const OUTPUT: &str = "OUTPUT";
pub const FORWARD: &str = "FORWARD";

/// Chains that exist in every table without being created.
pub const BUILTIN_CHAINS: [&str; 5] = [INPUT, OUTPUT, PREROUTING, POSTROUTING, FORWARD];

pub const SNAT: &str = "SNAT";
pub const UDP: &str = "udp";
pub const TCP: &str = "tcp";

pub const DNS_PORT: u16 = 53;
pub const HTTP_PORT: u16 = 80;

/// Platform DNS resolver.
pub const AZURE_DNS: &str = "168.63.129.16";
/// Instance metadata service.
pub const AZURE_IMDS: &str = "169.254.169.254";
