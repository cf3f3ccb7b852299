//! SWIFT SNAT rule programming
//!
//! Pods on a SWIFT subnet reach the platform DNS resolver and the instance
//! metadata service through source NAT. All rules live in a dedicated NAT
//! chain jumped to from POSTROUTING. Every step checks before it writes, so
//! the whole sequence can be re-run at will; a failed run may leave some
//! rules behind and the next run fills in the rest.

use crate::concurrency::{NamedLocks, SNAT_RULES};
use crate::error::ServiceError;
use iptables_client::IptablesClientTrait;
use iptables_client::constants::{
    AZURE_DNS, AZURE_IMDS, DNS_PORT, HTTP_PORT, NAT, POSTROUTING, SNAT, TCP, UDP,
};
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info};

/// Chain holding the SWIFT SNAT rules.
pub const SWIFT_POSTROUTING: &str = "SWIFT-POSTROUTING";

fn jump_rule() -> Vec<String> {
    vec!["-j".to_string(), SWIFT_POSTROUTING.to_string()]
}

fn snat_rule(pod_subnet: Ipv4Network, destination: &str, protocol: &str, port: u16, to: Ipv4Addr) -> Vec<String> {
    [
        "-m",
        "addrtype",
        "!",
        "--dst-type",
        "local",
        "-s",
        &pod_subnet.to_string(),
        "-d",
        destination,
        "-p",
        protocol,
        "--dport",
        &port.to_string(),
        "-j",
        SNAT,
        "--to",
        &to.to_string(),
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Rules a pod subnet needs: DNS over UDP and TCP to the NC primary address,
/// metadata over TCP to the host primary address.
pub fn swift_rules(pod_subnet: Ipv4Network, nc_primary: Ipv4Addr, host_primary: Ipv4Addr) -> [Vec<String>; 3] {
    [
        snat_rule(pod_subnet, AZURE_DNS, UDP, DNS_PORT, nc_primary),
        snat_rule(pod_subnet, AZURE_DNS, TCP, DNS_PORT, nc_primary),
        snat_rule(pod_subnet, AZURE_IMDS, TCP, HTTP_PORT, host_primary),
    ]
}

/// Pod subnet in network-address form, derived from the first IPv4 address
/// in `secondary_ips`. Non-IPv4 entries are skipped; `None` when there is no
/// IPv4 entry at all.
pub fn pod_subnet<'a>(
    secondary_ips: impl IntoIterator<Item = &'a str>,
    prefix_length: u8,
) -> Result<Option<Ipv4Network>, ServiceError> {
    let Some(representative) = secondary_ips
        .into_iter()
        .find_map(|ip| ip.parse::<Ipv4Addr>().ok())
    else {
        return Ok(None);
    };

    let network = Ipv4Network::new(representative, prefix_length).map_err(|e| {
        ServiceError::Unexpected(format!(
            "invalid pod subnet {representative}/{prefix_length}: {e}"
        ))
    })?;
    let canonical = Ipv4Network::new(network.network(), prefix_length).map_err(|e| {
        ServiceError::Unexpected(format!("invalid pod subnet {network}: {e}"))
    })?;
    Ok(Some(canonical))
}

fn parse_ipv4(what: &str, value: &str) -> Result<Ipv4Addr, ServiceError> {
    value
        .parse()
        .map_err(|e| ServiceError::Unexpected(format!("invalid {what} {value:?}: {e}")))
}

/// Programs the SWIFT SNAT chain through an injected iptables client.
///
/// Runs serialized under the `snatRules` lock domain so NCs sharing the chain
/// do not race on check-then-append.
#[derive(Clone)]
pub struct SnatProgrammer {
    client: Arc<dyn IptablesClientTrait>,
    locks: Arc<NamedLocks>,
}

impl std::fmt::Debug for SnatProgrammer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnatProgrammer").finish_non_exhaustive()
    }
}

impl SnatProgrammer {
    /// Programmer over `client`, serialized through the `snatRules` lock of `locks`
    pub fn new(client: Arc<dyn IptablesClientTrait>, locks: Arc<NamedLocks>) -> Self {
        Self { client, locks }
    }

    /// Make sure the SWIFT SNAT chain, its jump and the three rules for the pod subnet exist.
    pub async fn ensure_pod_subnet_snat(
        &self,
        nc_primary_ip: &str,
        nc_prefix_length: u8,
        host_primary_ip: &str,
        secondary_ips: &[&str],
    ) -> Result<(), ServiceError> {
        let nc_primary = parse_ipv4("NC primary IP", nc_primary_ip)?;
        let host_primary = parse_ipv4("host primary IP", host_primary_ip)?;

        let _guard = self.locks.acquire(SNAT_RULES).await;
        self.ensure_chain().await?;

        let Some(subnet) = pod_subnet(secondary_ips.iter().copied(), nc_prefix_length)? else {
            debug!("No IPv4 secondary IP, skipping SWIFT SNAT rules");
            return Ok(());
        };

        for rule in swift_rules(subnet, nc_primary, host_primary) {
            if self.client.rule_exists(NAT, SWIFT_POSTROUTING, &rule).await? {
                continue;
            }
            info!(subnet = %subnet, rule = ?rule, "Appending SWIFT SNAT rule");
            self.client.append_rule(NAT, SWIFT_POSTROUTING, &rule).await?;
        }
        Ok(())
    }

    // Chain and jump are repaired independently: either can exist without
    // the other.
    async fn ensure_chain(&self) -> Result<(), ServiceError> {
        if !self.client.chain_exists(NAT, SWIFT_POSTROUTING).await? {
            info!("Creating {} chain", SWIFT_POSTROUTING);
            self.client.new_chain(NAT, SWIFT_POSTROUTING).await?;
        }

        let jump = jump_rule();
        if !self.client.rule_exists(NAT, POSTROUTING, &jump).await? {
            info!("Appending jump from {} to {}", POSTROUTING, SWIFT_POSTROUTING);
            self.client.append_rule(NAT, POSTROUTING, &jump).await?;
        }
        Ok(())
    }
}
