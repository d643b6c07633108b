//! Host veth plumbing (simplified)
//!
//! Drives the iproute2 `ip` binary instead of talking netlink directly.
//! This keeps the daemon free of root-only FFI and makes every operation
//! reproducible from a shell.

use std::process::Command;

use async_trait::async_trait;
use uuid::Uuid;

use crate::pool::ResourceFactory;
use crate::resource::Veth;
use crate::{Error, Result};

/// Linux interface names are capped at IFNAMSIZ - 1 bytes
pub const MAX_LINK_NAME: usize = 15;

/// Suffix length reserved for generated interface names
pub const NAME_SUFFIX_RESERVED: usize = 11;

/// Random host-side interface name: prefix + 11 hex chars
pub fn random_veth_name(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, &suffix[..NAME_SUFFIX_RESERVED])
}

/// Stable host-side interface name for a pod, so repeated allocations for
/// the same pod prefer the same interface across daemon restarts.
pub fn veth_name_for_pod(namespace: &str, pod: &str, prefix: &str) -> String {
    let key = format!("{}/{}", namespace, pod);
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).simple().to_string();
    format!("{}{}", prefix, &digest[..NAME_SUFFIX_RESERVED])
}

fn run_ip(args: &[&str]) -> Result<Vec<u8>> {
    let output = Command::new("ip").args(args).output()?;
    if !output.status.success() {
        return Err(Error::Network(format!(
            "ip {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}

/// Create a veth pair; both ends appear in the host namespace
pub fn create_veth_pair(host: &str, peer: &str) -> Result<()> {
    run_ip(&["link", "add", host, "type", "veth", "peer", "name", peer])?;
    Ok(())
}

/// Bring a link up
pub fn set_link_up(name: &str) -> Result<()> {
    run_ip(&["link", "set", name, "up"])?;
    Ok(())
}

/// Delete a link; a veth peer disappears with its pair
pub fn delete_link(name: &str) -> Result<()> {
    run_ip(&["link", "del", name])?;
    Ok(())
}

/// List host links whose name carries the given prefix
pub fn list_links(prefix: &str) -> Result<Vec<LinkInfo>> {
    let stdout = run_ip(&["-j", "link", "show"])?;
    let text = String::from_utf8_lossy(&stdout);
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let links: Vec<LinkInfo> = serde_json::from_str(&text)?;
    Ok(links
        .into_iter()
        .filter(|l| l.ifname.starts_with(prefix))
        .collect())
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LinkInfo {
    pub ifname: String,
    #[serde(default)]
    pub operstate: Option<String>,
    #[serde(rename = "link")]
    #[serde(default)]
    pub peer: Option<String>,
}

/// Factory provisioning veth pairs for the pool
pub struct VethFactory {
    prefix: String,
}

impl VethFactory {
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.len() + NAME_SUFFIX_RESERVED > MAX_LINK_NAME {
            return Err(Error::Config(format!(
                "veth prefix must be 1..={} chars, got {:?}",
                MAX_LINK_NAME - NAME_SUFFIX_RESERVED,
                prefix
            )));
        }
        Ok(Self { prefix })
    }
}

#[async_trait]
impl ResourceFactory<Veth> for VethFactory {
    async fn create(&self) -> Result<Veth> {
        let host = random_veth_name(&self.prefix);
        let peer = format!("vp{}", &host[self.prefix.len()..]);
        create_veth_pair(&host, &peer)?;
        if let Err(e) = set_link_up(&host) {
            // Half-provisioned pair: tear it down rather than pool it
            let _ = delete_link(&host);
            return Err(e);
        }
        tracing::info!(host = %host, peer = %peer, "veth pair created");
        Ok(Veth::new(host, peer))
    }

    async fn dispose(&self, resource: &Veth) -> Result<()> {
        delete_link(&resource.host_veth)?;
        tracing::info!(host = %resource.host_veth, "veth pair deleted");
        Ok(())
    }
}
