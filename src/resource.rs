//! Pooled network resource types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A network resource the pool can own and hand out.
///
/// The identity string is the only key used by the pool; it must be unique
/// across every resource the pool ever sees.
pub trait NetworkResource: Send + Sync {
    /// Stable identity, unique across the pool's lifetime
    fn resource_id(&self) -> &str;

    /// Type tag, e.g. "veth"
    fn resource_type(&self) -> &str;
}

/// A veth pair owned by the daemon
///
/// The host-side interface name doubles as the resource identity. The peer
/// end is what eventually gets moved into a pod's network namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Veth {
    pub host_veth: String,
    pub peer_veth: String,
    pub created_at: DateTime<Utc>,
}

impl Veth {
    pub fn new(host_veth: impl Into<String>, peer_veth: impl Into<String>) -> Self {
        Self {
            host_veth: host_veth.into(),
            peer_veth: peer_veth.into(),
            created_at: Utc::now(),
        }
    }
}

impl NetworkResource for Veth {
    fn resource_id(&self) -> &str {
        &self.host_veth
    }

    fn resource_type(&self) -> &str {
        "veth"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_veth_identity() {
        let v = Veth::new("vethab12cd34ef5", "eth0");
        assert_eq!(v.resource_id(), "vethab12cd34ef5");
        assert_eq!(v.resource_type(), "veth");
    }

    #[test]
    fn test_veth_serialization() {
        let v = Veth::new("veth0", "eth0");
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("\"host_veth\":\"veth0\""));

        let parsed: Veth = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.host_veth, v.host_veth);
    }
}
