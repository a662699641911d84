use serde::{Deserialize, Serialize};

/// Identity of a service as seen by consumers: interface name plus group.
///
/// Used as a map key throughout the crate, so equality is by value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ServiceId {
    pub name: String,
    pub group: String,
}

impl ServiceId {
    pub fn new(name: &str, group: &str) -> Self {
        Self {
            name: name.to_string(),
            group: group.to_string(),
        }
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.group, self.name)
    }
}

/// Network location of a provider process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One published service instance: the unit the registration pipeline
/// announces and the discovery side receives back as a node payload.
///
/// Equality is structural across all fields because the same value is used
/// both as the serialized node data and as a local map key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RegisterMeta {
    pub app_name: String,
    /// Load-balancing weight. Carried in the payload, not interpreted here.
    pub weight: u32,
    pub address: Address,
    pub service: ServiceId,
}

impl RegisterMeta {
    pub fn new(app_name: &str, weight: u32, address: Address, service: ServiceId) -> Self {
        Self {
            app_name: app_name.to_string(),
            weight,
            address,
            service,
        }
    }
}

/// Publication state of a meta inside the registration pipeline.
///
/// There is no `Removed` variant: removal is implicit, the ephemeral node
/// simply disappears when the owning session ends or the node is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterState {
    /// Queued or attempted, creation not yet confirmed.
    Prepare,
    /// Node confirmed created on the store.
    Done,
}

/// Builds the parent path a service's ephemeral children live under:
/// `/<namespace>/<group>/<name>`.
pub fn service_path(namespace: &str, id: &ServiceId) -> String {
    format!("/{}/{}/{}", namespace, id.group, id.name)
}

/// Serializes a meta into the ephemeral node's data payload.
pub fn encode_meta(meta: &RegisterMeta) -> anyhow::Result<Vec<u8>> {
    Ok(serde_json::to_vec(meta)?)
}

/// Parses a node data payload back into a meta.
///
/// Callers drop the event (with a warning) when this fails; a malformed
/// payload must never take the watcher down.
pub fn decode_meta(data: &[u8]) -> anyhow::Result<RegisterMeta> {
    Ok(serde_json::from_slice(data)?)
}
