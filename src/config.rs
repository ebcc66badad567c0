use std::time::Duration;

use crate::DEFAULT_RPC_TIMEOUT_MS;

/// Per-instance tunables that the spec calls out as configuration, as
/// opposed to the protocol-level constants (`K`, `ALPHA`, `ROUTING_TABLE_SIZE`)
/// that must not vary between peers for the network to agree on bucket
/// placement and lookup fan-out.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Timeout applied to every outbound RPC (§4.5: "recommend 300ms
    /// default, configurable").
    pub rpc_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            rpc_timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS),
        }
    }
}
