/// Errors produced by the routing table, RPC layer, and iterative lookup engine.
#[derive(Debug, thiserror::Error)]
pub enum KademliaError {
    /// An outbound RPC timed out or the transport could not deliver it.
    #[error("transport error contacting {addr}: {reason}")]
    Transport { addr: String, reason: String },

    /// A routing-table or value-store lookup found nothing for the given id.
    #[error("not found")]
    NotFound,

    /// An iterative procedure was invoked with an empty local routing table.
    #[error("no peers in routing table")]
    NoPeers,

    /// A received message could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The local socket could not be bound.
    #[error("could not bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// `"host:port"` did not resolve to any IPv4 address.
    #[error("could not resolve {0} to an IPv4 address")]
    UnresolvableAddress(String),
}

impl KademliaError {
    pub(crate) fn transport(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        KademliaError::Transport {
            addr: addr.into(),
            reason: reason.into(),
        }
    }
}
