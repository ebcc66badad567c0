use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::net::{SocketAddr, ToSocketAddrs};

use serde::{Deserialize, Serialize};

use crate::error::KademliaError;
use crate::id::NodeId;

/// A peer, as referenced everywhere a contact is exchanged over the wire or
/// stored in a routing table: its id plus the IPv4 address it is reachable
/// at.
///
/// Two contacts are equal iff their ids are equal; `host`/`port` may differ
/// across observations of the same peer (the latest observation wins, see
/// [`crate::routing::RoutingTable::update`]).
#[derive(Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
}

impl Contact {
    pub fn new(id: NodeId, host: String, port: u16) -> Self {
        Contact { id, host, port }
    }

    /// The socket address this contact is reachable at.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Contact) -> bool {
        self.id == other.id
    }
}

impl Eq for Contact {}

impl std::hash::Hash for Contact {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for Contact {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}@{}", self.id.as_hex(), self.addr())
    }
}

/// Resolves `"host:port"` to its first IPv4 address, per §6: "Address parsing
/// from `host:port` must resolve the host and pick the first IPv4 result."
pub fn resolve_ipv4(addr: &str) -> Result<(String, u16), KademliaError> {
    let resolved: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|_| KademliaError::UnresolvableAddress(addr.to_string()))?
        .collect();

    resolved
        .into_iter()
        .find(|a| a.is_ipv4())
        .map(|a| (a.ip().to_string(), a.port()))
        .ok_or_else(|| KademliaError::UnresolvableAddress(addr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_host_and_port() {
        let id = NodeId::rand();
        let a = Contact::new(id, "127.0.0.1".into(), 1111);
        let b = Contact::new(id, "10.0.0.5".into(), 2222);
        assert_eq!(a, b);
    }

    #[test]
    fn resolve_ipv4_picks_an_ipv4_address() {
        let (host, port) = resolve_ipv4("127.0.0.1:9000").unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 9000);
    }

    #[test]
    fn resolve_ipv4_rejects_garbage() {
        assert!(resolve_ipv4("not-a-host-or-port").is_err());
    }
}
