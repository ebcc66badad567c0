//! The `Node` façade (§4.6): holds a node's identity, routing table, value
//! store, and RPC endpoint, and exposes the `Do*` operations that the CLI
//! and tests drive. Built on top of [`crate::protocol::Protocol`] for the
//! wire, [`crate::routing::RoutingTable`] for peer bookkeeping, and
//! [`crate::lookup::Shortlist`] for the three iterative procedures (§4.7).

use std::collections::HashMap;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::contact::Contact;
use crate::error::KademliaError;
use crate::id::NodeId;
use crate::lookup::Shortlist;
use crate::protocol::{Message, Protocol, Request, RequestPayload, Response, ResponsePayload};
use crate::routing::{RoutingTable, UpdateOutcome};
use crate::storage::ValueStore;
use crate::{NodeConfig, ALPHA, K};

/// The outcome of a single `FIND_VALUE` RPC (§4.6): either the value itself,
/// or the closest contacts the responder knew of instead.
#[derive(Debug, Clone)]
pub enum FindValueResult {
    Value(Vec<u8>),
    Contacts(Vec<Contact>),
}

/// Outcome of one round of an iterative lookup (§4.7): what a single probed
/// contact returned, folded down to the two shapes the shortlist cares
/// about regardless of whether the round was FIND_NODE or FIND_VALUE.
enum RoundOutcome {
    Contacts(Vec<Contact>),
    Value(Vec<u8>),
}

/// The result of running the shared iterative-lookup skeleton (§4.7) to
/// completion.
struct LookupResult {
    contacts: Vec<Contact>,
    value: Option<Vec<u8>>,
    /// The closest already-probed contact known *not* to hold the value,
    /// i.e. the caching target for `DoIterativeFindValue`.
    cache_target: Option<Contact>,
}

/// A node in the Kademlia DHT.
#[derive(Clone)]
pub struct Node {
    id: NodeId,
    self_contact: Contact,
    routing_table: Arc<Mutex<RoutingTable>>,
    storage: Arc<Mutex<ValueStore>>,
    pending_requests: Arc<Mutex<HashMap<NodeId, Sender<Response>>>>,
    protocol: Arc<Protocol>,
    config: NodeConfig,
    is_active: Arc<AtomicBool>,
}

impl Node {
    /// Binds a node to `listen_addr` with the default [`NodeConfig`].
    pub fn new(listen_addr: &str) -> Result<Self, KademliaError> {
        Node::with_config(listen_addr, NodeConfig::default())
    }

    /// Binds a node to `listen_addr`, generating a fresh random id (§4.1:
    /// "Generated uniformly at random at node creation").
    pub fn with_config(listen_addr: &str, config: NodeConfig) -> Result<Self, KademliaError> {
        let socket = UdpSocket::bind(listen_addr).map_err(|source| KademliaError::Bind {
            addr: listen_addr.to_string(),
            source,
        })?;
        let local_addr = socket.local_addr().map_err(|source| KademliaError::Bind {
            addr: listen_addr.to_string(),
            source,
        })?;

        let id = NodeId::rand();
        let self_contact = Contact::new(id, local_addr.ip().to_string(), local_addr.port());

        let (tx, rx) = mpsc::channel();
        let protocol = Arc::new(Protocol::new(socket, tx));

        let node = Node {
            id,
            self_contact,
            routing_table: Arc::new(Mutex::new(RoutingTable::new(id))),
            storage: Arc::new(Mutex::new(ValueStore::new())),
            pending_requests: Arc::new(Mutex::new(HashMap::new())),
            protocol,
            config,
            is_active: Arc::new(AtomicBool::new(true)),
        };

        node.start_message_handler(rx);
        info!("{:?} - node started", node.self_contact);
        Ok(node)
    }

    /// This node's own id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// This node's own contact, as handed to peers in every request.
    pub fn self_contact(&self) -> Contact {
        self.self_contact.clone()
    }

    /// Resolves `node_id` to a `Contact`: trivially `self` if it names this
    /// node (§10.6, following `FindContact`'s own-id behavior in the
    /// retrieved Go original), otherwise a routing-table lookup.
    pub fn find_contact(&self, node_id: &NodeId) -> Result<Contact, KademliaError> {
        if *node_id == self.id {
            return Ok(self.self_contact.clone());
        }
        self.lock_routing_table().find(node_id).ok_or(KademliaError::NotFound)
    }

    /// Shuts down the node's message-handling thread. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.protocol.send_message(&Message::Kill, &self.self_contact);
    }

    // ---- RPC layer (§4.5) --------------------------------------------

    /// Sends PING to `host:port`. The peer's id is unknown until the
    /// response arrives, so a placeholder contact (its id is never used for
    /// addressing - UDP dispatch only reads host/port) carries the request.
    pub fn do_ping(&self, host: &str, port: u16) -> Result<Contact, KademliaError> {
        let dest = Contact::new(NodeId::default(), host.to_string(), port);
        let response = self.call(&dest, RequestPayload::Ping)?;
        Ok(response.receiver)
    }

    /// Sends STORE to `contact`. Does not write to the local value store.
    pub fn do_store(&self, contact: &Contact, key: NodeId, value: Vec<u8>) -> Result<(), KademliaError> {
        self.call(contact, RequestPayload::Store(key, value))?;
        Ok(())
    }

    /// Sends FIND_NODE to `contact`, returning the (up to `k`) contacts it
    /// reports closest to `target`.
    pub fn do_find_node(&self, contact: &Contact, target: &NodeId) -> Result<Vec<Contact>, KademliaError> {
        let response = self.call(contact, RequestPayload::FindNode(*target))?;
        match response.payload {
            ResponsePayload::Nodes(contacts) => {
                self.spawn_update_routing_table_many(&contacts);
                Ok(contacts)
            },
            other => Err(KademliaError::Protocol(format!(
                "unexpected response to FIND_NODE: {:?}",
                other
            ))),
        }
    }

    /// Sends FIND_VALUE to `contact`.
    pub fn do_find_value(&self, contact: &Contact, key: &NodeId) -> Result<FindValueResult, KademliaError> {
        let response = self.call(contact, RequestPayload::FindValue(*key))?;
        match response.payload {
            ResponsePayload::Value(value) => Ok(FindValueResult::Value(value)),
            ResponsePayload::Nodes(contacts) => {
                self.spawn_update_routing_table_many(&contacts);
                Ok(FindValueResult::Contacts(contacts))
            },
            other => Err(KademliaError::Protocol(format!(
                "unexpected response to FIND_VALUE: {:?}",
                other
            ))),
        }
    }

    /// Direct local `ValueStore` lookup; never touches the network.
    pub fn local_find_value(&self, key: &NodeId) -> Result<Vec<u8>, KademliaError> {
        self.storage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
            .ok_or(KademliaError::NotFound)
    }

    // ---- Iterative lookup engine (§4.7) --------------------------------

    /// Returns the final `k` closest live contacts to `target`.
    pub fn do_iterative_find_node(&self, target: &NodeId) -> Result<Vec<Contact>, KademliaError> {
        let result = self.iterative_lookup(target, false)?;
        Ok(result.contacts)
    }

    /// Looks up `key`, caching the value one hop closer on the nearest
    /// probed contact that did not already have it, per §4.7.
    pub fn do_iterative_find_value(&self, key: &NodeId) -> Result<Vec<u8>, KademliaError> {
        let result = self.iterative_lookup(key, true)?;
        match result.value {
            Some(value) => {
                if let Some(cache_target) = result.cache_target {
                    if let Err(err) = self.do_store(&cache_target, *key, value.clone()) {
                        debug!(
                            "{:?} - best-effort cache store to {:?} failed: {}",
                            self.self_contact, cache_target, err
                        );
                    }
                }
                Ok(value)
            },
            None => Err(KademliaError::NotFound),
        }
    }

    /// Finds the `k` closest contacts to `key` and issues STORE to each in
    /// parallel, returning those that accepted it.
    pub fn do_iterative_store(&self, key: NodeId, value: Vec<u8>) -> Result<Vec<Contact>, KademliaError> {
        let contacts = self.do_iterative_find_node(&key)?;
        if contacts.is_empty() {
            return Ok(Vec::new());
        }

        let (tx, rx) = mpsc::channel();
        for contact in &contacts {
            let node = self.clone();
            let contact = contact.clone();
            let value = value.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let accepted = node.do_store(&contact, key, value).is_ok();
                let _ = tx.send(if accepted { Some(contact) } else { None });
            });
        }
        drop(tx);

        let mut accepted = Vec::new();
        for _ in 0..contacts.len() {
            if let Some(contact) = rx.recv().expect("store thread dropped its sender") {
                accepted.push(contact);
            }
        }
        Ok(accepted)
    }

    /// Runs the shared skeleton of §4.7: seed the shortlist with the
    /// `alpha` closest local contacts, fan out in `alpha`-wide rounds until
    /// a round fails to tighten the closest-known distance, then take one
    /// sweeping round over every remaining unprobed entry in the
    /// current k-closest before terminating.
    fn iterative_lookup(&self, target: &NodeId, want_value: bool) -> Result<LookupResult, KademliaError> {
        let seed = self.lock_routing_table().k_closest(target, ALPHA);
        if seed.is_empty() {
            return Err(KademliaError::NoPeers);
        }

        let mut shortlist = Shortlist::new(*target, self.id, seed);

        loop {
            let batch = shortlist.next_batch(ALPHA);
            if batch.is_empty() {
                break;
            }
            let (tightened, value) = self.probe_round(&batch, target, want_value, &mut shortlist);
            if let Some(value) = value {
                return Ok(LookupResult {
                    contacts: shortlist.k_closest_active(K),
                    value: Some(value),
                    cache_target: shortlist.closest_active_without_value(),
                });
            }
            if tightened {
                continue;
            }

            // This round did not improve on the closest-known distance: one
            // more sweep over every unprobed entry in the current
            // k-closest, then terminate regardless of its outcome.
            let sweep = shortlist.sweep_batch();
            if sweep.is_empty() {
                break;
            }
            let (tightened, value) = self.probe_round(&sweep, target, want_value, &mut shortlist);
            if let Some(value) = value {
                return Ok(LookupResult {
                    contacts: shortlist.k_closest_active(K),
                    value: Some(value),
                    cache_target: shortlist.closest_active_without_value(),
                });
            }
            if !tightened {
                break;
            }
        }

        Ok(LookupResult {
            contacts: shortlist.k_closest_active(K),
            value: None,
            cache_target: None,
        })
    }

    /// Issues the RPC (FIND_NODE or FIND_VALUE, per `want_value`) to every
    /// contact in `batch` in parallel, awaits all of them, then folds the
    /// results into `shortlist`. Returns whether the round tightened the
    /// closest-known distance, and a value if one was discovered.
    fn probe_round(
        &self,
        batch: &[Contact],
        target: &NodeId,
        want_value: bool,
        shortlist: &mut Shortlist,
    ) -> (bool, Option<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        for contact in batch {
            let node = self.clone();
            let contact = contact.clone();
            let target = *target;
            let tx = tx.clone();
            thread::spawn(move || {
                let outcome = if want_value {
                    node.do_find_value(&contact, &target).map(|result| match result {
                        FindValueResult::Value(value) => RoundOutcome::Value(value),
                        FindValueResult::Contacts(contacts) => RoundOutcome::Contacts(contacts),
                    })
                } else {
                    node.do_find_node(&contact, &target).map(RoundOutcome::Contacts)
                };
                let _ = tx.send((contact.id, outcome));
            });
        }
        drop(tx);

        let mut tightened = false;
        let mut found_value = None;
        for _ in 0..batch.len() {
            let (id, outcome) = rx.recv().expect("probe thread dropped its sender");
            match outcome {
                Ok(RoundOutcome::Value(value)) => {
                    shortlist.mark_active(&id);
                    found_value = Some(value);
                },
                Ok(RoundOutcome::Contacts(contacts)) => {
                    if want_value {
                        shortlist.mark_active_without_value(&id);
                    } else {
                        shortlist.mark_active(&id);
                    }
                    if shortlist.merge(contacts) {
                        tightened = true;
                    }
                },
                Err(err) => {
                    debug!("{:?} - probe of {:?} failed: {}", self.self_contact, id, err);
                    shortlist.mark_failed(&id);
                },
            }
        }
        (tightened, found_value)
    }

    // ---- wire plumbing --------------------------------------------------

    /// Sends `payload` to `dest` and blocks until a response arrives or the
    /// configured RPC timeout elapses (§4.5, §5). Stateless: on timeout the
    /// pending entry is removed and no retry is attempted.
    fn call(&self, dest: &Contact, payload: RequestPayload) -> Result<Response, KademliaError> {
        let (tx, rx) = mpsc::channel();
        let request_id = {
            let mut pending = self.lock_pending();
            let mut id = NodeId::rand();
            while pending.contains_key(&id) {
                id = NodeId::rand();
            }
            pending.insert(id, tx);
            id
        };

        let request = Request {
            id: request_id,
            sender: self.self_contact.clone(),
            payload,
        };
        debug!("{:?} - sending {:?} to {:?}", self.self_contact, request.payload, dest);

        if let Err(err) = self.protocol.send_message(&Message::Request(request), dest) {
            self.lock_pending().remove(&request_id);
            return Err(err);
        }

        match rx.recv_timeout(self.config.rpc_timeout) {
            Ok(response) => Ok(response),
            Err(_) => {
                self.lock_pending().remove(&request_id);
                warn!(
                    "{:?} - request to {:?} timed out after {:?}",
                    self.self_contact, dest, self.config.rpc_timeout
                );
                Err(KademliaError::transport(dest.addr(), "timed out waiting for response"))
            },
        }
    }

    /// Spawns the thread that drains decoded messages from the protocol
    /// listener and dispatches them to the request/response handlers.
    fn start_message_handler(&self, rx: Receiver<Message>) {
        let node = self.clone();
        thread::spawn(move || {
            for message in rx.iter() {
                match message {
                    Message::Request(request) => node.handle_request(request),
                    Message::Response(response) => node.handle_response(response),
                    Message::Kill => {
                        node.is_active.store(false, Ordering::Release);
                        info!("{:?} - message handler shut down", node.self_contact);
                        break;
                    },
                }
            }
        });
    }

    /// Dispatches an inbound request (§4.5's receiver-side-effect column),
    /// then replies on the same socket.
    fn handle_request(&self, request: Request) {
        info!(
            "{:?} - request from {:?}: {:?}",
            self.self_contact, request.sender, request.payload
        );
        self.spawn_update_routing_table(request.sender.clone());

        let payload = match &request.payload {
            RequestPayload::Ping => ResponsePayload::Pong,
            RequestPayload::Store(key, value) => {
                self.storage
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .put(*key, value.clone());
                ResponsePayload::Pong
            },
            RequestPayload::FindNode(target) => {
                ResponsePayload::Nodes(self.lock_routing_table().k_closest(target, K))
            },
            RequestPayload::FindValue(key) => {
                let found = self
                    .storage
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .get(key)
                    .cloned();
                match found {
                    Some(value) => ResponsePayload::Value(value),
                    None => ResponsePayload::Nodes(self.lock_routing_table().k_closest(key, K)),
                }
            },
        };

        let response = Response {
            receiver: self.self_contact.clone(),
            request: request.clone(),
            payload,
        };
        if let Err(err) = self.protocol.send_message(&Message::Response(response), &request.sender) {
            warn!("{:?} - could not answer {:?}: {}", self.self_contact, request.sender, err);
        }
    }

    /// Routes an inbound response to whichever `call` is waiting on it
    /// (§4.5: every response also triggers `update(remote_contact)`).
    fn handle_response(&self, response: Response) {
        self.spawn_update_routing_table(response.receiver.clone());

        let waiting = self.lock_pending().remove(&response.request.id);
        match waiting {
            Some(sender) => {
                info!(
                    "{:?} - response from {:?}: {:?}",
                    self.self_contact, response.receiver, response.payload
                );
                let _ = sender.send(response);
            },
            None => warn!(
                "{:?} - no pending request for response from {:?}; dropping",
                self.self_contact, response.receiver
            ),
        }
    }

    /// Runs the routing table's update protocol (§4.4) for `contact` on a
    /// background thread so the message-handler loop is never blocked on
    /// the eviction-challenge ping. The ping-then-decide step itself runs
    /// synchronously within that one thread, so the bucket's final state is
    /// deterministic with respect to the ping's outcome.
    fn spawn_update_routing_table(&self, contact: Contact) {
        let node = self.clone();
        thread::spawn(move || node.update_routing_table(contact));
    }

    /// Like [`Node::spawn_update_routing_table`], for every contact in a
    /// FIND_NODE/FIND_VALUE response body (§10.6: the Go original's
    /// `TestFindNode` expects the caller's routing table to contain every
    /// contact a response surfaced, not just the responder itself).
    fn spawn_update_routing_table_many(&self, contacts: &[Contact]) {
        for contact in contacts {
            self.spawn_update_routing_table(contact.clone());
        }
    }

    fn update_routing_table(&self, contact: Contact) {
        let outcome = self.lock_routing_table().update(contact);
        if let UpdateOutcome::Full { head, contact } = outcome {
            match self.do_ping(&head.host, head.port) {
                Ok(_) => self.lock_routing_table().touch(&head.id),
                Err(_) => self.lock_routing_table().evict_and_insert(&head.id, contact),
            }
        }
    }

    fn lock_routing_table(&self) -> std::sync::MutexGuard<'_, RoutingTable> {
        self.routing_table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<NodeId, Sender<Response>>> {
        self.pending_requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spin_node() -> Node {
        let mut config = NodeConfig::default();
        config.rpc_timeout = Duration::from_millis(200);
        Node::with_config("127.0.0.1:0", config).expect("bind should succeed")
    }

    #[test]
    fn find_contact_on_own_id_returns_self() {
        let node = spin_node();
        let id = node.id();
        let found = node.find_contact(&id).unwrap();
        assert_eq!(found.id, node.self_contact().id);
    }

    #[test]
    fn find_contact_on_unknown_id_is_not_found() {
        let node = spin_node();
        assert!(matches!(node.find_contact(&NodeId::rand()), Err(KademliaError::NotFound)));
    }

    #[test]
    fn ping_discovers_peer_in_both_directions() {
        let a = spin_node();
        let b = spin_node();
        assert!(a.find_contact(&b.id()).is_err());

        let b_contact = b.self_contact();
        let discovered = a.do_ping(&b_contact.host, b_contact.port).unwrap();
        assert_eq!(discovered.id, b.id());

        // routing-table updates run on a background thread (§4.4); give it
        // a beat to land before asserting.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(a.find_contact(&b.id()).unwrap().id, b.id());
        assert_eq!(b.find_contact(&a.id()).unwrap().id, a.id());
    }

    #[test]
    fn store_then_local_find_value_round_trips() {
        let a = spin_node();
        let b = spin_node();
        let b_contact = b.self_contact();
        a.do_ping(&b_contact.host, b_contact.port).unwrap();

        let key = NodeId::rand();
        a.do_store(&b_contact, key, b"Hello World".to_vec()).unwrap();
        assert_eq!(b.local_find_value(&key).unwrap(), b"Hello World".to_vec());
    }

    #[test]
    fn find_node_returns_contacts_known_to_the_responder() {
        let a = spin_node();
        let b = spin_node();
        let b_contact = b.self_contact();
        a.do_ping(&b_contact.host, b_contact.port).unwrap();
        thread::sleep(Duration::from_millis(50));

        let contacts = a.do_find_node(&b_contact, &NodeId::rand()).unwrap();
        assert!(contacts.iter().any(|c| c.id == a.id()));
    }

    #[test]
    fn iterative_find_node_fails_fast_with_no_peers() {
        let a = spin_node();
        assert!(matches!(a.do_iterative_find_node(&NodeId::rand()), Err(KademliaError::NoPeers)));
    }

    #[test]
    fn iterative_find_value_without_the_value_is_not_found() {
        let a = spin_node();
        let b = spin_node();
        let b_contact = b.self_contact();
        a.do_ping(&b_contact.host, b_contact.port).unwrap();
        thread::sleep(Duration::from_millis(50));

        assert!(matches!(a.do_iterative_find_value(&NodeId::rand()), Err(KademliaError::NotFound)));
    }
}
