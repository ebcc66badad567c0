//! A Kademlia distributed hash table node.
//!
//! A [`Node`] owns a 160-bit [`id::NodeId`], a 160-bucket [`routing::RoutingTable`]
//! indexed by XOR distance, an in-memory [`storage::ValueStore`], and a UDP
//! [`protocol::Protocol`] endpoint. Peers exchange four RPCs (PING, STORE,
//! FIND_NODE, FIND_VALUE); the [`lookup`] module drives the three iterative
//! procedures (`iterativeFindNode`, `iterativeStore`, `iterativeFindValue`)
//! built on top of them.

#[macro_use]
extern crate log;

pub mod config;
pub mod contact;
pub mod error;
pub mod id;
pub mod lookup;
pub mod node;
pub mod protocol;
pub mod routing;
pub mod storage;

pub use crate::config::NodeConfig;
pub use crate::contact::Contact;
pub use crate::error::KademliaError;
pub use crate::id::NodeId;
pub use crate::node::{FindValueResult, Node};

/// Length, in bytes, of a [`NodeId`] (160 bits).
pub const KEY_LENGTH: usize = 20;

/// Maximum size, in bytes, of a single wire message.
pub const MESSAGE_LENGTH: usize = 8192;

/// Number of buckets in a [`routing::RoutingTable`]: one per bit of the key space.
pub const ROUTING_TABLE_SIZE: usize = KEY_LENGTH * 8;

/// Bucket capacity / replication parameter `k`.
pub const K: usize = 20;

/// Lookup concurrency parameter `alpha`.
pub const ALPHA: usize = 3;

/// Default per-RPC timeout, in milliseconds.
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 300;
