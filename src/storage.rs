use std::collections::HashMap;

use crate::id::NodeId;

/// The node's local key→value store.
///
/// Keys and values share the DHT's 160-bit id space and an opaque byte
/// sequence respectively (§3, §4.3). Writes are idempotent overwrites; this
/// core has no deletion, expiry, or republishing (Non-goals, §1).
#[derive(Default)]
pub struct ValueStore {
    items: HashMap<NodeId, Vec<u8>>,
}

impl ValueStore {
    /// Constructs a new, empty `ValueStore`.
    pub fn new() -> Self {
        ValueStore {
            items: HashMap::new(),
        }
    }

    /// Overwrites (or inserts) the value for `key`. Values are stored by
    /// copy: the caller's buffer may be reused or dropped after this call.
    pub fn put(&mut self, key: NodeId, value: Vec<u8>) {
        self.items.insert(key, value);
    }

    /// Returns the value associated with `key`, or `None` if absent.
    pub fn get(&self, key: &NodeId) -> Option<&Vec<u8>> {
        self.items.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let mut store = ValueStore::new();
        let key = NodeId::rand();
        store.put(key, b"Hello World".to_vec());
        assert_eq!(store.get(&key), Some(&b"Hello World".to_vec()));
    }

    #[test]
    fn put_overwrites_existing_value() {
        let mut store = ValueStore::new();
        let key = NodeId::rand();
        store.put(key, b"first".to_vec());
        store.put(key, b"second".to_vec());
        assert_eq!(store.get(&key), Some(&b"second".to_vec()));
    }

    #[test]
    fn get_on_missing_key_is_none() {
        let store = ValueStore::new();
        assert_eq!(store.get(&NodeId::rand()), None);
    }
}
