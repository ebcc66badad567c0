use std::fmt::{Debug, Formatter, Result as FmtResult};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::KEY_LENGTH;

/// A 160-bit node/key identifier, big-endian.
///
/// `NodeId` is used both for peer identity and for DHT keys: Kademlia shares a
/// single 160-bit space between the two, so a value looked up with
/// `DoFindValue` is itself a `NodeId`.
#[derive(Ord, PartialOrd, PartialEq, Eq, Clone, Hash, Serialize, Deserialize, Default, Copy)]
pub struct NodeId(pub [u8; KEY_LENGTH]);

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.as_hex())
    }
}

impl NodeId {
    /// Wraps a raw 20-byte array.
    pub fn new(data: [u8; KEY_LENGTH]) -> Self {
        NodeId(data)
    }

    /// Generates a uniformly random id.
    pub fn rand() -> Self {
        let mut ret = NodeId([0; KEY_LENGTH]);
        rand::thread_rng().fill(&mut ret.0);
        ret
    }

    /// Generates a random id whose most significant differing bit from an
    /// all-zero id is at `index`, i.e. a key that falls in bucket `index`
    /// of a routing table whose owner id is all zeroes. Useful for
    /// constructing keys that target a specific, known bucket in tests.
    pub fn rand_in_range(index: usize) -> Self {
        let mut ret = NodeId::rand();
        let byte = index / 8;
        let bit = index % 8;
        for b in ret.0.iter_mut().take(byte) {
            *b = 0;
        }
        ret.0[byte] &= 0xFF >> bit;
        ret.0[byte] |= 1 << (7 - bit);
        ret
    }

    /// XOR distance between `self` and `other`.
    pub fn xor(&self, other: &NodeId) -> NodeId {
        let mut ret = [0; KEY_LENGTH];
        for (i, byte) in ret.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        NodeId(ret)
    }

    /// Number of leading zero bits, i.e. how many most-significant bits
    /// `self` and the all-zero id share. When called on `a.xor(b)`, this is
    /// the `prefix_len(a, b)` of the spec.
    pub fn leading_zeros(&self) -> usize {
        let mut ret = 0;
        for byte in &self.0 {
            if *byte == 0 {
                ret += 8;
            } else {
                return ret + byte.leading_zeros() as usize;
            }
        }
        ret
    }

    /// `prefix_len(self, other)`: the number of leading bits `self` and
    /// `other` share.
    pub fn prefix_len(&self, other: &NodeId) -> usize {
        self.xor(other).leading_zeros()
    }

    /// Index, in `[0, 160)`, of the bucket that `other` belongs in within a
    /// routing table owned by `self`. Returns `None` if `other == self`
    /// (self is never inserted into its own routing table).
    pub fn bucket_index(&self, other: &NodeId) -> Option<usize> {
        if self == other {
            return None;
        }
        Some(crate::ROUTING_TABLE_SIZE - 1 - self.prefix_len(other))
    }

    /// Lowercase hex representation, big-endian.
    pub fn as_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    extern crate num_bigint;
    use self::num_bigint::BigUint;

    use super::NodeId;
    use crate::{KEY_LENGTH, ROUTING_TABLE_SIZE};

    #[test]
    fn rand_in_range_falls_in_expected_half_open_interval() {
        for i in 0..KEY_LENGTH * 8 {
            let key = BigUint::from_bytes_be(&NodeId::rand_in_range(i).0);
            let mut lower = [0u8; KEY_LENGTH];
            lower[i / 8] = 1 << ((KEY_LENGTH * 8 - i - 1) % 8);
            let lower = BigUint::from_bytes_be(&lower);
            assert!(lower <= key);
            assert!(key < lower << 1);
        }
    }

    #[test]
    fn leading_zeros_matches_rand_in_range_index() {
        for i in 0..KEY_LENGTH * 8 {
            assert_eq!(NodeId::rand_in_range(i).leading_zeros(), i);
        }
    }

    #[test]
    fn xor_is_involution() {
        let a = NodeId::rand();
        let b = NodeId::rand();
        assert_eq!(a.xor(&a), NodeId::default());
        assert_eq!(a.xor(&b.xor(&a)), b);
    }

    #[test]
    fn bucket_index_is_none_for_self() {
        let a = NodeId::rand();
        assert_eq!(a.bucket_index(&a), None);
    }

    #[test]
    fn bucket_index_spans_full_table() {
        let self_id = NodeId::default();
        for i in 0..ROUTING_TABLE_SIZE {
            // rand_in_range(i) has exactly `i` leading zero bits, so its
            // prefix length with the all-zero self id is `i`, placing it in
            // bucket `ROUTING_TABLE_SIZE - 1 - i`.
            let other = NodeId::rand_in_range(i);
            assert_eq!(self_id.bucket_index(&other), Some(ROUTING_TABLE_SIZE - 1 - i));
        }
    }
}
