use crate::contact::Contact;
use crate::id::NodeId;
use crate::{K, ROUTING_TABLE_SIZE};

/// A single k-bucket: at most `k` contacts, ordered least-recently-seen
/// (head, index 0) to most-recently-seen (tail).
#[derive(Clone, Debug, Default)]
struct RoutingBucket {
    contacts: Vec<Contact>,
}

impl RoutingBucket {
    fn new() -> Self {
        RoutingBucket {
            contacts: Vec::new(),
        }
    }

    fn position(&self, id: &NodeId) -> Option<usize> {
        self.contacts.iter().position(|c| c.id == *id)
    }

    fn is_full(&self) -> bool {
        self.contacts.len() >= K
    }

    fn touch(&mut self, contact: Contact) {
        if let Some(index) = self.position(&contact.id) {
            self.contacts.remove(index);
        }
        self.contacts.push(contact);
    }

    fn remove(&mut self, id: &NodeId) -> Option<Contact> {
        self.position(id).map(|index| self.contacts.remove(index))
    }

    fn head(&self) -> Option<&Contact> {
        self.contacts.first()
    }

    fn as_slice(&self) -> &[Contact] {
        &self.contacts
    }
}

/// Outcome of [`RoutingTable::update`], used by callers to decide whether a
/// liveness probe of the bucket's head is required (§4.4 step 4).
#[derive(Debug)]
pub enum UpdateOutcome {
    /// `contact.id` was `self`; no-op (§4.4 step 1).
    Ignored,
    /// `contact` was already present and has been moved to the tail (§4.4
    /// step 2), or the bucket had room and `contact` was appended (§4.4 step
    /// 3).
    Updated,
    /// The bucket for `contact` is full of other, distinct peers. The
    /// caller must ping `head` and then call either
    /// [`RoutingTable::touch`] (head is alive) or
    /// [`RoutingTable::evict_and_insert`] (head is dead) to complete the
    /// update (§4.4 step 4).
    Full { head: Contact, contact: Contact },
}

/// A node's routing table: exactly [`ROUTING_TABLE_SIZE`] k-buckets indexed
/// by the common-prefix length between the table's owner and a peer (§3,
/// §4.1).
///
/// Unlike the lazily-splitting single-bucket-list design of the original
/// Kademlia paper's §4.2 optimization, every bucket exists from
/// construction; `bucket_index` addresses it directly. See `REDESIGN FLAGS`.
#[derive(Clone, Debug)]
pub struct RoutingTable {
    self_id: NodeId,
    buckets: Vec<RoutingBucket>,
}

impl RoutingTable {
    /// Constructs an empty routing table owned by `self_id`.
    pub fn new(self_id: NodeId) -> Self {
        RoutingTable {
            self_id,
            buckets: (0..ROUTING_TABLE_SIZE).map(|_| RoutingBucket::new()).collect(),
        }
    }

    fn bucket_index(&self, id: &NodeId) -> Option<usize> {
        self.self_id.bucket_index(id)
    }

    /// Upserts `contact` following §4.4 steps 1–3. Step 4 (ping-challenge
    /// eviction) is left to the caller via the returned [`UpdateOutcome`],
    /// since it requires an RPC round-trip the table itself does not own.
    pub fn update(&mut self, contact: Contact) -> UpdateOutcome {
        let index = match self.bucket_index(&contact.id) {
            None => return UpdateOutcome::Ignored,
            Some(index) => index,
        };

        let bucket = &mut self.buckets[index];
        if bucket.position(&contact.id).is_some() || !bucket.is_full() {
            bucket.touch(contact);
            return UpdateOutcome::Updated;
        }

        UpdateOutcome::Full {
            head: bucket.head().expect("full bucket has a head").clone(),
            contact,
        }
    }

    /// Completes a [`UpdateOutcome::Full`] whose head responded: discard the
    /// new contact, move the head to the tail.
    pub fn touch(&mut self, id: &NodeId) {
        if let Some(index) = self.bucket_index(id) {
            let bucket = &mut self.buckets[index];
            if let Some(contact) = bucket.remove(id) {
                bucket.touch(contact);
            }
        }
    }

    /// Completes a [`UpdateOutcome::Full`] whose head failed to respond:
    /// remove the head, append `contact` to the tail.
    pub fn evict_and_insert(&mut self, stale_id: &NodeId, contact: Contact) {
        if let Some(index) = self.bucket_index(&contact.id) {
            let bucket = &mut self.buckets[index];
            bucket.remove(stale_id);
            bucket.touch(contact);
        }
    }

    /// Removes `id` from the table outright, if present.
    pub fn remove(&mut self, id: &NodeId) -> Option<Contact> {
        self.bucket_index(id)
            .and_then(|index| self.buckets[index].remove(id))
    }

    /// Returns the table's current contact for `id`.
    pub fn find(&self, id: &NodeId) -> Option<Contact> {
        let index = self.bucket_index(id)?;
        self.buckets[index]
            .as_slice()
            .iter()
            .find(|c| c.id == *id)
            .cloned()
    }

    /// Returns up to `count` contacts ordered by ascending XOR distance to
    /// `target` (§4.4). Correctness requires only the final sort-and-truncate;
    /// the bucket-expansion order below is a traversal optimization, not a
    /// semantic requirement.
    pub fn k_closest(&self, target: &NodeId, count: usize) -> Vec<Contact> {
        let mut ret = Vec::new();

        let start = self.bucket_index(target).unwrap_or(0);
        ret.extend_from_slice(self.buckets[start].as_slice());

        // buckets[..start] hold the closer band (distance [2^p, 2^(p+1))
        // relative to the start bucket); gather it fully before the far
        // band, which only needs to run until `count` is satisfied.
        if ret.len() < count {
            for bucket in self.buckets[..start].iter().rev() {
                ret.extend_from_slice(bucket.as_slice());
            }
        }
        if ret.len() < count {
            for bucket in &self.buckets[start + 1..] {
                ret.extend_from_slice(bucket.as_slice());
                if ret.len() >= count {
                    break;
                }
            }
        }

        ret.sort_by_key(|contact| contact.id.xor(target));
        ret.truncate(count);
        ret
    }

    /// Total number of contacts across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.contacts.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::K;

    fn contact_in_bucket(self_id: NodeId, bucket: usize, port: u16) -> Contact {
        let id = self_id.xor(&NodeId::rand_in_range(ROUTING_TABLE_SIZE - 1 - bucket));
        Contact::new(id, "127.0.0.1".into(), port)
    }

    #[test]
    fn self_is_never_inserted() {
        let id = NodeId::rand();
        let mut table = RoutingTable::new(id);
        let outcome = table.update(Contact::new(id, "127.0.0.1".into(), 1));
        assert!(matches!(outcome, UpdateOutcome::Ignored));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn bucket_never_exceeds_k() {
        let self_id = NodeId::rand();
        let mut table = RoutingTable::new(self_id);
        for i in 0..(K + 5) {
            let contact = contact_in_bucket(self_id, 3, i as u16);
            let _ = table.update(contact);
        }
        assert!(table.len() <= K);
    }

    #[test]
    fn touch_moves_existing_contact_to_tail_without_duplicating() {
        let self_id = NodeId::rand();
        let mut table = RoutingTable::new(self_id);
        let contact = contact_in_bucket(self_id, 10, 1);
        table.update(contact.clone());
        table.update(Contact::new(contact.id, "10.0.0.9".into(), 9999));
        assert_eq!(table.len(), 1);
        let found = table.find(&contact.id).unwrap();
        assert_eq!(found.host, "10.0.0.9");
    }

    #[test]
    fn full_bucket_reports_head_for_eviction_challenge() {
        let self_id = NodeId::rand();
        let mut table = RoutingTable::new(self_id);
        let mut first_contact = None;
        for i in 0..K {
            let contact = contact_in_bucket(self_id, 3, i as u16);
            if i == 0 {
                first_contact = Some(contact.clone());
            }
            table.update(contact);
        }
        let extra = contact_in_bucket(self_id, 3, 9999);
        match table.update(extra.clone()) {
            UpdateOutcome::Full { head, contact } => {
                assert_eq!(head.id, first_contact.unwrap().id);
                assert_eq!(contact.id, extra.id);
            },
            other => panic!("expected Full, got {:?}", other),
        }
    }

    #[test]
    fn k_closest_is_sorted_by_xor_distance() {
        let self_id = NodeId::rand();
        let mut table = RoutingTable::new(self_id);
        for i in 0..40 {
            let contact = contact_in_bucket(self_id, i % ROUTING_TABLE_SIZE, i as u16);
            table.update(contact);
        }
        let target = NodeId::rand();
        let closest = table.k_closest(&target, K);
        assert!(closest.len() <= K);
        for pair in closest.windows(2) {
            assert!(pair[0].id.xor(&target) <= pair[1].id.xor(&target));
        }
    }
}
