//! The iterative lookup engine (§4.7): the shared skeleton behind
//! `DoIterativeFindNode`, `DoIterativeFindValue`, and `DoIterativeStore`.

use crate::contact::Contact;
use crate::id::NodeId;
use crate::K;

/// Per-shortlist-entry state machine (§4.7 "State machine per shortlist
/// entry"): `Unprobed -> Probing -> (Active | Failed)`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EntryState {
    Unprobed,
    Probing,
    Active,
    Failed,
}

/// A contact being tracked by an in-progress lookup, together with its
/// distance to the lookup target and its place in the state machine.
#[derive(Clone, Debug)]
pub struct ShortlistEntry {
    pub contact: Contact,
    pub distance: NodeId,
    pub state: EntryState,
    /// Set when this entry is known (from a `FIND_VALUE` round) not to hold
    /// the value being searched for. Used by `DoIterativeFindValue` to pick
    /// a caching target (§4.7).
    pub known_without_value: bool,
}

/// The working set of an in-progress iterative lookup: all contacts
/// discovered so far, sorted by ascending XOR distance to the target, plus
/// the tightest distance observed to date.
pub struct Shortlist {
    target: NodeId,
    self_id: NodeId,
    entries: Vec<ShortlistEntry>,
    closest_known: Option<NodeId>,
}

impl Shortlist {
    /// Seeds a shortlist from the initial `alpha`-closest contacts pulled
    /// from the local routing table (§4.7 step 1).
    pub fn new(target: NodeId, self_id: NodeId, seed: Vec<Contact>) -> Self {
        let mut shortlist = Shortlist {
            target,
            self_id,
            entries: Vec::new(),
            closest_known: None,
        };
        shortlist.merge(seed);
        shortlist
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn contains(&self, id: &NodeId) -> bool {
        self.entries.iter().any(|e| e.contact.id == *id)
    }

    /// Merges newly-discovered contacts into the shortlist, de-duplicating
    /// by id and excluding `self_id` (§4.7). Returns whether any merged
    /// contact tightened the closest-known distance.
    pub fn merge(&mut self, contacts: Vec<Contact>) -> bool {
        let mut tightened = false;
        for contact in contacts {
            if contact.id == self.self_id || self.contains(&contact.id) {
                continue;
            }
            let distance = contact.id.xor(&self.target);
            if self.closest_known.map_or(true, |known| distance < known) {
                self.closest_known = Some(distance);
                tightened = true;
            }
            self.entries.push(ShortlistEntry {
                contact,
                distance,
                state: EntryState::Unprobed,
                known_without_value: false,
            });
        }
        self.entries.sort_by_key(|e| e.distance);
        tightened
    }

    /// Selects up to `limit` `Unprobed` entries, in ascending distance
    /// order, and marks them `Probing`.
    pub fn next_batch(&mut self, limit: usize) -> Vec<Contact> {
        let mut batch = Vec::with_capacity(limit);
        for entry in self.entries.iter_mut() {
            if batch.len() >= limit {
                break;
            }
            if entry.state == EntryState::Unprobed {
                entry.state = EntryState::Probing;
                batch.push(entry.contact.clone());
            }
        }
        batch
    }

    /// Selects every `Unprobed` entry within the current k-closest (by
    /// distance, regardless of state), marking them `Probing` — the
    /// "sweeping round" of §4.7 step 3.
    pub fn sweep_batch(&mut self) -> Vec<Contact> {
        let mut batch = Vec::new();
        for entry in self.entries.iter_mut().take(K) {
            if entry.state == EntryState::Unprobed {
                entry.state = EntryState::Probing;
                batch.push(entry.contact.clone());
            }
        }
        batch
    }

    fn entry_mut(&mut self, id: &NodeId) -> Option<&mut ShortlistEntry> {
        self.entries.iter_mut().find(|e| e.contact.id == *id)
    }

    pub fn mark_active(&mut self, id: &NodeId) {
        if let Some(entry) = self.entry_mut(id) {
            entry.state = EntryState::Active;
        }
    }

    pub fn mark_active_without_value(&mut self, id: &NodeId) {
        if let Some(entry) = self.entry_mut(id) {
            entry.state = EntryState::Active;
            entry.known_without_value = true;
        }
    }

    pub fn mark_failed(&mut self, id: &NodeId) {
        if let Some(entry) = self.entry_mut(id) {
            entry.state = EntryState::Failed;
        }
    }

    /// The closest `Active` entry that is known not to hold the value,
    /// i.e. the caching target for `DoIterativeFindValue` (§4.7).
    pub fn closest_active_without_value(&self) -> Option<Contact> {
        self.entries
            .iter()
            .filter(|e| e.state == EntryState::Active && e.known_without_value)
            .min_by_key(|e| e.distance)
            .map(|e| e.contact.clone())
    }

    /// The final result of a lookup (§4.7 step 4): the `count` closest
    /// `Active` entries, sorted by ascending distance.
    pub fn k_closest_active(&self, count: usize) -> Vec<Contact> {
        self.entries
            .iter()
            .filter(|e| e.state == EntryState::Active)
            .take(count)
            .map(|e| e.contact.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(id: NodeId) -> Contact {
        Contact::new(id, "127.0.0.1".into(), 1)
    }

    #[test]
    fn merge_excludes_self_and_duplicates() {
        let self_id = NodeId::rand();
        let target = NodeId::rand();
        let mut shortlist = Shortlist::new(target, self_id, vec![]);
        let a = NodeId::rand();
        assert!(shortlist.merge(vec![contact(self_id), contact(a), contact(a)]));
        assert_eq!(shortlist.entries.len(), 1);
    }

    #[test]
    fn next_batch_respects_limit_and_marks_probing() {
        let self_id = NodeId::rand();
        let target = NodeId::rand();
        let seed: Vec<Contact> = (0..5).map(|_| contact(NodeId::rand())).collect();
        let mut shortlist = Shortlist::new(target, self_id, seed);
        let batch = shortlist.next_batch(3);
        assert_eq!(batch.len(), 3);
        assert_eq!(
            shortlist
                .entries
                .iter()
                .filter(|e| e.state == EntryState::Probing)
                .count(),
            3
        );
        // already-probing entries are not re-selected
        let second_batch = shortlist.next_batch(3);
        assert_eq!(second_batch.len(), 2);
    }

    #[test]
    fn k_closest_active_excludes_unprobed_and_failed() {
        let self_id = NodeId::rand();
        let target = NodeId::rand();
        let contacts: Vec<Contact> = (0..4).map(|_| contact(NodeId::rand())).collect();
        let mut shortlist = Shortlist::new(target, self_id, contacts.clone());
        shortlist.mark_active(&contacts[0].id);
        shortlist.mark_failed(&contacts[1].id);
        shortlist.mark_active(&contacts[2].id);
        // contacts[3] remains Unprobed
        let active = shortlist.k_closest_active(10);
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|c| c.id == contacts[0].id || c.id == contacts[2].id));
    }

    #[test]
    fn closest_active_without_value_picks_nearest() {
        let self_id = NodeId::rand();
        let target = NodeId::rand();
        let contacts: Vec<Contact> = (0..3).map(|_| contact(NodeId::rand())).collect();
        let mut shortlist = Shortlist::new(target, self_id, contacts.clone());
        shortlist.mark_active_without_value(&contacts[0].id);
        shortlist.mark_active_without_value(&contacts[1].id);
        shortlist.mark_active(&contacts[2].id);
        let candidate = shortlist.closest_active_without_value().unwrap();
        assert!(candidate.id == contacts[0].id || candidate.id == contacts[1].id);
    }
}
