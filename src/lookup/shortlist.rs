use crate::contact::{Contact, RankInfo};
use crate::id::Id;

/// Per-contact lookup state (spec.md §3). Once `Responded` or `Down`, a
/// contact's state never changes again -- the engine enforces this by
/// only ever calling `mark_responded`/`mark_down` once per entry.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ContactState {
    New,
    Pending,
    Responded,
    Down,
}

struct ShortlistEntry {
    contact: Contact,
    state: ContactState,
    last_probed_round: Option<u32>,
    rank_info: Option<RankInfo>,
}

/// The shortlist for a single in-flight lookup (C4 in spec.md §2).
///
/// Entries are kept sorted ascending by `(distance to target, id)` at all
/// times, matching spec.md §4.1's ordering rule and the teacher's
/// `NodeDataDistancePair`-style comparator, generalized here from a
/// max-heap-of-closest into a flat sorted `Vec` since the engine needs
/// random access by id as well as a stable "first k" prefix.
pub struct Shortlist {
    target: Id,
    entries: Vec<ShortlistEntry>,
}

impl Shortlist {
    pub fn new(target: Id) -> Self {
        Shortlist {
            target,
            entries: Vec::new(),
        }
    }

    fn sort_key(&self, contact: &Contact) -> (Id, Id) {
        (contact.id.xor(&self.target), contact.id)
    }

    /// Inserts `contact` if its id is not already present. Idempotent on id,
    /// preserves sorted order. Returns `true` if a new entry was added.
    pub fn insert(&mut self, contact: Contact) -> bool {
        if self.entries.iter().any(|e| e.contact.id == contact.id) {
            return false;
        }
        let key = self.sort_key(&contact);
        let pos = self
            .entries
            .binary_search_by_key(&key, |e| self.sort_key(&e.contact))
            .unwrap_or_else(|p| p);
        self.entries.insert(
            pos,
            ShortlistEntry {
                contact,
                state: ContactState::New,
                last_probed_round: None,
                rank_info: None,
            },
        );
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` closest entries currently known, by ascending distance.
    pub fn first_k(&self, k: usize) -> Vec<&Contact> {
        self.entries.iter().take(k).map(|e| &e.contact).collect()
    }

    /// Up to `alpha` entries in `New` state, closest first.
    pub fn first_alpha_eligible(&self, alpha: usize) -> Vec<Id> {
        self.entries
            .iter()
            .filter(|e| e.state == ContactState::New)
            .take(alpha)
            .map(|e| e.contact.id)
            .collect()
    }

    fn find_mut(&mut self, id: &Id) -> Option<&mut ShortlistEntry> {
        self.entries.iter_mut().find(|e| &e.contact.id == id)
    }

    /// The contact record for `id`, if present, regardless of state.
    pub fn contact(&self, id: &Id) -> Option<&Contact> {
        self.entries.iter().find(|e| &e.contact.id == id).map(|e| &e.contact)
    }

    pub fn mark_pending(&mut self, id: &Id, round: u32) {
        if let Some(e) = self.find_mut(id) {
            if e.state == ContactState::New {
                e.state = ContactState::Pending;
                e.last_probed_round = Some(round);
            }
        }
    }

    /// Marks `id` responded and returns `true` if this was a genuine
    /// terminal-state transition (i.e. the entry was not already
    /// `Responded`/`Down`) -- spec.md §4.2's invariant that terminal state
    /// never changes.
    pub fn mark_responded(&mut self, id: &Id, rank_info: Option<RankInfo>) -> bool {
        if let Some(e) = self.find_mut(id) {
            if e.state != ContactState::Responded && e.state != ContactState::Down {
                e.state = ContactState::Responded;
                e.rank_info = rank_info;
                return true;
            }
        }
        false
    }

    pub fn mark_down(&mut self, id: &Id) -> bool {
        if let Some(e) = self.find_mut(id) {
            if e.state != ContactState::Responded && e.state != ContactState::Down {
                e.state = ContactState::Down;
                return true;
            }
        }
        false
    }

    pub fn state_of(&self, id: &Id) -> Option<ContactState> {
        self.entries.iter().find(|e| &e.contact.id == id).map(|e| e.state)
    }

    pub fn count_pending(&self) -> usize {
        self.entries.iter().filter(|e| e.state == ContactState::Pending).count()
    }

    /// True iff every entry among the first `k` is in a terminal state
    /// (`Responded` or `Down`) and none of them is still `Pending` --
    /// spec.md §4.2 item 5's convergence test.
    pub fn all_first_k_terminal(&self, k: usize) -> bool {
        self.entries
            .iter()
            .take(k)
            .all(|e| e.state == ContactState::Responded || e.state == ContactState::Down)
    }

    /// True iff no `New` candidates remain and nothing is `Pending` --
    /// spec.md §4.2 item 7's exhaustion condition.
    pub fn exhausted(&self) -> bool {
        !self
            .entries
            .iter()
            .any(|e| e.state == ContactState::New || e.state == ContactState::Pending)
    }

    /// Up to `k` closest `New` entries among the first `k`, used by the
    /// "finishing mode" of spec.md §4.2 item 6.
    pub fn new_entries_in_first_k(&self, k: usize) -> Vec<Id> {
        self.entries
            .iter()
            .take(k)
            .filter(|e| e.state == ContactState::New)
            .map(|e| e.contact.id)
            .collect()
    }

    /// The smallest distance-to-target among all `Responded` entries, or
    /// `None` if nothing has responded yet.
    pub fn closest_responded_distance(&self) -> Option<Id> {
        self.entries
            .iter()
            .filter(|e| e.state == ContactState::Responded)
            .map(|e| e.contact.id.xor(&self.target))
            .min()
    }

    /// The `Responded` subset of the first `k` entries, ordered by
    /// distance -- exactly the set the callback fires with on success.
    pub fn responded_first_k(&self, k: usize) -> Vec<Contact> {
        self.entries
            .iter()
            .take(k)
            .filter(|e| e.state == ContactState::Responded)
            .map(|e| e.contact.clone())
            .collect()
    }
}
