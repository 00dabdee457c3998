use std::cmp;
use std::fmt;

use time::{Duration, SteadyTime};

use crate::contact::{Contact, RankInfo};
use crate::id::Id;
use crate::{BUCKET_REFRESH_INTERVAL, ID_LENGTH, REPLICATION_PARAM, ROUTING_TABLE_SIZE};

/// The routing table (C2 in spec.md §2) is an external collaborator: the
/// lookup engine only ever calls through this trait. `InMemoryRoutingTable`
/// below is this crate's own k-bucket bookkeeping, carried over from the
/// teacher's `RoutingTable`/`RoutingBucket` and generalized from its
/// single-global-table shape to the narrow read/write surface the engine
/// actually needs.
pub trait RoutingTable {
    /// Closest `k` contacts to `target`, excluding any id in `exclude`.
    fn get_close_contacts(&self, target: &Id, k: usize, exclude: &[Id]) -> Vec<Contact>;
    fn add_contact(&mut self, contact: Contact, rank_info: RankInfo);
    fn set_validated(&mut self, id: &Id, valid: bool);
    fn get_contact(&self, id: &Id) -> Option<Contact>;
}

#[derive(Debug)]
pub enum RoutingError {
    /// Bucket is full and the candidate lost the least-recently-seen ping
    /// contest; the caller (a maintenance lane, not the lookup engine) may
    /// retry after pinging the evicted contact.
    BucketFull,
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RoutingError::BucketFull => write!(f, "routing bucket is full"),
        }
    }
}

impl std::error::Error for RoutingError {}

#[derive(Clone, Debug)]
struct RoutingEntry {
    contact: Contact,
    #[allow(dead_code)]
    rank_info: RankInfo,
    validated: bool,
}

/// A k-bucket in a node's routing table, capacity `REPLICATION_PARAM`.
///
/// Entries are ordered by recency of communication, most-recent at the end,
/// exactly as in the teacher's `RoutingBucket`.
#[derive(Clone, Debug)]
struct RoutingBucket {
    entries: Vec<RoutingEntry>,
    last_update_time: SteadyTime,
}

impl RoutingBucket {
    fn new() -> Self {
        RoutingBucket {
            entries: Vec::new(),
            last_update_time: SteadyTime::now(),
        }
    }

    fn upsert(&mut self, contact: Contact, rank_info: RankInfo) -> Result<(), RoutingError> {
        self.last_update_time = SteadyTime::now();
        if let Some(index) = self.entries.iter().position(|e| e.contact == contact) {
            self.entries.remove(index);
            self.entries.push(RoutingEntry {
                contact,
                rank_info,
                validated: true,
            });
            return Ok(());
        }

        if self.entries.len() >= REPLICATION_PARAM {
            return Err(RoutingError::BucketFull);
        }

        self.entries.push(RoutingEntry {
            contact,
            rank_info,
            validated: true,
        });
        Ok(())
    }

    fn contains(&self, id: &Id) -> bool {
        self.entries.iter().any(|e| &e.contact.id == id)
    }

    fn split(&mut self, key: &Id, index: usize) -> RoutingBucket {
        let (old, new): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|e| e.contact.id.xor(key).leading_zeros() == index);
        self.entries = old;
        RoutingBucket {
            entries: new,
            last_update_time: self.last_update_time,
        }
    }

    fn contacts(&self) -> Vec<Contact> {
        self.entries.iter().map(|e| e.contact.clone()).collect()
    }

    fn is_stale(&self) -> bool {
        SteadyTime::now() - self.last_update_time > Duration::seconds(BUCKET_REFRESH_INTERVAL as i64)
    }

    fn size(&self) -> usize {
        self.entries.len()
    }
}

/// Default, in-process `RoutingTable` implementation: a growable vector of
/// k-buckets, split lazily as in the teacher's implementation. Readers get
/// a consistent snapshot because every read walks the live `Vec` under the
/// caller's own synchronization (spec.md §5 leaves locking to the owner of
/// the table, typically an `Arc<Mutex<InMemoryRoutingTable>>`).
#[derive(Clone, Debug)]
pub struct InMemoryRoutingTable {
    buckets: Vec<RoutingBucket>,
    self_id: Id,
}

impl InMemoryRoutingTable {
    pub fn new(self_id: Id) -> Self {
        InMemoryRoutingTable {
            buckets: vec![RoutingBucket::new()],
            self_id,
        }
    }

    fn bucket_index(&self, id: &Id) -> usize {
        cmp::min(self.self_id.xor(id).leading_zeros(), self.buckets.len() - 1)
    }

    /// Upserts a contact, splitting the last bucket as needed. Returns
    /// `Err(BucketFull)` if the target bucket cannot accept the contact and
    /// cannot be split further (mirrors the teacher's `update_node` boolean
    /// return, but surfaced as a typed error per SPEC_FULL.md §7).
    pub fn update_node(&mut self, contact: Contact, rank_info: RankInfo) -> Result<(), RoutingError> {
        let distance = self.self_id.xor(&contact.id).leading_zeros();
        let mut target = cmp::min(distance, self.buckets.len() - 1);

        if self.buckets[target].contains(&contact.id) {
            return self.buckets[target].upsert(contact, rank_info);
        }

        loop {
            if self.buckets[target].size() < REPLICATION_PARAM {
                return self.buckets[target].upsert(contact, rank_info);
            }

            let is_last = target == self.buckets.len() - 1;
            let table_full = self.buckets.len() == ROUTING_TABLE_SIZE;

            if !is_last || table_full {
                return Err(RoutingError::BucketFull);
            }

            let new_bucket = self.buckets[target].split(&self.self_id, target);
            self.buckets.push(new_bucket);
            target = cmp::min(distance, self.buckets.len() - 1);
        }
    }

    pub fn remove_contact(&mut self, id: &Id) {
        let index = self.bucket_index(id);
        if let Some(pos) = self.buckets[index].entries.iter().position(|e| &e.contact.id == id) {
            self.buckets[index].entries.remove(pos);
        }
    }

    pub fn stale_bucket_indexes(&self) -> Vec<usize> {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_stale())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl RoutingTable for InMemoryRoutingTable {
    fn get_close_contacts(&self, target: &Id, k: usize, exclude: &[Id]) -> Vec<Contact> {
        let index = self.bucket_index(target);
        let mut ret = Vec::new();

        ret.extend(self.buckets[index].contacts());

        if ret.len() < k {
            for bucket in &self.buckets[index + 1..] {
                ret.extend(bucket.contacts());
            }
        }

        if ret.len() < k {
            for bucket in self.buckets[..index].iter().rev() {
                ret.extend(bucket.contacts());
                if ret.len() >= k {
                    break;
                }
            }
        }

        ret.retain(|c| !exclude.contains(&c.id));
        ret.sort_by_key(|c| c.id.xor(target));
        ret.truncate(k);
        ret
    }

    fn add_contact(&mut self, contact: Contact, rank_info: RankInfo) {
        let _ = self.update_node(contact, rank_info);
    }

    fn set_validated(&mut self, id: &Id, valid: bool) {
        let index = self.bucket_index(id);
        if let Some(entry) = self.buckets[index]
            .entries
            .iter_mut()
            .find(|e| &e.contact.id == id)
        {
            entry.validated = valid;
        }
    }

    fn get_contact(&self, id: &Id) -> Option<Contact> {
        let index = self.bucket_index(id);
        self.buckets[index]
            .entries
            .iter()
            .find(|e| &e.contact.id == id)
            .map(|e| e.contact.clone())
    }
}
