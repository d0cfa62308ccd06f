//! Session-wide store of pairwise degree-of-interaction lower bounds.

use super::index_set::{IndexId, IndexSet};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unordered pair of distinct index ids, stored with `lo < hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexPair {
    lo: IndexId,
    hi: IndexId,
}

impl IndexPair {
    /// Returns `None` for the diagonal `a == b`.
    pub fn new(a: IndexId, b: IndexId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { lo: a, hi: b }),
            std::cmp::Ordering::Greater => Some(Self { lo: b, hi: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn lo(&self) -> IndexId {
        self.lo
    }

    pub fn hi(&self) -> IndexId {
        self.hi
    }
}

/// Symmetric map of interaction levels shared by every statement of a
/// session. Entries only ever grow; [`InteractionBank::reset`] starts a new run.
#[derive(Debug)]
pub struct InteractionBank {
    universe: IndexSet,
    levels: DashMap<IndexPair, f64>,
}

impl InteractionBank {
    pub fn new(universe: IndexSet) -> Self {
        Self {
            universe,
            levels: DashMap::new(),
        }
    }

    pub fn universe(&self) -> &IndexSet {
        &self.universe
    }

    pub fn interaction_level(&self, a: IndexId, b: IndexId) -> f64 {
        IndexPair::new(a, b)
            .and_then(|pair| self.levels.get(&pair).map(|level| *level))
            .unwrap_or(0.0)
    }

    /// Max-merges `doi` into the entry for `{a, b}`. Returns whether the
    /// stored level increased.
    pub fn record(&self, a: IndexId, b: IndexId, doi: f64) -> bool {
        let Some(pair) = IndexPair::new(a, b) else {
            return false;
        };
        if !doi.is_finite() || doi <= 0.0 {
            return false;
        }
        let mut raised = false;
        self.levels
            .entry(pair)
            .and_modify(|level| {
                if doi > *level {
                    *level = doi;
                    raised = true;
                }
            })
            .or_insert_with(|| {
                raised = true;
                doi
            });
        raised
    }

    /// Max-merges every entry of `other` into this bank.
    pub fn merge_from(&self, other: &InteractionBank) {
        if std::ptr::eq(self, other) {
            return;
        }
        for entry in other.levels.iter() {
            let pair = entry.key();
            self.record(pair.lo, pair.hi, *entry.value());
        }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn reset(&self) {
        self.levels.clear();
    }

    /// All non-zero entries, ordered by pair.
    pub fn pairs(&self) -> Vec<(IndexPair, f64)> {
        let ordered: BTreeMap<IndexPair, f64> = self
            .levels
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        ordered.into_iter().collect()
    }

    /// Groups the universe (plus any id with a recorded level) into
    /// disjoint sets, joining ids whose interaction level reaches
    /// `threshold`. Unrecorded pairs count as level 0, so a threshold of 0 or
    /// less yields a single group. Groups are ordered by their smallest id.
    pub fn stable_partition(&self, threshold: f64) -> Vec<IndexSet> {
        let pairs = self.pairs();
        let mut ids: Vec<IndexId> = self.universe.iter().collect();
        ids.extend(pairs.iter().flat_map(|(p, _)| [p.lo, p.hi]));
        ids.sort_unstable();
        ids.dedup();

        let slot: BTreeMap<IndexId, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let mut sets = DisjointSets::new(ids.len());
        if threshold <= 0.0 {
            // Absent pairs read as 0, so every pair qualifies.
            for i in 1..ids.len() {
                sets.union(0, i);
            }
        } else {
            for (pair, level) in &pairs {
                if *level >= threshold {
                    sets.union(slot[&pair.lo], slot[&pair.hi]);
                }
            }
        }

        let mut groups: BTreeMap<usize, IndexSet> = BTreeMap::new();
        for (i, &id) in ids.iter().enumerate() {
            groups.entry(sets.find(i)).or_default().set(id);
        }
        let mut out: Vec<IndexSet> = groups.into_values().collect();
        out.sort_by_key(|group| group.iter().next());
        out
    }
}

struct DisjointSets {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}
