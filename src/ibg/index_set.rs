//! Bit-indexed sets of candidate-index ids.
//!
//! An [`IndexSet`] is the configuration type used throughout the graph. The
//! backing words are kept normalized (no trailing zero words) so that the
//! derived `Eq`/`Hash` are structural: two sets are equal exactly when the
//! same bits are set, regardless of how they were built.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Identifier of a candidate index.
pub type IndexId = u32;

const WORD_BITS: u32 = 64;

#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<IndexId>", from = "Vec<IndexId>")]
pub struct IndexSet {
    words: SmallVec<[u64; 2]>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I: IntoIterator<Item = IndexId>>(ids: I) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.set(id);
        }
        set
    }

    #[inline]
    fn locate(id: IndexId) -> (usize, u64) {
        ((id / WORD_BITS) as usize, 1u64 << (id % WORD_BITS))
    }

    fn normalize(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }

    #[inline]
    pub fn contains(&self, id: IndexId) -> bool {
        let (word, mask) = Self::locate(id);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    pub fn set(&mut self, id: IndexId) {
        let (word, mask) = Self::locate(id);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= mask;
    }

    pub fn clear(&mut self, id: IndexId) {
        let (word, mask) = Self::locate(id);
        if let Some(w) = self.words.get_mut(word) {
            *w &= !mask;
            self.normalize();
        }
    }

    /// Removes every id.
    pub fn clear_all(&mut self) {
        self.words.clear();
    }

    pub fn union_with(&mut self, other: &IndexSet) {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w |= o;
        }
    }

    pub fn union(&self, other: &IndexSet) -> IndexSet {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    pub fn intersection(&self, other: &IndexSet) -> IndexSet {
        let mut out = IndexSet {
            words: self
                .words
                .iter()
                .zip(other.words.iter())
                .map(|(s, o)| s & o)
                .collect(),
        };
        out.normalize();
        out
    }

    /// Copy of this set with `id` added.
    pub fn with(&self, id: IndexId) -> IndexSet {
        let mut out = self.clone();
        out.set(id);
        out
    }

    /// Copy of this set with `id` removed.
    pub fn without(&self, id: IndexId) -> IndexSet {
        let mut out = self.clone();
        out.clear(id);
        out
    }

    pub fn is_subset_of(&self, other: &IndexSet) -> bool {
        if self.words.len() > other.words.len() {
            return false;
        }
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(s, o)| s & !o == 0)
    }

    pub fn is_superset_of(&self, other: &IndexSet) -> bool {
        other.is_subset_of(self)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Lazily iterates the set bits in ascending order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            words: &self.words,
            word_index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

/// Ascending iterator over the ids of an [`IndexSet`].
pub struct Iter<'a> {
    words: &'a [u64],
    word_index: usize,
    current: u64,
}

impl Iterator for Iter<'_> {
    type Item = IndexId;

    fn next(&mut self) -> Option<IndexId> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros();
                self.current &= self.current - 1;
                return Some(self.word_index as u32 * WORD_BITS + bit);
            }
            self.word_index += 1;
            if self.word_index >= self.words.len() {
                return None;
            }
            self.current = self.words[self.word_index];
        }
    }
}

impl<'a> IntoIterator for &'a IndexSet {
    type Item = IndexId;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl FromIterator<IndexId> for IndexSet {
    fn from_iter<I: IntoIterator<Item = IndexId>>(iter: I) -> Self {
        Self::from_ids(iter)
    }
}

impl From<Vec<IndexId>> for IndexSet {
    fn from(ids: Vec<IndexId>) -> Self {
        Self::from_ids(ids)
    }
}

impl From<IndexSet> for Vec<IndexId> {
    fn from(set: IndexSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Debug for IndexSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for IndexSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, id) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, "}}")
    }
}
