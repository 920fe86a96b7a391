//! Compact bitset representation for leaf sets in phylogenetic trees.
//!
//! # Overview
//! A bitset is an efficient way to represent which leaves belong to one side of a split.
//! Each bit position corresponds to a taxon index in the shared registry.
//!
//! # Example
//! For a registry with taxa [A, B, C, D] mapped to indices [0, 1, 2, 3]:
//! - Leaf set {A, C} → bitset `0b0101` (bits 0 and 2 set)
//! - Leaf set {B, C, D} → bitset `0b1110` (bits 1, 2, 3 set)

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A compact bitset for representing which leaves belong to a split side.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily large trees.
/// Each u64 word holds 64 leaf indices; word 0 holds indices 0..64.
///
/// All bitsets compared within one session must have the same number of words,
/// which is fixed by the size of the taxon registry.
///
/// # Ordering
/// Bitsets order by their *numeric* value, i.e. the highest word is compared first.
/// `{A}` (`0b0001`) sorts before `{B}` (`0b0010`), which sorts before `{A, B}` (`0b0011`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates a new bitset with all bits set to 0.
    ///
    /// # Parameters
    /// - `words`: Number of u64 words needed. Calculate as `(num_leaves + 63) / 64`
    ///
    /// # Example
    /// ```
    /// # use rust_python_tree_consensus::bitset::Bitset;
    /// // For a registry with 100 taxa, need 2 words (128 bits)
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Number of words needed to hold `num_leaves` bits.
    #[inline]
    pub fn words_for(num_leaves: usize) -> usize {
        num_leaves.div_ceil(64)
    }

    /// Sets the bit at the given index to 1.
    ///
    /// Marks a leaf as present in this leaf set.
    ///
    /// # Example
    /// ```
    /// # use rust_python_tree_consensus::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);  // Mark leaf 0 as present
    /// bs.set(5);  // Mark leaf 5 as present
    /// assert_eq!(bs.0[0], 0b00100001);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6;     // Equivalent to idx / 64
        let bit = idx & 63;      // Equivalent to idx % 64
        self.0[word] |= 1u64 << bit;
    }

    /// Returns whether the bit at `idx` is set.
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        let word = idx >> 6;
        word < self.0.len() && (self.0[word] >> (idx & 63)) & 1 == 1
    }

    /// Performs bitwise OR with another bitset (union operation).
    ///
    /// Merges two leaf sets: `self` becomes `self ∪ other`
    ///
    /// # Example
    /// ```
    /// # use rust_python_tree_consensus::bitset::Bitset;
    /// let mut left = Bitset::zeros(1);
    /// left.set(0);   // {0}
    ///
    /// let mut right = Bitset::zeros(1);
    /// right.set(1);  // {1}
    ///
    /// left.or_assign(&right);  // {0} ∪ {1} = {0, 1}
    /// assert_eq!(left.0[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Counts the number of set bits (population count).
    ///
    /// Returns how many leaves are on this side of the split.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    /// Leaves present in both sets.
    pub fn intersection(&self, other: &Bitset) -> Bitset {
        Bitset(self.0.iter().zip(&other.0).map(|(a, b)| a & b).collect())
    }

    /// Leaves of `self` that are not in `other`.
    pub fn difference(&self, other: &Bitset) -> Bitset {
        Bitset(self.0.iter().zip(&other.0).map(|(a, b)| a & !b).collect())
    }

    /// Returns `true` if every leaf of `self` is also in `other` (`self ⊆ other`).
    #[inline]
    pub fn is_subset(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & !b == 0)
    }

    /// Returns `true` if `self` and `other` share no leaf.
    #[inline]
    pub fn is_disjoint(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & b == 0)
    }

    /// Iterates over the indices of all set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(w, &word)| {
            (0..64).filter(move |bit| (word >> bit) & 1 == 1).map(move |bit| w * 64 + bit)
        })
    }
}

impl Ord for Bitset {
    fn cmp(&self, other: &Self) -> Ordering {
        // All bitsets of one session share a width; within it, most significant word first.
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.iter().rev().cmp(other.0.iter().rev()))
    }
}

impl PartialOrd for Bitset {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
