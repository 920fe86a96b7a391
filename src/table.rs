//! Aggregate splits and their edge statistics across many trees.
//!
//! A [`SplitTable`] maps every non-trivial canonical split seen so far to its occurrence
//! count and to running statistics over the lengths (and, in ultrametric mode, node ages)
//! of the edges that carried it.
//!
//! Tables built from disjoint sets of trees can be merged. Merging only adds counts and
//! exact fixed-point sums, so the result does not depend on how the trees were grouped or
//! in which order the partial tables are combined:
//!
//! ```text
//! worker 1: t1 t2 t3 ─► table A ─┐
//! worker 2: t4 t5    ─► table B ─┼─► merge ─► same table as absorbing t1..t7 in sequence
//! worker 3: t6 t7    ─► table C ─┘
//! ```

use crate::ages::node_ages;
use crate::bitset::Bitset;
use crate::error::{ConsensusError, Result};
use crate::options::{RootingPolicy, TableOptions};
use crate::splits::{SplitEncoder, SplitMode};
use crate::stats::SampleStats;
use crate::taxa::TaxonIndex;
use crate::tree::TreeGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::trace;

/// Occurrence count plus length/age statistics of one split (or one terminal edge).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitStats {
    count: u64,
    lengths: SampleStats,
    ages: Option<SampleStats>,
}

impl SplitStats {
    fn new(options: &TableOptions) -> Self {
        SplitStats {
            count: 0,
            lengths: SampleStats::new(options.keep_samples),
            ages: options
                .track_ages
                .then(|| SampleStats::new(options.keep_samples)),
        }
    }

    /// Records one occurrence. Length and age are folded in together with the count.
    fn record(&mut self, length: Option<f64>, age: Option<f64>) {
        self.count += 1;
        if let Some(length) = length {
            self.lengths.push(length);
        }
        if let (Some(ages), Some(age)) = (self.ages.as_mut(), age) {
            ages.push(age);
        }
    }

    fn merge(&mut self, other: &SplitStats) {
        self.count += other.count;
        self.lengths.merge(&other.lengths);
        match (self.ages.as_mut(), other.ages.as_ref()) {
            (Some(mine), Some(theirs)) => mine.merge(theirs),
            (None, Some(theirs)) => self.ages = Some(theirs.clone()),
            _ => {}
        }
    }

    /// Number of trees in which the split occurred.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Statistics over the lengths of the edges carrying the split.
    pub fn lengths(&self) -> &SampleStats {
        &self.lengths
    }

    /// Statistics over the ages of the nodes below those edges (ultrametric mode only).
    pub fn ages(&self) -> Option<&SampleStats> {
        self.ages.as_ref()
    }
}

/// Split → statistics over a stream of trees sharing one taxon registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitTable {
    num_taxa: usize,
    options: TableOptions,
    /// Fixed by policy or by the first absorbed tree.
    mode: Option<SplitMode>,
    trees: u64,
    #[serde(with = "entries")]
    splits: HashMap<Bitset, SplitStats>,
    /// Per-taxon statistics of terminal edges; not part of the split key space.
    terminals: Vec<SplitStats>,
    /// Root age (and root edge length, if trees carry one).
    root: SplitStats,
}

impl SplitTable {
    /// Creates an empty table for a registry of `num_taxa` taxa.
    ///
    /// # Errors
    /// [`ConsensusError::IncompatibleRooting`] if ages are tracked on trees forced to be unrooted.
    pub fn new(num_taxa: usize, options: TableOptions) -> Result<Self> {
        let mode = match options.rooting {
            RootingPolicy::FromTrees => None,
            RootingPolicy::ForceRooted => Some(SplitMode::Rooted),
            RootingPolicy::ForceUnrooted => Some(SplitMode::Unrooted),
        };
        if options.track_ages && mode == Some(SplitMode::Unrooted) {
            return Err(ConsensusError::IncompatibleRooting(
                "node ages cannot be tracked on unrooted trees".to_string(),
            ));
        }
        Ok(SplitTable {
            num_taxa,
            options,
            mode,
            trees: 0,
            splits: HashMap::new(),
            terminals: vec![SplitStats::new(&options); num_taxa],
            root: SplitStats::new(&options),
        })
    }

    /// Builds a table by absorbing `trees` in order.
    pub fn from_trees<'a, I>(num_taxa: usize, options: TableOptions, trees: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a TreeGraph>,
    {
        let mut table = SplitTable::new(num_taxa, options)?;
        for tree in trees {
            table.absorb(tree)?;
        }
        Ok(table)
    }

    /// The split mode `tree` is interpreted under, checked against the table's mode.
    pub fn mode_for(&self, tree: &TreeGraph) -> Result<SplitMode> {
        let mode = match self.options.rooting {
            RootingPolicy::ForceRooted => SplitMode::Rooted,
            RootingPolicy::ForceUnrooted => SplitMode::Unrooted,
            RootingPolicy::FromTrees => {
                let mode = SplitMode::of(tree);
                match self.mode {
                    Some(established) if established != mode => {
                        return Err(ConsensusError::IncompatibleRooting(format!(
                            "{} tree in a session of {} trees; normalize rooting explicitly",
                            describe(mode),
                            describe(established)
                        )));
                    }
                    _ => mode,
                }
            }
        };
        if self.options.track_ages && mode == SplitMode::Unrooted {
            return Err(ConsensusError::IncompatibleRooting(
                "node ages require rooted trees".to_string(),
            ));
        }
        Ok(mode)
    }

    /// Encodes `tree` and folds each of its non-trivial splits into the table.
    ///
    /// The tree is validated completely before anything is recorded, so a failing tree
    /// leaves the table unchanged.
    ///
    /// # Errors
    /// - [`ConsensusError::RegistryMismatch`] / [`ConsensusError::InvalidTree`] from encoding
    /// - [`ConsensusError::IncompatibleRooting`] if the tree's rooting clashes with the session
    /// - [`ConsensusError::NonUltrametricTree`] if ages are tracked and the tree is not ultrametric
    pub fn absorb(&mut self, tree: &TreeGraph) -> Result<()> {
        let mode = self.mode_for(tree)?;
        let encoded = SplitEncoder::new(self.num_taxa, mode).encode(tree)?;
        let ages = if self.options.track_ages {
            Some(node_ages(tree, self.options.ultrametric_tolerance)?)
        } else {
            None
        };
        let age_of = |id: usize| ages.as_ref().map(|a| a[id]);

        // An unrooted tree stored with a basal bifurcation reports its root split twice;
        // fold both halves into one edge of combined length.
        let mut informative: Vec<(&Bitset, Option<f64>, usize)> = Vec::new();
        let mut index: HashMap<&Bitset, usize> = HashMap::new();
        for edge in encoded.informative_edges() {
            match index.entry(&edge.split) {
                Entry::Occupied(slot) => {
                    let (_, length, _) = &mut informative[*slot.get()];
                    *length = match (*length, edge.length) {
                        (Some(a), Some(b)) => Some(a + b),
                        (a, b) => a.or(b),
                    };
                }
                Entry::Vacant(slot) => {
                    slot.insert(informative.len());
                    informative.push((&edge.split, edge.length, edge.head));
                }
            }
        }

        for (split, length, head) in informative {
            self.splits
                .entry(split.clone())
                .or_insert_with(|| SplitStats::new(&self.options))
                .record(length, age_of(head));
        }
        for leaf in tree.leaves() {
            if let Some(taxon) = leaf.taxon() {
                self.terminals[taxon].record(leaf.edge_length(), age_of(leaf.id()));
            }
        }
        self.root
            .record(tree[tree.root()].edge_length(), age_of(tree.root()));

        self.trees += 1;
        self.mode = Some(mode);
        trace!(trees = self.trees, splits = self.splits.len(), "absorbed tree");
        Ok(())
    }

    /// Adds all counts and statistics of `other` into `self`.
    ///
    /// # Errors
    /// - [`ConsensusError::RegistryMismatch`] if the registries differ in size
    /// - [`ConsensusError::IncompatibleRooting`] if one table holds rooted and the other
    ///   unrooted splits
    /// - [`ConsensusError::IncompatibleTables`] if only one of them tracks ages
    pub fn merge(&mut self, other: &SplitTable) -> Result<()> {
        if self.num_taxa != other.num_taxa {
            return Err(ConsensusError::RegistryMismatch(format!(
                "cannot merge tables over {} and {} taxa",
                self.num_taxa, other.num_taxa
            )));
        }
        if let (Some(mine), Some(theirs)) = (self.mode, other.mode)
            && mine != theirs
        {
            return Err(ConsensusError::IncompatibleRooting(format!(
                "cannot merge a table of {} splits into one of {} splits",
                describe(theirs),
                describe(mine)
            )));
        }
        if self.options.track_ages != other.options.track_ages {
            return Err(ConsensusError::IncompatibleTables(
                "only one of the tables tracks node ages".to_string(),
            ));
        }

        for (split, stats) in &other.splits {
            match self.splits.get_mut(split) {
                Some(mine) => mine.merge(stats),
                None => {
                    self.splits.insert(split.clone(), stats.clone());
                }
            }
        }
        for (mine, theirs) in self.terminals.iter_mut().zip(&other.terminals) {
            mine.merge(theirs);
        }
        self.root.merge(&other.root);
        self.trees += other.trees;
        self.mode = self.mode.or(other.mode);
        Ok(())
    }

    /// Consuming variant of [`merge`](Self::merge), handy for reductions.
    pub fn merged(mut self, other: SplitTable) -> Result<Self> {
        self.merge(&other)?;
        Ok(self)
    }

    pub fn num_taxa(&self) -> usize {
        self.num_taxa
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    /// Split mode of the table; `None` until the first tree is absorbed (unless forced).
    pub fn mode(&self) -> Option<SplitMode> {
        self.mode
    }

    /// Total number of trees absorbed.
    pub fn trees(&self) -> u64 {
        self.trees
    }

    /// Number of distinct non-trivial splits.
    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    pub fn get(&self, split: &Bitset) -> Option<&SplitStats> {
        self.splits.get(split)
    }

    /// Fraction of absorbed trees containing `split` (0 for unknown splits or empty tables).
    pub fn frequency(&self, split: &Bitset) -> f64 {
        match (self.splits.get(split), self.trees) {
            (Some(stats), trees) if trees > 0 => stats.count as f64 / trees as f64,
            _ => 0.0,
        }
    }

    /// Statistics of the terminal edge leading to `taxon`.
    pub fn terminal(&self, taxon: TaxonIndex) -> Option<&SplitStats> {
        self.terminals.get(taxon).filter(|s| s.count > 0)
    }

    /// Taxa that occur as a leaf in at least one absorbed tree.
    pub fn taxa_present(&self) -> Bitset {
        let mut present = Bitset::zeros(Bitset::words_for(self.num_taxa));
        for (taxon, stats) in self.terminals.iter().enumerate() {
            if stats.count() > 0 {
                present.set(taxon);
            }
        }
        present
    }

    /// Root statistics: one record per absorbed tree.
    pub fn root(&self) -> &SplitStats {
        &self.root
    }

    /// Unordered iteration over all splits.
    pub fn splits(&self) -> impl Iterator<Item = (&Bitset, &SplitStats)> {
        self.splits.iter()
    }

    /// All splits in priority order: descending count, then ascending numeric bitset value.
    ///
    /// The order is total, so it does not depend on hash map iteration order.
    pub fn ranked(&self) -> Vec<(&Bitset, &SplitStats)> {
        let mut ranked: Vec<_> = self.splits.iter().collect();
        ranked.sort_by(|(a_bits, a), (b_bits, b)| {
            b.count.cmp(&a.count).then_with(|| a_bits.cmp(b_bits))
        });
        ranked
    }
}

fn describe(mode: SplitMode) -> &'static str {
    match mode {
        SplitMode::Rooted => "rooted",
        SplitMode::Unrooted => "unrooted",
    }
}

/// Serializes the split map as a list of `(split, stats)` pairs sorted by split, since
/// bitsets are not valid map keys in JSON.
mod entries {
    use super::SplitStats;
    use crate::bitset::Bitset;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;
use std::collections::hash_map::Entry;

    pub fn serialize<S: Serializer>(
        map: &HashMap<Bitset, SplitStats>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        let mut entries: Vec<_> = map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<HashMap<Bitset, SplitStats>, D::Error> {
        let entries = Vec::<(Bitset, SplitStats)>::deserialize(d)?;
        Ok(entries.into_iter().collect())
    }
}
