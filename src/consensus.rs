//! Majority-rule (and greedy) consensus trees from a [`SplitTable`].
//!
//! # Algorithm
//! 1. Keep the splits whose frequency reaches the threshold.
//! 2. Rank them by count (descending), breaking ties by the numeric value of the bitset.
//! 3. Accept a split only if it is compatible with every split accepted before it.
//! 4. Start from a star tree over all taxa seen and, largest clade first, group the
//!    children covering each accepted clade under a new internal node:
//!
//! ```text
//!   star          accept {B,C,D}       accept {C,D}
//!  / | | \          /   \               /   \
//! A  B C  D        A     *             A     *
//!                      / | \                / \
//!                     B  C  D              B   *
//!                                             / \
//!                                            C   D
//! ```
//!
//! 5. Attach support and summary annotations, then edge lengths from the chosen
//!    [`EdgeSummary`].

use crate::bitset::Bitset;
use crate::error::{ConsensusError, Result};
use crate::options::{ConsensusOptions, EdgeSummary};
use crate::splits::{SplitMode, compatible};
use crate::stats::{HPD_MASS, SampleStats};
use crate::table::{SplitStats, SplitTable};
use crate::tree::{Node, NodeId, TreeGraph};
use tracing::debug;

/// Annotation key of the support value on internal nodes.
pub const SUPPORT_KEY: &str = "support";

/// Where the statistics of a consensus node come from.
#[derive(Clone, Copy)]
enum Origin<'a> {
    Root,
    Terminal(&'a SplitStats),
    Split(&'a SplitStats),
}

/// Builds the consensus tree of `table`.
///
/// A threshold that no split reaches yields a star tree, which is not an error.
///
/// # Errors
/// - [`ConsensusError::EmptyTable`] if no tree has been absorbed
/// - [`ConsensusError::InvalidOption`] for a threshold outside `[0, 1]`, an age strategy on
///   a table without ages, or a median strategy on a table without samples
pub fn build_consensus(table: &SplitTable, options: &ConsensusOptions) -> Result<TreeGraph> {
    options.validate()?;
    let mode = match (table.trees(), table.mode()) {
        (0, _) | (_, None) => return Err(ConsensusError::EmptyTable),
        (_, Some(mode)) => mode,
    };
    check_strategy(table, options.edge_summary)?;

    let accepted = select_splits(table, options.min_frequency, mode);
    debug!(accepted = accepted.len(), total = table.len(), "selected consensus splits");

    let mut tree = TreeGraph::new(mode.is_rooted());
    let mut origins = vec![Origin::Root];
    let present = table.taxa_present();
    for taxon in present.ones() {
        if let Some(stats) = table.terminal(taxon) {
            tree.add_leaf(TreeGraph::ROOT, taxon, None)?;
            origins.push(Origin::Terminal(stats));
        }
    }
    let mut clades: Vec<Bitset> = tree
        .nodes()
        .map(|node| match node.taxon() {
            Some(taxon) => {
                let mut bits = Bitset::zeros(present.0.len());
                bits.set(taxon);
                bits
            }
            None => present.clone(),
        })
        .collect();

    let mut sides: Vec<(Bitset, &SplitStats)> = accepted
        .into_iter()
        .filter_map(|(split, stats)| {
            let side = clade_side(split, &present, mode)?;
            Some((side, stats))
        })
        .collect();
    sides.sort_by(|(a, _), (b, _)| b.count_ones().cmp(&a.count_ones()).then_with(|| a.cmp(b)));

    for (side, stats) in sides {
        let Some(parent) = attachment_point(&tree, &clades, &side) else {
            debug!(?side, "clade already present in consensus");
            continue;
        };
        let group: Vec<NodeId> = tree[parent]
            .children()
            .iter()
            .copied()
            .filter(|&child| clades[child].is_subset(&side))
            .collect();
        tree.insert_parent(parent, &group, None)?;
        clades.push(side);
        origins.push(Origin::Split(stats));
    }

    let trees = table.trees() as f64;
    for (id, origin) in origins.iter().enumerate() {
        let node = &mut tree[id];
        match origin {
            Origin::Split(stats) => {
                node.annotate(SUPPORT_KEY, options.support.value(stats.count() as f64 / trees));
                if options.summarize {
                    attach_summaries(node, stats.lengths(), stats.ages());
                }
            }
            Origin::Terminal(stats) if options.summarize => {
                attach_summaries(node, stats.lengths(), stats.ages());
            }
            Origin::Root if options.summarize => {
                attach_summaries(node, table.root().lengths(), table.root().ages());
            }
            _ => {}
        }
    }

    if options.edge_summary.uses_ages() {
        let median = options.edge_summary.uses_median();
        let mut ages = Vec::with_capacity(origins.len());
        for origin in &origins {
            let age = match stats_of(table, origin).ages() {
                Some(ages) => summarize(ages, median)?,
                None => None,
            };
            ages.push(age);
        }
        apply_age_lengths(&mut tree, &ages);
    } else {
        let median = options.edge_summary.uses_median();
        for (id, origin) in origins.iter().enumerate() {
            let length = summarize(stats_of(table, origin).lengths(), median)?;
            tree[id].set_edge_length(length);
        }
    }

    Ok(tree)
}

fn stats_of<'s>(table: &'s SplitTable, origin: &Origin<'s>) -> &'s SplitStats {
    match *origin {
        Origin::Root => table.root(),
        Origin::Terminal(stats) | Origin::Split(stats) => stats,
    }
}

/// Ranks the splits of `table` and keeps those that reach `min_frequency` and are
/// compatible with every higher-ranked kept split.
pub fn select_splits(
    table: &SplitTable,
    min_frequency: f64,
    mode: SplitMode,
) -> Vec<(&Bitset, &SplitStats)> {
    let trees = table.trees() as f64;
    let present = table.taxa_present();
    let mut accepted: Vec<(&Bitset, &SplitStats)> = Vec::new();
    for (split, stats) in table.ranked() {
        let frequency = stats.count() as f64 / trees;
        if frequency < min_frequency {
            // ranked by count, nothing below can qualify
            break;
        }
        let conflict = accepted
            .iter()
            .find(|(other, _)| !compatible(split, other, &present, mode))
            .map(|(other, _)| *other);
        match conflict {
            Some(conflict) => {
                debug!(?split, ?conflict, frequency, "rejected incompatible split");
            }
            None => accepted.push((split, stats)),
        }
    }
    accepted
}

/// Fails early if the edge-length strategy cannot be served by `table`.
pub(crate) fn check_strategy(table: &SplitTable, strategy: EdgeSummary) -> Result<()> {
    if strategy.uses_ages() && !table.options().track_ages {
        return Err(ConsensusError::InvalidOption(format!(
            "edge summary '{strategy}' needs a table built from ultrametric trees with node ages"
        )));
    }
    if strategy.uses_median() && !table.options().keep_samples {
        return Err(ConsensusError::InvalidOption(format!(
            "edge summary '{strategy}' needs a table that keeps raw samples"
        )));
    }
    Ok(())
}

/// Mean or median of `stats`; `None` if nothing was recorded.
pub(crate) fn summarize(stats: &SampleStats, median: bool) -> Result<Option<f64>> {
    if stats.is_empty() {
        return Ok(None);
    }
    if !median {
        return Ok(stats.mean());
    }
    if !stats.keeps_samples() {
        return Err(ConsensusError::InvalidOption(
            "medians need raw samples, which were dropped while merging tables".to_string(),
        ));
    }
    Ok(stats.median())
}

/// Replaces edge lengths with parent age minus child age; negative values become 0.
pub(crate) fn apply_age_lengths(tree: &mut TreeGraph, ages: &[Option<f64>]) {
    for id in tree.preorder() {
        let Some(parent) = tree[id].parent() else {
            continue;
        };
        if let (Some(parent_age), Some(age)) = (ages[parent], ages[id]) {
            let mut length = parent_age - age;
            if length < 0.0 {
                debug!(node = id, length, "clamped negative edge length derived from ages");
                length = 0.0;
            }
            tree[id].set_edge_length(Some(length));
        }
    }
}

/// Attaches mean/median/sd/range/HPD annotations of lengths and, if tracked, ages.
pub(crate) fn attach_summaries(node: &mut Node, lengths: &SampleStats, ages: Option<&SampleStats>) {
    annotate_quantity(node, "length", lengths);
    if let Some(ages) = ages {
        annotate_quantity(node, "age", ages);
    }
}

fn annotate_quantity(node: &mut Node, prefix: &str, stats: &SampleStats) {
    let Some(summary) = stats.summary() else {
        return;
    };
    node.annotate(format!("{prefix}_mean"), summary.mean);
    if let Some(median) = summary.median {
        node.annotate(format!("{prefix}_median"), median);
    }
    if let Some(sd) = summary.std_dev {
        node.annotate(format!("{prefix}_sd"), sd);
    }
    node.annotate(format!("{prefix}_range"), summary.range);
    if let Some(hpd) = summary.hpd95 {
        node.annotate(format!("{prefix}_{}%_HPD", (HPD_MASS * 100.0).round()), hpd);
    }
}

/// The leaf set a split groups in a tree over `present` taxa, or `None` if that
/// grouping carries no information.
///
/// Unrooted splits are re-anchored on the lowest present taxon, so the side to group
/// never contains it and accepted sides are nested or disjoint.
fn clade_side(split: &Bitset, present: &Bitset, mode: SplitMode) -> Option<Bitset> {
    let mut side = split.intersection(present);
    if mode == SplitMode::Unrooted {
        let anchor = present.ones().next()?;
        if side.contains(anchor) {
            side = present.difference(&side);
        }
    }
    let size = side.count_ones();
    let leaves = present.count_ones();
    (size > 1 && size + 1 < leaves).then_some(side)
}

/// Descends from the root into the internal child containing `side`. Returns the node
/// whose children must be regrouped, or `None` if `side` is already a node.
fn attachment_point(tree: &TreeGraph, clades: &[Bitset], side: &Bitset) -> Option<NodeId> {
    let mut node = tree.root();
    loop {
        let next = tree[node]
            .children()
            .iter()
            .copied()
            .find(|&child| !tree[child].is_leaf() && side.is_subset(&clades[child]));
        match next {
            Some(child) if clades[child] == *side => return None,
            Some(child) => node = child,
            None => return Some(node),
        }
    }
}
