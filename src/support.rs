//! Map split support from a [`SplitTable`] onto an existing tree.
//!
//! Every non-trivial edge of the target is encoded with the target's own rooting and
//! looked up in the table. Matched edges get their frequency and summaries, unmatched
//! edges get a support of zero. The topology is never touched; edge lengths only change
//! on matched edges and only if an override strategy is requested.

use crate::consensus::{SUPPORT_KEY, apply_age_lengths, attach_summaries, check_strategy, summarize};
use crate::error::{ConsensusError, Result};
use crate::options::AnnotateOptions;
use crate::splits::{SplitEncoder, SplitMode};
use crate::table::{SplitStats, SplitTable};
use crate::tree::TreeGraph;
use tracing::debug;

/// How one edge of the target relates to the table.
enum Lookup<'a> {
    /// Trivial internal edge, left alone.
    Skip,
    Terminal(&'a SplitStats),
    Matched(&'a SplitStats),
    Unmatched,
}

/// Annotates `tree` in place with support values and summaries from `table`.
///
/// # Errors
/// - [`ConsensusError::EmptyTable`] if the table holds no trees
/// - [`ConsensusError::IncompatibleRooting`] if the tree's rooting differs from the table's
/// - [`ConsensusError::RegistryMismatch`] / [`ConsensusError::InvalidTree`] from encoding
/// - [`ConsensusError::InvalidOption`] if the length override cannot be served
///
/// On error the tree is left unchanged.
pub fn annotate(tree: &mut TreeGraph, table: &SplitTable, options: &AnnotateOptions) -> Result<()> {
    if table.trees() == 0 {
        return Err(ConsensusError::EmptyTable);
    }
    let mode = SplitMode::of(tree);
    if table.mode() != Some(mode) {
        return Err(ConsensusError::IncompatibleRooting(format!(
            "target tree is {}, the split table is not; set the target's rooting explicitly",
            if mode.is_rooted() { "rooted" } else { "unrooted" }
        )));
    }
    if let Some(strategy) = options.edge_lengths {
        check_strategy(table, strategy)?;
    }

    let encoded = SplitEncoder::new(table.num_taxa(), mode).encode(tree)?;
    let mut lookups: Vec<Lookup<'_>> = (0..tree.len()).map(|_| Lookup::Skip).collect();
    for edge in &encoded.edges {
        lookups[edge.head] = match tree[edge.head].taxon() {
            Some(taxon) => table.terminal(taxon).map_or(Lookup::Skip, Lookup::Terminal),
            None if edge.trivial => Lookup::Skip,
            None => table.get(&edge.split).map_or(Lookup::Unmatched, Lookup::Matched),
        };
    }

    // Work out new lengths before touching the tree.
    let lengths = match options.edge_lengths {
        None => None,
        Some(strategy) if strategy.uses_ages() => {
            let median = strategy.uses_median();
            let mut ages = vec![None; tree.len()];
            if let Some(root_ages) = table.root().ages() {
                ages[tree.root()] = summarize(root_ages, median)?;
            }
            for (id, lookup) in lookups.iter().enumerate() {
                if let Lookup::Terminal(stats) | Lookup::Matched(stats) = lookup
                    && let Some(stats) = stats.ages()
                {
                    ages[id] = summarize(stats, median)?;
                }
            }
            let mut derived = tree.clone();
            apply_age_lengths(&mut derived, &ages);
            Some(derived.nodes().map(|node| node.edge_length()).collect::<Vec<_>>())
        }
        Some(strategy) => {
            let median = strategy.uses_median();
            let mut lengths = vec![None; tree.len()];
            for (id, lookup) in lookups.iter().enumerate() {
                if let Lookup::Matched(stats) = lookup {
                    lengths[id] = summarize(stats.lengths(), median)?;
                }
            }
            Some(lengths)
        }
    };

    let trees = table.trees() as f64;
    let mut unmatched = 0usize;
    for (id, lookup) in lookups.iter().enumerate() {
        let node = &mut tree[id];
        match lookup {
            Lookup::Skip => {}
            Lookup::Terminal(stats) => {
                if options.summarize {
                    attach_summaries(node, stats.lengths(), stats.ages());
                }
            }
            Lookup::Matched(stats) => {
                node.annotate(SUPPORT_KEY, options.support.value(stats.count() as f64 / trees));
                if options.summarize {
                    attach_summaries(node, stats.lengths(), stats.ages());
                }
                if let Some(length) = lengths.as_ref().and_then(|l| l[id]) {
                    node.set_edge_length(Some(length));
                }
            }
            Lookup::Unmatched => {
                unmatched += 1;
                node.annotate(SUPPORT_KEY, options.support.value(0.0));
            }
        }
    }
    debug!(unmatched, "mapped split support onto target tree");
    Ok(())
}

/// Returns an annotated copy of `tree`, see [`annotate`].
pub fn annotated(tree: &TreeGraph, table: &SplitTable, options: &AnnotateOptions) -> Result<TreeGraph> {
    let mut copy = tree.clone();
    annotate(&mut copy, table, options)?;
    Ok(copy)
}
