//! Parallel aggregation of many tree sources into one [`SplitTable`].
//!
//! Each source (typically one MCMC run file) is read by exactly one worker into its own
//! table. Nothing is shared between workers. Once every worker has finished, the partial
//! tables are merged in source order:
//!
//! ```text
//! run1.trees ─► worker ─► table 1 ─┐
//! run2.trees ─► worker ─► table 2 ─┼─► merge (source order) ─► split table
//! run3.trees ─► worker ─► table 3 ─┘
//! ```
//!
//! Merging is exact and order independent, so the final table does not depend on the
//! number of workers or on scheduling. If any worker fails, the whole run fails and no
//! partial table is merged.

use crate::error::{ConsensusError, Result};
use crate::options::{AggregateOptions, MalformedTreePolicy};
use crate::table::SplitTable;
use crate::taxa::TaxonRegistry;
use crate::tree::TreeGraph;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lazy sequence of trees, as handed over by a reader.
pub type TreeIter<'a> = Box<dyn Iterator<Item = Result<TreeGraph>> + 'a>;

/// A source of trees over a shared registry, read by a single worker.
///
/// Burn-in is the source's concern: the iterator starts after the skipped trees.
/// An item may be a [`ConsensusError::MalformedTree`] error, which the aggregator
/// skips or escalates depending on [`MalformedTreePolicy`].
pub trait TreeSource: Sync {
    /// Name used in log messages and errors (e.g. the file name).
    fn name(&self) -> &str;

    /// Opens the source.
    fn trees<'a>(&'a self, registry: &'a TaxonRegistry) -> Result<TreeIter<'a>>;
}

impl<T: TreeSource + ?Sized> TreeSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn trees<'a>(&'a self, registry: &'a TaxonRegistry) -> Result<TreeIter<'a>> {
        (**self).trees(registry)
    }
}

/// Trees already in memory, with an optional burn-in.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    name: String,
    trees: Vec<TreeGraph>,
    burnin: usize,
}

impl InMemorySource {
    pub fn new(name: impl Into<String>, trees: Vec<TreeGraph>) -> Self {
        InMemorySource { name: name.into(), trees, burnin: 0 }
    }

    /// Skips the first `burnin` trees.
    pub fn with_burnin(mut self, burnin: usize) -> Self {
        self.burnin = burnin;
        self
    }
}

impl TreeSource for InMemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn trees<'a>(&'a self, _registry: &'a TaxonRegistry) -> Result<TreeIter<'a>> {
        Ok(Box::new(self.trees.iter().skip(self.burnin).cloned().map(Ok)))
    }
}

/// Reads every tree of one source into a fresh table.
///
/// Structural problems with a single tree are treated like parse failures and go
/// through the malformed-tree policy; every other error is fatal.
pub fn aggregate_source<S: TreeSource + ?Sized>(
    source: &S,
    registry: &TaxonRegistry,
    options: &AggregateOptions,
) -> Result<SplitTable> {
    let start = Instant::now();
    let mut table = SplitTable::new(registry.len(), options.table)?;
    let mut skipped = 0usize;

    for (index, item) in source.trees(registry)?.enumerate() {
        let outcome = item.and_then(|tree| table.absorb(&tree));
        let err = match outcome {
            Ok(()) => continue,
            Err(ConsensusError::InvalidTree(message)) => ConsensusError::MalformedTree {
                source_name: source.name().to_string(),
                index,
                message,
            },
            Err(err) => err,
        };
        match options.on_malformed {
            MalformedTreePolicy::Skip if err.is_recoverable() => {
                warn!(source = source.name(), index, "skipping tree: {err}");
                skipped += 1;
            }
            _ => return Err(err),
        }
    }

    info!(
        source = source.name(),
        trees = table.trees(),
        splits = table.len(),
        skipped,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "aggregated source"
    );
    Ok(table)
}

/// Aggregates all `sources` in parallel and merges the partial tables.
///
/// # Errors
/// Any failing source aborts the run; no partial result is returned.
pub fn aggregate_sources<S: TreeSource>(
    sources: &[S],
    registry: &TaxonRegistry,
    options: &AggregateOptions,
) -> Result<SplitTable> {
    let run = || -> Result<Vec<SplitTable>> {
        sources
            .par_iter()
            .map(|source| aggregate_source(source, registry, options))
            .collect()
    };
    let partials = match options.threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| ConsensusError::InvalidOption(format!("cannot start {threads} workers: {e}")))?
            .install(run)?,
        None => run()?,
    };

    let mut table = SplitTable::new(registry.len(), options.table)?;
    for partial in &partials {
        table.merge(partial)?;
    }
    debug!(sources = partials.len(), trees = table.trees(), "merged partial tables");
    Ok(table)
}
