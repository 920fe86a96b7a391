//! Python binding layer for consensus trees and support mapping.
//!
//! Provides Python functions that read BEAST/NEXUS or Newick tree files and
//! return annotated Newick strings.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::path::PathBuf;

use crate::aggregate::aggregate_sources;
use crate::consensus::build_consensus;
use crate::error::ConsensusError;
use crate::io::{TreeFile, WriteOptions, read_first_tree, registry_from_file, to_newick};
use crate::options::{
    AggregateOptions, AnnotateOptions, ConsensusOptions, EdgeSummary, MalformedTreePolicy,
    RootingPolicy, SupportFormat, TableOptions,
};
use crate::support::annotate;
use crate::table::SplitTable;
use crate::taxa::TaxonRegistry;

fn to_py(err: ConsensusError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn parse_rooting(rooting: Option<bool>) -> RootingPolicy {
    match rooting {
        None => RootingPolicy::FromTrees,
        Some(true) => RootingPolicy::ForceRooted,
        Some(false) => RootingPolicy::ForceUnrooted,
    }
}

fn parse_edges(edges: &str) -> PyResult<EdgeSummary> {
    edges.parse().map_err(to_py)
}

/// Helper function to aggregate all files; the registry comes from the first one.
fn read_all_trees(
    paths: &[String],
    burnin_trees: usize,
    table: TableOptions,
    skip_malformed: bool,
) -> PyResult<(TaxonRegistry, SplitTable)> {
    let files: Vec<TreeFile> = paths
        .iter()
        .map(|path| TreeFile::new(PathBuf::from(path)).with_burnin(burnin_trees))
        .collect();
    let first = files
        .first()
        .ok_or_else(|| PyValueError::new_err("No tree files provided"))?;
    let registry = registry_from_file(first).map_err(to_py)?;
    let options = AggregateOptions {
        table,
        on_malformed: if skip_malformed {
            MalformedTreePolicy::Skip
        } else {
            MalformedTreePolicy::Abort
        },
        threads: None,
    };
    let table = aggregate_sources(&files, &registry, &options).map_err(to_py)?;
    Ok((registry, table))
}

/// Build a majority-rule consensus tree from multiple tree files.
///
/// Args:
///     paths: List of file paths to BEAST/NEXUS or Newick tree files
///     min_freq: Minimum split frequency; 0 gives a greedy consensus (default: 0.5)
///     burnin_trees: Number of trees to skip at the beginning of each file (default: 0)
///     rooted: Force rooted (True) or unrooted (False) trees; None reads it from the trees
///     ultrametric: Aggregate node ages as well (default: False)
///     edges: One of "mean-length", "median-length", "mean-age", "median-age"
///     percentages: Report support as percentages (default: False)
///     skip_malformed: Skip trees that fail to parse (default: False)
///
/// Returns:
///     The consensus tree as annotated Newick
///
/// Raises:
///     ValueError: If no trees are found, taxa differ between files, or options are invalid
#[pyfunction]
#[pyo3(signature = (
    paths,
    min_freq=0.5,
    burnin_trees=0,
    rooted=None,
    ultrametric=false,
    edges="mean-length",
    percentages=false,
    skip_malformed=false,
))]
#[allow(clippy::too_many_arguments)]
fn majority_consensus(
    paths: Vec<String>,
    min_freq: f64,
    burnin_trees: usize,
    rooted: Option<bool>,
    ultrametric: bool,
    edges: &str,
    percentages: bool,
    skip_malformed: bool,
) -> PyResult<String> {
    let table_options = TableOptions {
        rooting: parse_rooting(rooted),
        track_ages: ultrametric,
        ..Default::default()
    };
    let (registry, table) = read_all_trees(&paths, burnin_trees, table_options, skip_malformed)?;

    let options = ConsensusOptions {
        min_frequency: min_freq,
        edge_summary: parse_edges(edges)?,
        support: SupportFormat { as_percentage: percentages, precision: None },
        summarize: true,
    };
    let tree = build_consensus(&table, &options).map_err(to_py)?;
    to_newick(&tree, &registry, &WriteOptions::default()).map_err(to_py)
}

/// Annotate the first tree of `target` with split support from multiple tree files.
///
/// Args:
///     target: Path to the tree to annotate
///     paths: List of file paths to BEAST/NEXUS or Newick tree files
///     burnin_trees: Number of trees to skip at the beginning of each file (default: 0)
///     rooted: Force rooted (True) or unrooted (False) trees, target included
///     set_edges: Optionally replace supported edge lengths, same values as `edges` above
///     percentages: Report support as percentages (default: False)
///
/// Returns:
///     The target tree as annotated Newick
///
/// Raises:
///     ValueError: If the target's rooting differs from the samples, or taxa are unknown
#[pyfunction]
#[pyo3(signature = (target, paths, burnin_trees=0, rooted=None, set_edges=None, percentages=false))]
fn map_support(
    target: String,
    paths: Vec<String>,
    burnin_trees: usize,
    rooted: Option<bool>,
    set_edges: Option<&str>,
    percentages: bool,
) -> PyResult<String> {
    let edge_lengths = set_edges.map(parse_edges).transpose()?;
    let table_options = TableOptions {
        rooting: parse_rooting(rooted),
        track_ages: edge_lengths.is_some_and(EdgeSummary::uses_ages),
        ..Default::default()
    };
    let (registry, table) = read_all_trees(&paths, burnin_trees, table_options, false)?;

    let mut tree = read_first_tree(&target, &registry).map_err(to_py)?;
    if let Some(rooted) = rooted {
        tree.set_rooted(rooted);
    }
    let options = AnnotateOptions {
        support: SupportFormat { as_percentage: percentages, precision: None },
        summarize: true,
        edge_lengths,
    };
    annotate(&mut tree, &table, &options).map_err(to_py)?;
    to_newick(&tree, &registry, &WriteOptions::default()).map_err(to_py)
}

/// Python module definition
#[pymodule]
fn rust_python_tree_consensus(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(majority_consensus, m)?)?;
    m.add_function(wrap_pyfunction!(map_support, m)?)?;
    Ok(())
}
