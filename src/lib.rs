//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `bitset`: compact bitset representation of leaf sets.
//! - `taxa`: shared taxon registry (label ↔ bit index).
//! - `tree`: arena-backed tree graph with edge lengths and annotations.
//! - `splits`: canonical split encoding and compatibility.
//! - `ages`: node heights and ages of ultrametric trees.
//! - `stats`: exact, mergeable running statistics.
//! - `table`: split table aggregated over many trees.
//! - `consensus`: majority-rule / greedy consensus construction.
//! - `support`: mapping split support onto an existing tree.
//! - `aggregate`: parallel aggregation over tree sources.
//! - `io`: NEXUS/Newick reading, annotated Newick writing, table JSON.
//! - `options`, `error`: parameters and the error type.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod ages;
pub mod aggregate;
pub mod bitset;
pub mod consensus;
pub mod error;
pub mod io;
pub mod options;
pub mod splits;
pub mod stats;
pub mod support;
pub mod table;
pub mod taxa;
pub mod tree;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use aggregate::{InMemorySource, TreeSource, aggregate_sources};
pub use bitset::Bitset;
pub use consensus::build_consensus;
pub use error::{ConsensusError, Result};
pub use io::{TreeFile, load_table, save_table, write_trees};
pub use options::{
    AggregateOptions, AnnotateOptions, ConsensusOptions, EdgeSummary, MalformedTreePolicy,
    RootingPolicy, SupportFormat, TableOptions,
};
pub use splits::{SplitEncoder, SplitMode};
pub use support::{annotate, annotated};
pub use table::{SplitStats, SplitTable};
pub use taxa::TaxonRegistry;
pub use tree::TreeGraph;
