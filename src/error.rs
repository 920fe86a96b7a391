//! Error type shared by every stage of the aggregation pipeline.
//!
//! Every variant except [`ConsensusError::MalformedTree`] is fatal for the run in
//! progress: callers must not keep going with a partially filled split table.

use phylotree::tree::TreeError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while encoding, aggregating or summarizing trees.
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// A tree references a taxon the shared registry does not know about,
    /// or two tables/trees were built against registries of different width.
    #[error("taxon registry mismatch: {0}")]
    RegistryMismatch(String),

    /// Node ages were requested for a tree whose leaves are not equidistant
    /// from the root.
    #[error("tree is not ultrametric: leaf depths span {min} to {max} (tolerance {tolerance})")]
    NonUltrametricTree { min: f64, max: f64, tolerance: f64 },

    /// Rooted and unrooted interpretations were mixed within one session.
    #[error("incompatible rooting: {0}")]
    IncompatibleRooting(String),

    /// Consensus or support was requested from a table with no trees in it.
    #[error("split table is empty: no trees were absorbed")]
    EmptyTable,

    /// Structural problem with a tree handed to the core (no root, leaf
    /// without taxon, duplicated taxon, ...).
    #[error("invalid tree: {0}")]
    InvalidTree(String),

    /// Two split tables were configured differently and cannot be merged.
    #[error("incompatible split tables: {0}")]
    IncompatibleTables(String),

    /// A parameter is out of range or not usable with the given table.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// A reader failed to parse one tree. Recoverable: the aggregator either
    /// skips the tree or aborts, depending on the configured policy.
    #[error("malformed tree #{index} in {source_name}: {message}")]
    MalformedTree {
        source_name: String,
        index: usize,
        message: String,
    },

    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tree error: {0}")]
    Phylo(#[from] TreeError),
}

impl ConsensusError {
    /// Whether the aggregator may skip the offending tree and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ConsensusError::MalformedTree { .. })
    }
}

pub type Result<T, E = ConsensusError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_malformed_trees_are_recoverable() {
        let malformed = ConsensusError::MalformedTree {
            source_name: "run1.trees".to_string(),
            index: 3,
            message: "unexpected ')'".to_string(),
        };
        assert!(malformed.is_recoverable());
        assert!(!ConsensusError::EmptyTable.is_recoverable());
        assert!(!ConsensusError::RegistryMismatch("X".into()).is_recoverable());
    }

    #[test]
    fn test_messages_name_the_problem() {
        let err = ConsensusError::NonUltrametricTree {
            min: 9.0,
            max: 10.0,
            tolerance: 1e-5,
        };
        assert!(err.to_string().contains("not ultrametric"));
        assert!(ConsensusError::EmptyTable.to_string().contains("empty"));
    }
}
