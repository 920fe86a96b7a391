//! Parameters of aggregation, consensus and support mapping.
//!
//! All options are plain structs with sensible defaults; the CLI and the Python
//! bindings fill them from their own argument surfaces.

use crate::ages::DEFAULT_ULTRAMETRIC_TOLERANCE;
use crate::error::{ConsensusError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default minimum clade frequency of a majority-rule consensus.
pub const DEFAULT_MIN_FREQUENCY: f64 = 0.5;

/// How the rooting of incoming trees is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootingPolicy {
    /// The first tree decides; mixing rooted and unrooted trees afterwards is an error.
    #[default]
    FromTrees,
    /// Treat every tree as rooted.
    ForceRooted,
    /// Treat every tree as unrooted.
    ForceUnrooted,
}

/// Settings of a [`SplitTable`](crate::table::SplitTable), fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableOptions {
    pub rooting: RootingPolicy,
    /// Aggregate node ages (ultrametric mode). Requires rooted trees.
    pub track_ages: bool,
    /// Maximum spread of leaf-to-root path lengths still considered ultrametric.
    pub ultrametric_tolerance: f64,
    /// Keep raw samples, needed for medians and HPD intervals.
    pub keep_samples: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        TableOptions {
            rooting: RootingPolicy::FromTrees,
            track_ages: false,
            ultrametric_tolerance: DEFAULT_ULTRAMETRIC_TOLERANCE,
            keep_samples: true,
        }
    }
}

/// Strategy for the edge lengths of a consensus (or re-labelled target) tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EdgeSummary {
    #[default]
    MeanLength,
    MedianLength,
    MeanAge,
    MedianAge,
}

impl EdgeSummary {
    /// Age strategies derive lengths from summarized node ages.
    pub fn uses_ages(self) -> bool {
        matches!(self, EdgeSummary::MeanAge | EdgeSummary::MedianAge)
    }

    pub fn uses_median(self) -> bool {
        matches!(self, EdgeSummary::MedianLength | EdgeSummary::MedianAge)
    }
}

impl fmt::Display for EdgeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeSummary::MeanLength => "mean-length",
            EdgeSummary::MedianLength => "median-length",
            EdgeSummary::MeanAge => "mean-age",
            EdgeSummary::MedianAge => "median-age",
        };
        f.write_str(name)
    }
}

impl FromStr for EdgeSummary {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean-length" => Ok(EdgeSummary::MeanLength),
            "median-length" => Ok(EdgeSummary::MedianLength),
            "mean-age" => Ok(EdgeSummary::MeanAge),
            "median-age" => Ok(EdgeSummary::MedianAge),
            other => Err(ConsensusError::InvalidOption(format!(
                "unknown edge summary '{other}', expected mean-length|median-length|mean-age|median-age"
            ))),
        }
    }
}

/// How support values are reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SupportFormat {
    /// Report `0..100` instead of `0..1`.
    pub as_percentage: bool,
    /// Round to this many decimals.
    pub precision: Option<usize>,
}

impl SupportFormat {
    /// Converts a frequency in `0..=1` into the reported support value.
    ///
    /// # Example
    /// ```
    /// # use rust_python_tree_consensus::options::SupportFormat;
    /// let fmt = SupportFormat { as_percentage: true, precision: Some(1) };
    /// assert_eq!(fmt.value(2.0 / 3.0), 66.7);
    /// ```
    pub fn value(&self, frequency: f64) -> f64 {
        let v = if self.as_percentage { frequency * 100.0 } else { frequency };
        match self.precision {
            Some(p) => {
                let factor = 10f64.powi(p as i32);
                (v * factor).round() / factor
            }
            None => v,
        }
    }
}

/// Parameters of [`build_consensus`](crate::consensus::build_consensus).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConsensusOptions {
    /// Minimum split frequency, in `0..=1`.
    pub min_frequency: f64,
    pub edge_summary: EdgeSummary,
    pub support: SupportFormat,
    /// Attach mean/median/sd/range/HPD annotations.
    pub summarize: bool,
}

impl Default for ConsensusOptions {
    fn default() -> Self {
        ConsensusOptions {
            min_frequency: DEFAULT_MIN_FREQUENCY,
            edge_summary: EdgeSummary::default(),
            support: SupportFormat::default(),
            summarize: true,
        }
    }
}

impl ConsensusOptions {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_frequency) {
            return Err(ConsensusError::InvalidOption(format!(
                "minimum frequency {} is outside [0, 1]",
                self.min_frequency
            )));
        }
        Ok(())
    }
}

/// Parameters of the support mapper.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotateOptions {
    pub support: SupportFormat,
    pub summarize: bool,
    /// Replace the lengths of matched edges with a summary from the table.
    pub edge_lengths: Option<EdgeSummary>,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        AnnotateOptions {
            support: SupportFormat::default(),
            summarize: true,
            edge_lengths: None,
        }
    }
}

/// What to do when a reader hands over a tree it could not parse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MalformedTreePolicy {
    Skip,
    #[default]
    Abort,
}

/// Parameters of a (parallel) aggregation run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AggregateOptions {
    pub table: TableOptions,
    pub on_malformed: MalformedTreePolicy,
    /// Worker threads; `None` uses the global rayon pool.
    pub threads: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_summary_names_round_trip() {
        for strategy in [
            EdgeSummary::MeanLength,
            EdgeSummary::MedianLength,
            EdgeSummary::MeanAge,
            EdgeSummary::MedianAge,
        ] {
            assert_eq!(strategy.to_string().parse::<EdgeSummary>().unwrap(), strategy);
        }
        assert!("max-length".parse::<EdgeSummary>().is_err());
        assert!(EdgeSummary::MedianAge.uses_ages() && EdgeSummary::MedianAge.uses_median());
    }

    #[test]
    fn test_support_format() {
        let plain = SupportFormat::default();
        assert_eq!(plain.value(0.5), 0.5);
        let rounded = SupportFormat { as_percentage: false, precision: Some(3) };
        assert_eq!(rounded.value(2.0 / 3.0), 0.667);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(ConsensusOptions::default().validate().is_ok());
        let bad = ConsensusOptions { min_frequency: 1.5, ..Default::default() };
        assert!(matches!(bad.validate(), Err(ConsensusError::InvalidOption(_))));
    }
}
