//! Shared taxon registry.
//!
//! Every tree compared in one session refers to its leaves by index into a single
//! [`TaxonRegistry`]. The registry is built once (usually by the reader) and is
//! read-only afterwards, so bit `i` of every split means the same taxon everywhere.

use crate::error::{ConsensusError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index of a taxon in the registry.
pub type TaxonIndex = usize;

/// Order-preserving mapping from taxon labels to compact indices `0..n`.
///
/// Labels are deduplicated: registering the same label twice returns the same index.
///
/// # Example
/// ```
/// # use rust_python_tree_consensus::taxa::TaxonRegistry;
/// let registry = TaxonRegistry::from_labels(["Kea", "Kaka", "Kakapo"]).unwrap();
/// assert_eq!(registry.index_of("Kaka"), Some(1));
/// assert_eq!(registry.label(2), Some("Kakapo"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TaxonRegistry {
    labels: Vec<String>,
    index: HashMap<String, TaxonIndex>,
}

impl TaxonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from labels in the given order.
    ///
    /// # Errors
    /// Returns [`ConsensusError::RegistryMismatch`] if a label occurs twice, since two
    /// indices for one taxon would make its splits incomparable.
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = TaxonRegistry::new();
        for label in labels {
            let label = label.into();
            if registry.index.contains_key(&label) {
                return Err(ConsensusError::RegistryMismatch(format!(
                    "taxon '{label}' listed twice"
                )));
            }
            registry.get_or_insert(&label);
        }
        Ok(registry)
    }

    /// Gets the index for a label, inserting it if it doesn't exist.
    pub fn get_or_insert(&mut self, label: &str) -> TaxonIndex {
        if let Some(&idx) = self.index.get(label) {
            return idx;
        }
        let idx = self.labels.len();
        self.labels.push(label.to_string());
        self.index.insert(label.to_string(), idx);
        idx
    }

    pub fn index_of(&self, label: &str) -> Option<TaxonIndex> {
        self.index.get(label).copied()
    }

    /// Like [`index_of`](Self::index_of), but a missing label is a registry mismatch.
    pub fn require(&self, label: &str) -> Result<TaxonIndex> {
        self.index_of(label).ok_or_else(|| {
            ConsensusError::RegistryMismatch(format!("taxon '{label}' is not in the registry"))
        })
    }

    pub fn label(&self, idx: TaxonIndex) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl From<Vec<String>> for TaxonRegistry {
    fn from(labels: Vec<String>) -> Self {
        let mut registry = TaxonRegistry::new();
        for label in &labels {
            registry.get_or_insert(label);
        }
        registry
    }
}

impl From<TaxonRegistry> for Vec<String> {
    fn from(registry: TaxonRegistry) -> Self {
        registry.labels
    }
}
