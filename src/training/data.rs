//! Training data conversion and collaborator stores.
//!
//! The pipeline consumes two sources: human feedback corrections and
//! verified training datasets. Both arrive as loosely shaped annotation
//! records (fields may be missing) and are converted into strict
//! [`TrainingExample`]s, dropping anything unusable. The store traits are
//! collaborator contracts; the in-memory implementations back tests and
//! embedded callers.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// A gold entity annotation: `[start, end)` plus a label string.
///
/// The label is the finer-grained sublabel when available (SSN, PERSON, ...)
/// since the model trains on the most specific vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedSpan {
    /// Start byte offset.
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
    /// Gold label.
    pub label: String,
}

/// One unit of training data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Source text.
    pub text: String,
    /// Gold annotations over the text.
    pub spans: Vec<AnnotatedSpan>,
}

/// A raw, possibly incomplete entity annotation as supplied by a
/// collaborator store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAnnotation {
    /// Start offset, if present.
    pub start: Option<usize>,
    /// End offset, if present.
    pub end: Option<usize>,
    /// Coarse label, if present.
    pub label: Option<String>,
    /// Finer-grained label, if present. Preferred over `label`.
    pub sublabel: Option<String>,
}

impl EntityAnnotation {
    /// Create a complete annotation.
    pub fn new(start: usize, end: usize, sublabel: impl Into<String>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            label: None,
            sublabel: Some(sublabel.into()),
        }
    }

    /// Resolve into a strict span, preferring `sublabel` over `label`.
    ///
    /// Returns `None` when any required field is missing or the span is
    /// degenerate or out of bounds for `text`.
    #[must_use]
    pub fn resolve(&self, text: &str) -> Option<AnnotatedSpan> {
        let start = self.start?;
        let end = self.end?;
        let label = self.sublabel.clone().or_else(|| self.label.clone())?;
        if label.is_empty() || end <= start || text.get(start..end).is_none() {
            return None;
        }
        Some(AnnotatedSpan { start, end, label })
    }
}

/// A human feedback record keyed to an originally classified text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Record identifier.
    pub id: u64,
    /// The text that was classified.
    pub text: String,
    /// Whether the original classification was judged correct.
    pub is_correct: bool,
    /// Human-corrected annotations (meaningful when `is_correct == false`).
    pub corrected_entities: Vec<EntityAnnotation>,
    /// Whether this record has already fed a training run.
    pub incorporated_in_training: bool,
}

/// A verified-dataset record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// Record identifier.
    pub id: u64,
    /// Source text.
    pub text: String,
    /// Gold annotations.
    pub entities: Vec<EntityAnnotation>,
    /// Whether the record has been manually verified.
    pub verified: bool,
    /// How many training runs have consumed this record.
    pub usage_count: u64,
}

/// Feedback store collaborator contract.
pub trait FeedbackStore: Send + Sync {
    /// Incorrect feedback not yet incorporated into training.
    fn unincorporated_incorrect(&self) -> Result<Vec<FeedbackRecord>>;

    /// Flag the given records as incorporated.
    fn mark_incorporated(&self, ids: &[u64]) -> Result<()>;
}

/// Verified-dataset store collaborator contract.
pub trait DatasetStore: Send + Sync {
    /// All verified records.
    fn verified(&self) -> Result<Vec<DatasetRecord>>;

    /// Increment the usage counter for a consumed record.
    fn increment_usage(&self, id: u64) -> Result<()>;
}

/// Convert feedback records into training examples.
///
/// Annotations missing any field are dropped; records with no usable
/// annotations are dropped entirely.
#[must_use]
pub fn examples_from_feedback(records: &[FeedbackRecord]) -> Vec<TrainingExample> {
    let mut examples = Vec::new();
    for record in records {
        let spans: Vec<AnnotatedSpan> = record
            .corrected_entities
            .iter()
            .filter_map(|a| a.resolve(&record.text))
            .collect();
        if !spans.is_empty() {
            examples.push(TrainingExample {
                text: record.text.clone(),
                spans,
            });
        }
    }
    log::info!("Converted {} feedback records to training examples", examples.len());
    examples
}

/// Convert dataset records into training examples.
#[must_use]
pub fn examples_from_dataset(records: &[DatasetRecord]) -> Vec<TrainingExample> {
    let mut examples = Vec::new();
    for record in records {
        let spans: Vec<AnnotatedSpan> = record
            .entities
            .iter()
            .filter_map(|a| a.resolve(&record.text))
            .collect();
        if !spans.is_empty() {
            examples.push(TrainingExample {
                text: record.text.clone(),
                spans,
            });
        }
    }
    log::info!("Converted {} dataset records to training examples", examples.len());
    examples
}

/// Deterministic Fisher-Yates shuffle driven by a splitmix-style generator.
pub fn shuffle<T>(items: &mut [T], seed: u64) {
    let mut state = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };
    for i in (1..items.len()).rev() {
        let j = (next() % (i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}

// =============================================================================
// In-memory stores
// =============================================================================

/// In-memory feedback store.
#[derive(Debug, Default)]
pub struct MemoryFeedbackStore {
    records: RwLock<Vec<FeedbackRecord>>,
}

impl MemoryFeedbackStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a feedback record.
    pub fn add(&self, record: FeedbackRecord) {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    /// Snapshot of all records.
    #[must_use]
    pub fn all(&self) -> Vec<FeedbackRecord> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl FeedbackStore for MemoryFeedbackStore {
    fn unincorporated_incorrect(&self) -> Result<Vec<FeedbackRecord>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| !r.is_correct && !r.incorporated_in_training)
            .cloned()
            .collect())
    }

    fn mark_incorporated(&self, ids: &[u64]) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        for record in records.iter_mut() {
            if ids.contains(&record.id) {
                record.incorporated_in_training = true;
            }
        }
        Ok(())
    }
}

/// In-memory verified-dataset store.
#[derive(Debug, Default)]
pub struct MemoryDatasetStore {
    records: RwLock<Vec<DatasetRecord>>,
}

impl MemoryDatasetStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dataset record.
    pub fn add(&self, record: DatasetRecord) {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    /// Snapshot of all records.
    #[must_use]
    pub fn all(&self) -> Vec<DatasetRecord> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl DatasetStore for MemoryDatasetStore {
    fn verified(&self) -> Result<Vec<DatasetRecord>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.verified)
            .cloned()
            .collect())
    }

    fn increment_usage(&self, id: u64) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        for record in records.iter_mut() {
            if record.id == id {
                record.usage_count += 1;
            }
        }
        Ok(())
    }
}
