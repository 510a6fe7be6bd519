//! # piisense
//!
//! Hybrid sensitive-data classification for Rust.
//!
//! - **Detection**: Regex patterns (SSN, credit card, email, ...) plus
//!   statistical NER with tiered model fallback
//! - **Merging**: Agreement boosting and overlap resolution across detectors
//! - **Active learning**: Feedback-driven fine-tuning with versioned,
//!   operator-promoted model artifacts
//!
//! ## Quick Start
//!
//! ```rust
//! use piisense::HybridEngine;
//!
//! let engine = HybridEngine::new();
//! let result = engine.classify("John Smith's SSN is 123-45-6789", None);
//! assert!(result.entities.iter().any(|e| e.sublabel == "SSN"));
//! ```
//!
//! ## Restricting entity types
//!
//! ```rust
//! use piisense::{HybridEngine, Label};
//!
//! let engine = HybridEngine::new();
//! let result = engine.classify("card 4111-1111-1111-1111", Some(&[Label::Pii]));
//! assert!(result.entities.iter().all(|e| e.label == Label::Pii));
//! ```
//!
//! ## Design
//!
//! - **Two detectors, one result**: regex is precise on formats, statistical
//!   models read context; the merger reconciles disagreements
//! - **Graceful degradation**: a missing or broken model never fails a
//!   classification call, it just contributes nothing
//! - **Byte offsets**: all spans are `[start, end)` byte offsets into the
//!   input text
//! - **Human in the loop**: training produces inactive model versions;
//!   promotion is always an explicit operator action

#![warn(missing_docs)]

pub mod detectors;
mod engine;
mod entity;
mod error;
mod merger;
pub mod training;

pub use detectors::pattern::{NamedPattern, RegexDetector};
pub use detectors::statistical::{
    ModelCandidate, ModelHandle, NerModel, RawEntity, StatisticalDetector,
};
pub use engine::{EngineStats, HybridEngine};
pub use entity::{ClassificationResult, ConfidenceConfig, Entity, EntitySource, Label, Metadata};
pub use error::{Error, Result};
pub use merger::Merger;

/// A mock NER model for testing.
///
/// Returns a fixed set of raw entities regardless of input, so tests can
/// drive the statistical detector and merger with known spans.
///
/// # Example
///
/// ```rust
/// use piisense::{MockNerModel, RawEntity};
///
/// let mock = MockNerModel::new("test-mock")
///     .with_entities(vec![RawEntity::new("John", 0, 4, "PERSON")]);
/// ```
#[derive(Clone, Default)]
pub struct MockNerModel {
    name: &'static str,
    entities: Vec<RawEntity>,
}

impl MockNerModel {
    /// Create a new mock model.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entities: Vec::new(),
        }
    }

    /// Set the entities to return on every tag call.
    #[must_use]
    pub fn with_entities(mut self, entities: Vec<RawEntity>) -> Self {
        self.entities = entities;
        self
    }
}

impl NerModel for MockNerModel {
    fn tag(&self, _text: &str) -> Result<Vec<RawEntity>> {
        Ok(self.entities.clone())
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Commonly used types in one import.
pub mod prelude {
    pub use crate::detectors::pattern::RegexDetector;
    pub use crate::detectors::statistical::{NerModel, StatisticalDetector};
    pub use crate::engine::HybridEngine;
    pub use crate::entity::{
        ClassificationResult, ConfidenceConfig, Entity, EntitySource, Label,
    };
    pub use crate::error::{Error, Result};
    pub use crate::training::{TrainingConfig, TrainingPipeline};
}
