//! Detector implementations.
//!
//! Two independent detectors with complementary error profiles:
//!
//! - [`pattern::RegexDetector`] - deterministic, high precision, format-based
//! - [`statistical::StatisticalDetector`] - context-aware, heuristic confidence
//!
//! The [`crate::merger::Merger`] reconciles their outputs; callers go
//! through [`crate::HybridEngine`] rather than using detectors directly.

pub mod pattern;
pub mod statistical;

pub use pattern::{NamedPattern, RegexDetector};
pub use statistical::{
    domain_tag_map, general_tag_map, heuristic_confidence, ContextNerModel, MedicalNerModel,
    ModelCandidate, ModelHandle, NerModel, RawEntity, StatisticalDetector,
};
