//! Entity and result types for sensitive-data classification.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Classification label for a detected entity.
///
/// These are the coarse sensitivity categories; the finer-grained type
/// (SSN, EMAIL, PERSON, DISEASE, ...) lives in [`Entity::sublabel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    /// Personally identifiable information.
    #[serde(rename = "PII")]
    Pii,
    /// Protected health information.
    #[serde(rename = "PHI")]
    Phi,
    /// Financial data (card numbers, amounts).
    #[serde(rename = "Financial")]
    Financial,
    /// Intellectual property.
    #[serde(rename = "IP")]
    Ip,
    /// Confidential business information.
    #[serde(rename = "Confidential")]
    Confidential,
}

impl Label {
    /// All classification labels, in canonical order.
    pub const ALL: [Label; 5] = [
        Label::Pii,
        Label::Phi,
        Label::Financial,
        Label::Ip,
        Label::Confidential,
    ];

    /// Canonical label string.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            Label::Pii => "PII",
            Label::Phi => "PHI",
            Label::Financial => "Financial",
            Label::Ip => "IP",
            Label::Confidential => "Confidential",
        }
    }

    /// Parse from a label string (case-insensitive).
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_uppercase().as_str() {
            "PII" => Some(Label::Pii),
            "PHI" => Some(Label::Phi),
            "FINANCIAL" => Some(Label::Financial),
            "IP" => Some(Label::Ip),
            "CONFIDENTIAL" => Some(Label::Confidential),
            _ => None,
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

/// Which detector produced an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntitySource {
    /// Deterministic regex pattern match.
    Regex,
    /// General-purpose statistical NER model.
    StatisticalGeneral,
    /// Domain-specific (medical) statistical NER model.
    StatisticalDomain,
    /// Both detectors agreed on the exact span.
    HybridAgreement,
    /// Detectors overlapped; one identity was preferred.
    HybridOverlap,
}

impl EntitySource {
    /// Canonical source string (matches the serialized form).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitySource::Regex => "regex",
            EntitySource::StatisticalGeneral => "statistical-general",
            EntitySource::StatisticalDomain => "statistical-domain",
            EntitySource::HybridAgreement => "hybrid-agreement",
            EntitySource::HybridOverlap => "hybrid-overlap",
        }
    }
}

/// Open string-keyed metadata attached to an entity or result.
///
/// Schema varies by detection source; contents are primitives only.
pub type Metadata = HashMap<String, serde_json::Value>;

/// A detected sensitive-data entity.
///
/// Immutable once constructed: the merger builds new entities rather than
/// mutating inputs. Construction validates the span and confidence range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Surface text of the entity.
    pub text: String,
    /// Start position (byte offset in the original text).
    pub start: usize,
    /// End position (exclusive byte offset).
    pub end: usize,
    /// Coarse classification label.
    pub label: Label,
    /// Finer-grained entity type (SSN, EMAIL, PERSON, ...).
    pub sublabel: String,
    /// Confidence score in [0.0, 1.0].
    pub confidence: f64,
    /// Detector that produced this entity.
    pub source: EntitySource,
    /// Source-dependent extra information.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Entity {
    /// Create a new entity, validating the span and confidence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntity`] if `end <= start` or the confidence
    /// is outside `[0.0, 1.0]`. Violations are never silently corrected.
    pub fn new(
        text: impl Into<String>,
        start: usize,
        end: usize,
        label: Label,
        sublabel: impl Into<String>,
        confidence: f64,
        source: EntitySource,
    ) -> Result<Self> {
        if end <= start {
            return Err(Error::invalid_entity(format!(
                "end position ({end}) must be greater than start ({start})"
            )));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::invalid_entity(format!(
                "confidence must be between 0 and 1, got {confidence}"
            )));
        }
        Ok(Self {
            text: text.into(),
            start,
            end,
            label,
            sublabel: sublabel.into(),
            confidence,
            source,
            metadata: Metadata::new(),
        })
    }

    /// Attach metadata, consuming and returning the entity.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check whether this entity's span overlaps another's.
    #[must_use]
    pub fn overlaps_with(&self, other: &Entity) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }

    /// Check whether this entity's span fully contains another's.
    #[must_use]
    pub fn contains(&self, other: &Entity) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    /// Check whether two entities cover the identical span.
    #[must_use]
    pub fn same_span(&self, other: &Entity) -> bool {
        self.start == other.start && self.end == other.end
    }
}

/// Result of one classification call.
///
/// Created once per [`crate::HybridEngine::classify`] invocation and handed
/// back to the caller; never persisted by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// The text that was classified.
    pub text: String,
    /// Merged entities, ordered by start position.
    pub entities: Vec<Entity>,
    /// Labels the caller asked for.
    pub requested_types: Vec<Label>,
    /// Raw regex detector output (for auditability).
    pub regex_entities: Vec<Entity>,
    /// Raw statistical detector output (for auditability).
    pub statistical_entities: Vec<Entity>,
    /// Calibrated confidence across the merged entities.
    pub overall_confidence: f64,
    /// Wall-clock processing time in milliseconds.
    pub processing_time_ms: f64,
    /// Extra result-level information.
    #[serde(default)]
    pub metadata: Metadata,
}

impl ClassificationResult {
    /// Whether any entities were found.
    #[must_use]
    pub fn has_entities(&self) -> bool {
        !self.entities.is_empty()
    }

    /// Number of merged entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Merged entities carrying the given label.
    #[must_use]
    pub fn entities_with_label(&self, label: Label) -> Vec<&Entity> {
        self.entities.iter().filter(|e| e.label == label).collect()
    }

    /// Merged entities carrying the given sublabel.
    #[must_use]
    pub fn entities_with_sublabel(&self, sublabel: &str) -> Vec<&Entity> {
        self.entities
            .iter()
            .filter(|e| e.sublabel == sublabel)
            .collect()
    }
}

/// Configuration for confidence scoring and merge thresholds.
///
/// Downstream merge behavior is calibrated against these exact defaults;
/// adjust with care.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Base confidence for regex matches.
    pub regex_base: f64,
    /// Base confidence for statistical matches.
    pub ml_base: f64,
    /// Boost applied when both detectors agree on a span.
    pub agreement_boost: f64,
    /// Threshold above which an entity counts as high confidence.
    pub high_threshold: f64,
    /// Minimum confidence for a statistical-only entity to survive merging.
    pub minimum_threshold: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            regex_base: 0.95,
            ml_base: 0.85,
            agreement_boost: 0.05,
            high_threshold: 0.90,
            minimum_threshold: 0.60,
        }
    }
}

impl ConfidenceConfig {
    /// Create a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if any field is outside `[0.0, 1.0]`.
    pub fn new(
        regex_base: f64,
        ml_base: f64,
        agreement_boost: f64,
        high_threshold: f64,
        minimum_threshold: f64,
    ) -> Result<Self> {
        let config = Self {
            regex_base,
            ml_base,
            agreement_boost,
            high_threshold,
            minimum_threshold,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate that every field is in `[0.0, 1.0]`.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("regex_base", self.regex_base),
            ("ml_base", self.ml_base),
            ("agreement_boost", self.agreement_boost),
            ("high_threshold", self.high_threshold),
            ("minimum_threshold", self.minimum_threshold),
        ];
        for (name, value) in fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::invalid_config(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn construction_rejects_out_of_range(conf in -10.0f64..10.0) {
            let result = Entity::new("t", 0, 4, Label::Pii, "T", conf, EntitySource::Regex);
            prop_assert_eq!(result.is_ok(), (0.0..=1.0).contains(&conf));
        }

        #[test]
        fn overlap_is_symmetric(
            s1 in 0usize..100,
            len1 in 1usize..50,
            s2 in 0usize..100,
            len2 in 1usize..50,
        ) {
            let a = Entity::new("a", s1, s1 + len1, Label::Pii, "T", 1.0, EntitySource::Regex).unwrap();
            let b = Entity::new("b", s2, s2 + len2, Label::Pii, "T", 1.0, EntitySource::Regex).unwrap();
            prop_assert_eq!(a.overlaps_with(&b), b.overlaps_with(&a));
        }

        #[test]
        fn contains_implies_overlap(
            s in 0usize..100,
            len in 2usize..50,
            inset in 0usize..20,
        ) {
            let outer = Entity::new("o", s, s + len, Label::Pii, "T", 1.0, EntitySource::Regex).unwrap();
            let inner_start = s + inset.min(len - 1);
            let inner = Entity::new("i", inner_start, s + len, Label::Pii, "T", 1.0, EntitySource::Regex).unwrap();
            prop_assert!(outer.contains(&inner));
            prop_assert!(outer.overlaps_with(&inner));
        }
    }
}
