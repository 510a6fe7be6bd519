//! Hybrid classification engine - the single entry point for callers.
//!
//! Runs the regex and statistical detectors independently, reconciles their
//! output through the [`Merger`], and returns a [`ClassificationResult`]
//! carrying the merged list, both raw sub-lists for auditability, a
//! calibrated overall confidence and the wall-clock processing time.
//!
//! Classification never throws for a well-formed request: a sub-detector
//! failure is logged and contributes an empty list.
//!
//! # Example
//!
//! ```rust
//! use piisense::{HybridEngine, Label};
//!
//! let engine = HybridEngine::regex_only();
//! let result = engine.classify("John Smith's SSN is 123-45-6789", Some(&[Label::Pii]));
//! assert!(result.entities.iter().any(|e| e.sublabel == "SSN"));
//! ```

use crate::detectors::pattern::RegexDetector;
use crate::detectors::statistical::StatisticalDetector;
use crate::entity::{ClassificationResult, ConfidenceConfig, Entity, Label, Metadata};
use crate::merger::Merger;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Hybrid classification engine combining regex and statistical detection.
pub struct HybridEngine {
    regex: Option<RegexDetector>,
    statistical: Option<StatisticalDetector>,
    merger: Merger,
    config: ConfidenceConfig,
}

impl HybridEngine {
    /// Create an engine with both detectors and the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ConfidenceConfig::default())
    }

    /// Create an engine with both detectors and a custom configuration.
    #[must_use]
    pub fn with_config(config: ConfidenceConfig) -> Self {
        Self {
            regex: Some(RegexDetector::new()),
            statistical: Some(StatisticalDetector::new()),
            merger: Merger::new(config),
            config,
        }
    }

    /// Create an engine with only the regex detector.
    #[must_use]
    pub fn regex_only() -> Self {
        let config = ConfidenceConfig::default();
        Self {
            regex: Some(RegexDetector::new()),
            statistical: None,
            merger: Merger::new(config),
            config,
        }
    }

    /// Create an engine with only the statistical detector.
    #[must_use]
    pub fn statistical_only() -> Self {
        let config = ConfidenceConfig::default();
        Self {
            regex: None,
            statistical: Some(StatisticalDetector::new()),
            merger: Merger::new(config),
            config,
        }
    }

    /// Create an engine from explicitly constructed detectors.
    ///
    /// Pass `None` to disable a detector. Used to inject model handles
    /// (e.g. a fine-tuned artifact, or mocks in tests).
    #[must_use]
    pub fn with_detectors(
        regex: Option<RegexDetector>,
        statistical: Option<StatisticalDetector>,
        config: ConfidenceConfig,
    ) -> Self {
        Self {
            regex,
            statistical,
            merger: Merger::new(config),
            config,
        }
    }

    /// Mutable access to the regex detector, for runtime pattern
    /// registration.
    pub fn regex_detector_mut(&mut self) -> Option<&mut RegexDetector> {
        self.regex.as_mut()
    }

    /// Classify a text.
    ///
    /// `requested_types` defaults to all five labels. Detectors run
    /// independently; a failure in one degrades to zero entities from that
    /// detector rather than aborting the call.
    #[must_use]
    pub fn classify(
        &self,
        text: &str,
        requested_types: Option<&[Label]>,
    ) -> ClassificationResult {
        let start_time = Instant::now();

        let requested: Vec<Label> = requested_types
            .map(<[Label]>::to_vec)
            .unwrap_or_else(|| Label::ALL.to_vec());

        let regex_entities: Vec<Entity> = self
            .regex
            .as_ref()
            .map(|d| d.classify(text, Some(&requested)))
            .unwrap_or_default();
        log::debug!("Regex found {} entities", regex_entities.len());

        let statistical_entities: Vec<Entity> = self
            .statistical
            .as_ref()
            .map(|d| d.classify(text, Some(&requested)))
            .unwrap_or_default();
        log::debug!("Statistical found {} entities", statistical_entities.len());

        let entities = self.merger.merge(&regex_entities, &statistical_entities);
        let overall_confidence = self.merger.calculate_overall_confidence(&entities);
        let processing_time_ms = start_time.elapsed().as_secs_f64() * 1000.0;

        let mut metadata = Metadata::new();
        metadata.insert("regex_count".to_string(), regex_entities.len().into());
        metadata.insert(
            "statistical_count".to_string(),
            statistical_entities.len().into(),
        );
        metadata.insert("merged_count".to_string(), entities.len().into());
        metadata.insert("use_regex".to_string(), self.regex.is_some().into());
        metadata.insert(
            "use_statistical".to_string(),
            self.statistical.is_some().into(),
        );

        log::info!(
            "Classification complete: {} entities (confidence: {overall_confidence:.2}, time: {processing_time_ms:.1}ms)",
            entities.len()
        );

        ClassificationResult {
            text: text.to_string(),
            entities,
            requested_types: requested,
            regex_entities,
            statistical_entities,
            overall_confidence,
            processing_time_ms,
            metadata,
        }
    }

    /// Classify multiple texts independently, preserving input order.
    ///
    /// No state or errors propagate between texts.
    #[must_use]
    pub fn classify_batch(
        &self,
        texts: &[&str],
        requested_types: Option<&[Label]>,
    ) -> Vec<ClassificationResult> {
        texts
            .iter()
            .map(|text| self.classify(text, requested_types))
            .collect()
    }

    /// Introspective engine statistics. No side effects: models are not
    /// loaded by this call.
    #[must_use]
    pub fn statistics(&self) -> EngineStats {
        EngineStats {
            regex_enabled: self.regex.is_some(),
            statistical_enabled: self.statistical.is_some(),
            pattern_count: self.regex.as_ref().map_or(0, RegexDetector::pattern_count),
            general_model_tier: self
                .statistical
                .as_ref()
                .and_then(|d| d.general_tier())
                .map(str::to_string),
            domain_model_tier: self
                .statistical
                .as_ref()
                .and_then(|d| d.domain_tier())
                .map(str::to_string),
            confidence_config: self.config,
        }
    }

    /// Clear statistical model handles so promoted artifacts load on next
    /// use. Operator-triggered; never runs automatically.
    pub fn reload_models(&self) {
        if let Some(statistical) = &self.statistical {
            statistical.reload();
        }
    }
}

impl Default for HybridEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of engine configuration and detector state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    /// Whether the regex detector is enabled.
    pub regex_enabled: bool,
    /// Whether the statistical detector is enabled.
    pub statistical_enabled: bool,
    /// Number of registered regex patterns.
    pub pattern_count: usize,
    /// Loaded general model tier, if loaded.
    pub general_model_tier: Option<String>,
    /// Loaded domain model tier, if loaded.
    pub domain_model_tier: Option<String>,
    /// Active confidence configuration.
    pub confidence_config: ConfidenceConfig,
}
