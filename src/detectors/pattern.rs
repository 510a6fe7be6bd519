//! Regex detector - high-precision pattern matching for sensitive data.
//!
//! Holds a compiled bank of named patterns, each with a fixed
//! `(label, sublabel, confidence)`. Regex matching is deterministic: if a
//! pattern fires, the match is almost always correct, so every match gets
//! the pattern's fixed confidence with no per-match adjustment.
//!
//! For context-dependent entities (names, diseases), use the statistical
//! detector; patterns only cover formats that identify themselves.

use crate::entity::{Entity, EntitySource, Label};
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// A named pattern with its fixed classification.
#[derive(Debug, Clone)]
pub struct NamedPattern {
    /// Pattern name (unique within the bank).
    pub name: String,
    /// Compiled case-insensitive regex.
    pub regex: Regex,
    /// Classification label.
    pub label: Label,
    /// Finer-grained type emitted for matches.
    pub sublabel: String,
    /// Fixed confidence for every match.
    pub confidence: f64,
}

/// Default pattern bank: `(name, pattern, label, sublabel, confidence)`.
///
/// These forms are load-bearing; downstream confidence thresholds are
/// calibrated against them.
const DEFAULT_PATTERNS: &[(&str, &str, Label, &str, f64)] = &[
    ("SSN", r"\b\d{3}-\d{2}-\d{4}\b", Label::Pii, "SSN", 0.99),
    (
        "CREDIT_CARD",
        r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b",
        Label::Financial,
        "CREDIT_CARD",
        0.95,
    ),
    (
        "EMAIL",
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b",
        Label::Pii,
        "EMAIL",
        0.98,
    ),
    (
        "PHONE",
        r"\b\(?\d{3}\)?[- ]?\d{3}[- ]?\d{4}\b",
        Label::Pii,
        "PHONE",
        0.95,
    ),
    (
        "IP_ADDRESS",
        r"\b(?:\d{1,3}\.){3}\d{1,3}\b",
        Label::Pii,
        "IP_ADDRESS",
        0.90,
    ),
    (
        "MEDICAL_ID",
        r"\b(MRN|PATIENT|MED)[- ]?\d{5,10}\b",
        Label::Phi,
        "MEDICAL_ID",
        0.92,
    ),
    (
        "DATE_OF_BIRTH",
        r"\b(DOB|Date of Birth):\s*\d{1,2}/\d{1,2}/\d{4}\b",
        Label::Pii,
        "DATE_OF_BIRTH",
        0.95,
    ),
];

/// Regex-based detector over a bank of named patterns.
///
/// Stateless per call: `classify` has no side effects, and the bank only
/// changes through [`RegexDetector::add_pattern`].
#[derive(Debug, Clone)]
pub struct RegexDetector {
    patterns: Vec<NamedPattern>,
}

/// Compiled default bank, built once per process.
static DEFAULT_BANK: Lazy<Vec<NamedPattern>> = Lazy::new(|| {
    DEFAULT_PATTERNS
        .iter()
        .map(|(name, pattern, label, sublabel, confidence)| NamedPattern {
            name: (*name).to_string(),
            // Default patterns are known-good; compilation cannot fail.
            regex: compile(pattern)
                .unwrap_or_else(|_| unreachable!("default pattern {name} must compile")),
            label: *label,
            sublabel: (*sublabel).to_string(),
            confidence: *confidence,
        })
        .collect()
});

impl RegexDetector {
    /// Create a detector with the default pattern bank.
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: DEFAULT_BANK.clone(),
        }
    }

    /// Detect entities via the pattern bank.
    ///
    /// Only patterns whose label is in `requested_types` are run; pass
    /// `None` to run all. Matches within one pattern are the regex engine's
    /// natural non-overlapping set. Matching itself never fails: a compiled
    /// regex cannot error at match time.
    #[must_use]
    pub fn classify(&self, text: &str, requested_types: Option<&[Label]>) -> Vec<Entity> {
        let mut entities = Vec::new();

        for pattern in &self.patterns {
            if let Some(types) = requested_types {
                if !types.contains(&pattern.label) {
                    continue;
                }
            }

            for m in pattern.regex.find_iter(text) {
                let Ok(entity) = Entity::new(
                    m.as_str(),
                    m.start(),
                    m.end(),
                    pattern.label,
                    pattern.sublabel.clone(),
                    pattern.confidence,
                    EntitySource::Regex,
                ) else {
                    // Bank invariants guarantee valid spans and confidences.
                    continue;
                };
                let mut metadata = crate::entity::Metadata::new();
                metadata.insert(
                    "pattern_name".to_string(),
                    serde_json::Value::String(pattern.name.clone()),
                );
                entities.push(entity.with_metadata(metadata));
            }
        }

        entities
    }

    /// Register a named pattern at runtime.
    ///
    /// Replaces an existing pattern with the same name, otherwise appends.
    ///
    /// # Errors
    ///
    /// Fails fast with [`Error::Pattern`] on an invalid regex or a
    /// confidence outside `[0.0, 1.0]`; the bank is left unchanged.
    pub fn add_pattern(
        &mut self,
        name: impl Into<String>,
        pattern: &str,
        label: Label,
        sublabel: impl Into<String>,
        confidence: f64,
    ) -> Result<()> {
        let name = name.into();
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::pattern(format!(
                "confidence for {name} must be between 0 and 1, got {confidence}"
            )));
        }
        let regex = compile(pattern)
            .map_err(|e| Error::pattern(format!("invalid regex for {name}: {e}")))?;

        let named = NamedPattern {
            name: name.clone(),
            regex,
            label,
            sublabel: sublabel.into(),
            confidence,
        };

        if let Some(existing) = self.patterns.iter_mut().find(|p| p.name == name) {
            *existing = named;
        } else {
            self.patterns.push(named);
        }
        log::info!("Added custom pattern: {name}");
        Ok(())
    }

    /// Names of all registered patterns, in bank order.
    #[must_use]
    pub fn pattern_names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.name.as_str()).collect()
    }

    /// Number of registered patterns.
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

impl Default for RegexDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}
