//! Merge logic for hybrid classification.
//!
//! Reconciles regex and statistical detector output into one deduplicated,
//! position-sorted entity list. Pairing in the agreement and overlap steps
//! is greedy first-match over input iteration order, not a globally optimal
//! assignment; with ambiguous many-to-many overlaps the result depends on
//! input order. That matches the calibrated behavior downstream consumers
//! expect, so it stays.

use crate::entity::{ConfidenceConfig, Entity, EntitySource, Metadata};

/// Merges detector outputs, handling agreement, overlap, deduplication and
/// overall confidence.
#[derive(Debug, Clone, Default)]
pub struct Merger {
    config: ConfidenceConfig,
}

impl Merger {
    /// Create a merger with the given confidence configuration.
    #[must_use]
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    /// The active confidence configuration.
    #[must_use]
    pub fn config(&self) -> &ConfidenceConfig {
        &self.config
    }

    /// Merge regex and statistical entities.
    ///
    /// Strategy, in strict order:
    /// 1. exact-span agreement: boost confidence, regex identity wins
    /// 2. overlap: prefer regex when confidences are close, else higher
    /// 3. leftover regex entities pass through unfiltered
    /// 4. leftover statistical entities pass if above the minimum threshold
    /// 5. deduplicate identical spans, keeping the highest confidence
    /// 6. sort by start position
    #[must_use]
    pub fn merge(&self, regex_entities: &[Entity], statistical_entities: &[Entity]) -> Vec<Entity> {
        let mut merged = Vec::new();
        let mut used_regex = vec![false; regex_entities.len()];
        let mut used_stat = vec![false; statistical_entities.len()];

        // Step 1: exact-span agreement.
        for (i, regex_ent) in regex_entities.iter().enumerate() {
            if used_regex[i] {
                continue;
            }
            for (j, stat_ent) in statistical_entities.iter().enumerate() {
                if used_stat[j] {
                    continue;
                }
                if regex_ent.same_span(stat_ent) {
                    merged.push(self.merge_agreement(regex_ent, stat_ent));
                    used_regex[i] = true;
                    used_stat[j] = true;
                    log::debug!("Exact-span agreement: {}", regex_ent.text);
                    break;
                }
            }
        }

        // Step 2: overlap reconciliation among unconsumed entities.
        for (i, regex_ent) in regex_entities.iter().enumerate() {
            if used_regex[i] {
                continue;
            }
            for (j, stat_ent) in statistical_entities.iter().enumerate() {
                if used_stat[j] {
                    continue;
                }
                if regex_ent.overlaps_with(stat_ent) {
                    merged.push(self.merge_overlap(regex_ent, stat_ent));
                    used_regex[i] = true;
                    used_stat[j] = true;
                    log::debug!("Overlap resolved: {}", regex_ent.text);
                    break;
                }
            }
        }

        // Step 3: leftover regex entities are trusted as-is.
        for (i, regex_ent) in regex_entities.iter().enumerate() {
            if !used_regex[i] {
                merged.push(regex_ent.clone());
            }
        }

        // Step 4: leftover statistical entities must clear the threshold.
        for (j, stat_ent) in statistical_entities.iter().enumerate() {
            if !used_stat[j] && stat_ent.confidence >= self.config.minimum_threshold {
                merged.push(stat_ent.clone());
            }
        }

        // Steps 5-6: dedupe identical spans, then order by position.
        let mut merged = deduplicate(merged);
        merged.sort_by_key(|e| e.start);
        merged
    }

    /// Both detectors found the identical span: regex identity, boosted
    /// confidence, metadata records both sides.
    fn merge_agreement(&self, regex_ent: &Entity, stat_ent: &Entity) -> Entity {
        let confidence = (regex_ent.confidence.max(stat_ent.confidence)
            + self.config.agreement_boost)
            .min(1.0);

        let mut metadata: Metadata = regex_ent.metadata.clone();
        metadata.extend(stat_ent.metadata.clone());
        metadata.insert("agreement".to_string(), serde_json::Value::Bool(true));
        metadata.insert(
            "regex_confidence".to_string(),
            json_f64(regex_ent.confidence),
        );
        metadata.insert(
            "statistical_confidence".to_string(),
            json_f64(stat_ent.confidence),
        );

        // Inputs were validated at construction; span and confidence are in
        // range by construction here.
        Entity::new(
            regex_ent.text.clone(),
            regex_ent.start,
            regex_ent.end,
            regex_ent.label,
            regex_ent.sublabel.clone(),
            confidence,
            EntitySource::HybridAgreement,
        )
        .unwrap_or_else(|_| regex_ent.clone())
        .with_metadata(metadata)
    }

    /// Overlapping but not identical spans: prefer the regex identity when
    /// confidences are close (regex is more specific), else the higher
    /// confidence side.
    fn merge_overlap(&self, regex_ent: &Entity, stat_ent: &Entity) -> Entity {
        let (base, other) = if (regex_ent.confidence - stat_ent.confidence).abs() < 0.1 {
            (regex_ent, stat_ent)
        } else if regex_ent.confidence > stat_ent.confidence {
            (regex_ent, stat_ent)
        } else {
            (stat_ent, regex_ent)
        };

        let mut metadata: Metadata = base.metadata.clone();
        metadata.insert("overlap".to_string(), serde_json::Value::Bool(true));
        metadata.insert(
            "other_source".to_string(),
            serde_json::Value::String(other.source.as_str().to_string()),
        );
        metadata.insert("other_confidence".to_string(), json_f64(other.confidence));

        Entity::new(
            base.text.clone(),
            base.start,
            base.end,
            base.label,
            base.sublabel.clone(),
            base.confidence,
            EntitySource::HybridOverlap,
        )
        .unwrap_or_else(|_| base.clone())
        .with_metadata(metadata)
    }

    /// Overall confidence for a merged entity list.
    ///
    /// 0.0 when empty; otherwise the mean confidence, with a single +0.05
    /// bonus (capped at 1.0) when more than one entity clears the high
    /// threshold.
    #[must_use]
    pub fn calculate_overall_confidence(&self, entities: &[Entity]) -> f64 {
        if entities.is_empty() {
            return 0.0;
        }

        let total: f64 = entities.iter().map(|e| e.confidence).sum();
        let mut avg = total / entities.len() as f64;

        let high_count = entities
            .iter()
            .filter(|e| e.confidence >= self.config.high_threshold)
            .count();
        if high_count > 1 {
            avg = (avg + 0.05).min(1.0);
        }

        avg
    }
}

/// Keep only the highest-confidence entity per `(start, end)` span.
///
/// Ties break toward the first encountered in a confidence-descending
/// stable sort.
fn deduplicate(entities: Vec<Entity>) -> Vec<Entity> {
    if entities.is_empty() {
        return entities;
    }

    let mut sorted = entities;
    sorted.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut seen = std::collections::HashSet::new();
    let mut deduplicated = Vec::with_capacity(sorted.len());
    for entity in sorted {
        if seen.insert((entity.start, entity.end)) {
            deduplicated.push(entity);
        }
    }
    deduplicated
}

fn json_f64(value: f64) -> serde_json::Value {
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}
