//! Fine-tunable lexicon model.
//!
//! [`TrainedNerModel`] is the artifact produced by the training pipeline: a
//! weighted surface-form lexicon persisted as JSON. It implements
//! [`NerModel`], so a promoted artifact slots into the statistical
//! detector's general handle ahead of the built-in heuristics.

use crate::detectors::statistical::{NerModel, RawEntity};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// File name of the serialized model inside an artifact directory.
pub const MODEL_FILE: &str = "model.json";

/// A surface-form lexicon NER model with per-label weights.
///
/// Keys are lowercased surface forms (possibly multi-word); each maps to
/// accumulated weights per native tag. Tagging scans the text for the
/// longest known phrase at each position and emits the argmax tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainedNerModel {
    labels: Vec<String>,
    lexicon: HashMap<String, HashMap<String, f64>>,
    max_phrase_words: usize,
}

impl TrainedNerModel {
    /// Create an empty model with no labels and no lexicon.
    #[must_use]
    pub fn blank() -> Self {
        Self::default()
    }

    /// Register a label in the model's tag vocabulary. Idempotent.
    pub fn register_label(&mut self, label: &str) {
        if !self.labels.iter().any(|l| l == label) {
            self.labels.push(label.to_string());
        }
    }

    /// Registered labels.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of known surface forms.
    #[must_use]
    pub fn lexicon_size(&self) -> usize {
        self.lexicon.len()
    }

    /// Reinforce a surface form for a label.
    pub fn learn(&mut self, surface: &str, label: &str, weight: f64) {
        let key = normalize(surface);
        if key.is_empty() {
            return;
        }
        self.register_label(label);
        let words = key.split_whitespace().count();
        if words > self.max_phrase_words {
            self.max_phrase_words = words;
        }
        *self
            .lexicon
            .entry(key)
            .or_default()
            .entry(label.to_string())
            .or_insert(0.0) += weight;
    }

    /// The winning label for a surface form, if known.
    #[must_use]
    pub fn best_label(&self, surface: &str) -> Option<&str> {
        let weights = self.lexicon.get(&normalize(surface))?;
        weights
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(label, _)| label.as_str())
    }

    /// Load a model from an artifact directory or a direct JSON file path.
    pub fn load(path: &Path) -> Result<Self> {
        let file = if path.is_dir() {
            path.join(MODEL_FILE)
        } else {
            path.to_path_buf()
        };
        let data = fs::read_to_string(&file).map_err(|e| {
            Error::model_load(format!("cannot read {}: {e}", file.display()))
        })?;
        let model: Self = serde_json::from_str(&data)?;
        log::info!(
            "Loaded trained model from {} ({} labels, {} surface forms)",
            file.display(),
            model.labels.len(),
            model.lexicon.len()
        );
        Ok(model)
    }

    /// Persist the model into a directory, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let file = dir.join(MODEL_FILE);
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&file, data)?;
        log::info!("Saved trained model to {}", file.display());
        Ok(())
    }
}

impl NerModel for TrainedNerModel {
    fn tag(&self, text: &str) -> Result<Vec<RawEntity>> {
        let words = word_spans(text);
        let mut entities = Vec::new();
        let mut i = 0;

        while i < words.len() {
            let mut matched = 0;
            let max_n = self.max_phrase_words.min(words.len() - i);
            // Longest match wins.
            for n in (1..=max_n).rev() {
                let start = words[i].0;
                let end = words[i + n - 1].1;
                let Some(surface) = text.get(start..end) else {
                    continue;
                };
                if let Some(label) = self.best_label(surface) {
                    entities.push(RawEntity::new(surface, start, end, label));
                    matched = n;
                    break;
                }
            }
            i += matched.max(1);
        }

        Ok(entities)
    }

    fn name(&self) -> &str {
        "trained-lexicon"
    }
}

/// Lowercase and collapse internal whitespace to single spaces.
fn normalize(surface: &str) -> String {
    surface
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Byte ranges of whitespace-separated words with surrounding punctuation
/// trimmed. Interior punctuation (hyphens, dots) is kept intact.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut offset = 0;

    for chunk in text.split_whitespace() {
        let found = text[offset..]
            .find(chunk)
            .map(|pos| offset + pos)
            .unwrap_or(offset);
        offset = found + chunk.len();

        let leading = chunk.len() - chunk.trim_start_matches(|c: char| !c.is_alphanumeric()).len();
        let trailing = chunk.len() - chunk.trim_end_matches(|c: char| !c.is_alphanumeric()).len();
        if leading + trailing >= chunk.len() {
            continue;
        }
        spans.push((found + leading, found + chunk.len() - trailing));
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_blank_model_tags_nothing() {
        let model = TrainedNerModel::blank();
        assert!(model.tag("John Smith visited Boston").unwrap().is_empty());
    }

    #[test]
    fn test_learn_and_tag_single_word() {
        let mut model = TrainedNerModel::blank();
        model.learn("Boston", "LOCATION", 1.0);
        let entities = model.tag("He moved to Boston last year").unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].tag, "LOCATION");
        assert_eq!(entities[0].text, "Boston");
        assert_eq!(entities[0].start, 12);
        assert_eq!(entities[0].end, 18);
    }

    #[test]
    fn test_tag_is_case_insensitive() {
        let mut model = TrainedNerModel::blank();
        model.learn("aspirin", "MEDICATION", 1.0);
        let entities = model.tag("Prescribed Aspirin daily").unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "Aspirin");
    }

    #[test]
    fn test_longest_phrase_wins() {
        let mut model = TrainedNerModel::blank();
        model.learn("John", "PERSON", 1.0);
        model.learn("John Smith", "PERSON", 1.0);
        let entities = model.tag("John Smith arrived").unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "John Smith");
    }

    #[test]
    fn test_weights_decide_label() {
        let mut model = TrainedNerModel::blank();
        model.learn("Amazon", "ORG", 1.0);
        model.learn("Amazon", "LOCATION", 3.0);
        assert_eq!(model.best_label("amazon"), Some("LOCATION"));
        model.learn("Amazon", "ORG", 5.0);
        assert_eq!(model.best_label("amazon"), Some("ORG"));
    }

    #[test]
    fn test_trailing_punctuation_trimmed() {
        let mut model = TrainedNerModel::blank();
        model.learn("Boston", "LOCATION", 1.0);
        let entities = model.tag("He lives in Boston.").unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "Boston");
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let mut model = TrainedNerModel::blank();
        model.learn("John Smith", "PERSON", 2.0);
        model.learn("Boston", "LOCATION", 1.0);
        model.save(dir.path()).unwrap();

        let loaded = TrainedNerModel::load(dir.path()).unwrap();
        assert_eq!(loaded.lexicon_size(), 2);
        assert_eq!(loaded.best_label("john smith"), Some("PERSON"));

        // Loading the JSON file directly works too.
        let direct = TrainedNerModel::load(&dir.path().join(MODEL_FILE)).unwrap();
        assert_eq!(direct.lexicon_size(), 2);
    }

    #[test]
    fn test_load_missing_path_errors() {
        let err = TrainedNerModel::load(Path::new("/nonexistent/model")).unwrap_err();
        assert!(err.to_string().contains("Model load failed"));
    }

    #[test]
    fn test_register_label_idempotent() {
        let mut model = TrainedNerModel::blank();
        model.register_label("PERSON");
        model.register_label("PERSON");
        assert_eq!(model.labels(), ["PERSON".to_string()]);
    }
}
