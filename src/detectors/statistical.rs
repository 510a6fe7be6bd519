//! Statistical detector - context-aware NER with synthesized confidence.
//!
//! Wraps two independently loaded models behind explicit [`ModelHandle`]s:
//!
//! - a **general** model for PII/Financial-type entities, tried in tier
//!   order (fine-tuned artifact first, built-in heuristic tagger as the
//!   fallback), and
//! - an optional **domain** (medical) model for PHI entities.
//!
//! Each handle loads at most once per process and is safe for concurrent
//! read-only inference afterwards. A handle whose candidates all fail is in
//! a disabled state: the detector logs a warning and contributes zero
//! entities, it never raises.
//!
//! Native model tags are mapped to the `(label, sublabel)` vocabulary via
//! fixed lookup tables; tags absent from the table are dropped. The models
//! do not provide confidence natively, so it is synthesized by
//! [`heuristic_confidence`] - a deterministic pure function the merge
//! thresholds are calibrated against.

use crate::entity::{Entity, EntitySource, Label, Metadata};
use crate::error::Result;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

// =============================================================================
// Model abstraction
// =============================================================================

/// A raw entity in a model's native tag vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntity {
    /// Surface text.
    pub text: String,
    /// Start byte offset.
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
    /// Native tag (PERSON, ORG, DISEASE, ...).
    pub tag: String,
}

impl RawEntity {
    /// Create a raw entity.
    pub fn new(text: impl Into<String>, start: usize, end: usize, tag: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            tag: tag.into(),
        }
    }
}

/// An entity-recognition model producing native-tagged spans.
pub trait NerModel: Send + Sync {
    /// Tag entities in the text.
    fn tag(&self, text: &str) -> Result<Vec<RawEntity>>;

    /// Model identifier for logs and statistics.
    fn name(&self) -> &str;
}

// =============================================================================
// Tiered, lazily loaded model handle
// =============================================================================

/// One loadable model candidate in a handle's tier order.
pub struct ModelCandidate {
    /// Tier name recorded when this candidate loads.
    pub tier: &'static str,
    loader: Box<dyn Fn() -> Result<Arc<dyn NerModel>> + Send + Sync>,
}

impl ModelCandidate {
    /// Create a candidate from a loader closure.
    pub fn new(
        tier: &'static str,
        loader: impl Fn() -> Result<Arc<dyn NerModel>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            tier,
            loader: Box::new(loader),
        }
    }
}

enum LoadState {
    Unloaded,
    Loaded {
        model: Arc<dyn NerModel>,
        tier: &'static str,
    },
    Unavailable,
}

/// Explicitly owned handle to a lazily loaded model.
///
/// Loading is attempted at most once: candidates are tried in order and the
/// first success wins, with the winning tier recorded for observability.
/// If every candidate fails the handle settles into a disabled state rather
/// than erroring. [`ModelHandle::reload`] clears the slot so a newly
/// promoted artifact can be picked up on the next use.
pub struct ModelHandle {
    state: RwLock<LoadState>,
    candidates: Vec<ModelCandidate>,
}

impl ModelHandle {
    /// Create a handle over an ordered candidate list.
    #[must_use]
    pub fn new(candidates: Vec<ModelCandidate>) -> Self {
        Self {
            state: RwLock::new(LoadState::Unloaded),
            candidates,
        }
    }

    /// Create a handle that is already loaded (model injection).
    #[must_use]
    pub fn preloaded(model: Arc<dyn NerModel>, tier: &'static str) -> Self {
        Self {
            state: RwLock::new(LoadState::Loaded { model, tier }),
            candidates: Vec::new(),
        }
    }

    /// Create a permanently disabled handle.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            state: RwLock::new(LoadState::Unavailable),
            candidates: Vec::new(),
        }
    }

    /// Get the model, loading it on first use.
    ///
    /// Returns `None` when no candidate could load.
    pub fn get(&self) -> Option<(Arc<dyn NerModel>, &'static str)> {
        {
            // Fast path: already resolved.
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            match &*state {
                LoadState::Loaded { model, tier } => return Some((Arc::clone(model), *tier)),
                LoadState::Unavailable => return None,
                LoadState::Unloaded => {}
            }
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        // Another thread may have resolved the slot while we waited.
        match &*state {
            LoadState::Loaded { model, tier } => return Some((Arc::clone(model), *tier)),
            LoadState::Unavailable => return None,
            LoadState::Unloaded => {}
        }

        for candidate in &self.candidates {
            match (candidate.loader)() {
                Ok(model) => {
                    log::info!("Loaded {} model (tier: {})", model.name(), candidate.tier);
                    let tier = candidate.tier;
                    *state = LoadState::Loaded {
                        model: Arc::clone(&model),
                        tier,
                    };
                    return Some((model, tier));
                }
                Err(e) => {
                    log::warn!("Model candidate '{}' failed to load: {e}", candidate.tier);
                }
            }
        }

        log::warn!("No model candidate available; handle disabled");
        *state = LoadState::Unavailable;
        None
    }

    /// Tier of the currently loaded model, if any. Does not force a load.
    #[must_use]
    pub fn loaded_tier(&self) -> Option<&'static str> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        match &*state {
            LoadState::Loaded { tier, .. } => Some(*tier),
            _ => None,
        }
    }

    /// Whether a model is currently loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded_tier().is_some()
    }

    /// Clear the slot so the next use re-runs the candidate search.
    ///
    /// Operator-triggered: used after a new model version is promoted.
    pub fn reload(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if self.candidates.is_empty() {
            // A preloaded or disabled handle has nothing to search.
            return;
        }
        *state = LoadState::Unloaded;
    }
}

// =============================================================================
// Native tag -> (label, sublabel) mapping
// =============================================================================

/// Map a general model's native tag to the classification vocabulary.
///
/// Tags absent from this table are dropped.
#[must_use]
pub fn general_tag_map(tag: &str) -> Option<(Label, &'static str)> {
    match tag {
        "PERSON" => Some((Label::Pii, "PERSON")),
        "ORG" => Some((Label::Pii, "ORGANIZATION")),
        "GPE" | "LOC" => Some((Label::Pii, "LOCATION")),
        "DATE" => Some((Label::Pii, "DATE")),
        "TIME" => Some((Label::Pii, "TIME")),
        "MONEY" => Some((Label::Financial, "MONEY")),
        "CARDINAL" => Some((Label::Pii, "NUMBER")),
        "PERCENT" => Some((Label::Financial, "PERCENT")),
        _ => None,
    }
}

/// Map a domain (medical) model's native tag to the classification vocabulary.
#[must_use]
pub fn domain_tag_map(tag: &str) -> Option<(Label, &'static str)> {
    match tag {
        "DISEASE" => Some((Label::Phi, "DISEASE")),
        "CHEMICAL" => Some((Label::Phi, "MEDICATION")),
        "SYMPTOM" => Some((Label::Phi, "SYMPTOM")),
        "PROCEDURE" => Some((Label::Phi, "PROCEDURE")),
        _ => None,
    }
}

// =============================================================================
// Confidence synthesis
// =============================================================================

/// Synthesize a confidence score for a statistical entity.
///
/// The models do not expose calibrated probabilities, so confidence is a
/// deterministic function of the surface form: 0.85 base, +0.05 for texts
/// longer than 10 chars, +0.03 for an uppercase first char, -0.10 for texts
/// shorter than 3 chars, clamped to [0.60, 0.95].
#[must_use]
pub fn heuristic_confidence(text: &str) -> f64 {
    let mut confidence: f64 = 0.85;
    let chars = text.chars().count();

    if chars > 10 {
        confidence += 0.05;
    }
    if text.chars().next().is_some_and(char::is_uppercase) {
        confidence += 0.03;
    }
    if chars < 3 {
        confidence -= 0.10;
    }

    confidence.clamp(0.60, 0.95)
}

// =============================================================================
// Statistical detector
// =============================================================================

/// Context-aware detector over a general and an optional domain model.
pub struct StatisticalDetector {
    general: ModelHandle,
    domain: ModelHandle,
}

impl StatisticalDetector {
    /// Create a detector with the built-in models only.
    #[must_use]
    pub fn new() -> Self {
        Self {
            general: ModelHandle::new(vec![context_candidate()]),
            domain: ModelHandle::new(vec![medical_candidate()]),
        }
    }

    /// Create a detector that tries a fine-tuned artifact before the
    /// built-in general model.
    #[must_use]
    pub fn with_artifact(artifact_path: PathBuf) -> Self {
        Self {
            general: ModelHandle::new(vec![trained_candidate(artifact_path), context_candidate()]),
            domain: ModelHandle::new(vec![medical_candidate()]),
        }
    }

    /// Create a detector from explicit model handles.
    #[must_use]
    pub fn with_handles(general: ModelHandle, domain: ModelHandle) -> Self {
        Self { general, domain }
    }

    /// Detect entities using the loaded models.
    ///
    /// PII/Financial-type requests route to the general model; PHI requests
    /// route to the domain model when loaded. A model failure is isolated:
    /// it is logged and that sub-detector contributes zero entities.
    #[must_use]
    pub fn classify(&self, text: &str, requested_types: Option<&[Label]>) -> Vec<Entity> {
        let wants =
            |label: Label| requested_types.map_or(true, |types| types.contains(&label));

        let mut entities = Vec::new();

        if wants(Label::Pii) || wants(Label::Financial) {
            entities.extend(self.run_model(
                &self.general,
                text,
                general_tag_map,
                EntitySource::StatisticalGeneral,
            ));
        }

        if wants(Label::Phi) {
            entities.extend(self.run_model(
                &self.domain,
                text,
                domain_tag_map,
                EntitySource::StatisticalDomain,
            ));
        }

        entities
    }

    fn run_model(
        &self,
        handle: &ModelHandle,
        text: &str,
        tag_map: fn(&str) -> Option<(Label, &'static str)>,
        source: EntitySource,
    ) -> Vec<Entity> {
        let Some((model, tier)) = handle.get() else {
            return Vec::new();
        };

        let raw = match model.tag(text) {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("Error in {} model: {e}", model.name());
                return Vec::new();
            }
        };

        let mut entities = Vec::new();
        for r in raw {
            let Some((label, sublabel)) = tag_map(&r.tag) else {
                continue;
            };
            let confidence = heuristic_confidence(&r.text);
            match Entity::new(r.text, r.start, r.end, label, sublabel, confidence, source) {
                Ok(entity) => {
                    let mut metadata = Metadata::new();
                    metadata.insert("model_tag".to_string(), serde_json::Value::String(r.tag));
                    metadata.insert(
                        "model_tier".to_string(),
                        serde_json::Value::String(tier.to_string()),
                    );
                    entities.push(entity.with_metadata(metadata));
                }
                Err(e) => {
                    // A model returning a degenerate span is an inference
                    // fault; drop the span, keep the rest.
                    log::error!("Dropping invalid span from {}: {e}", model.name());
                }
            }
        }
        entities
    }

    /// Whether the general model is loaded.
    #[must_use]
    pub fn general_loaded(&self) -> bool {
        self.general.is_loaded()
    }

    /// Whether the domain model is loaded.
    #[must_use]
    pub fn domain_loaded(&self) -> bool {
        self.domain.is_loaded()
    }

    /// Tier of the loaded general model, if any.
    #[must_use]
    pub fn general_tier(&self) -> Option<&'static str> {
        self.general.loaded_tier()
    }

    /// Tier of the loaded domain model, if any.
    #[must_use]
    pub fn domain_tier(&self) -> Option<&'static str> {
        self.domain.loaded_tier()
    }

    /// Clear both handles so newly promoted artifacts are picked up.
    pub fn reload(&self) {
        self.general.reload();
        self.domain.reload();
    }
}

impl Default for StatisticalDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn context_candidate() -> ModelCandidate {
    ModelCandidate::new("general-context", || {
        Ok(Arc::new(ContextNerModel::new()) as Arc<dyn NerModel>)
    })
}

fn medical_candidate() -> ModelCandidate {
    ModelCandidate::new("domain-medical", || {
        Ok(Arc::new(MedicalNerModel::new()) as Arc<dyn NerModel>)
    })
}

fn trained_candidate(path: PathBuf) -> ModelCandidate {
    ModelCandidate::new("general-fine-tuned", move || {
        let model = crate::training::TrainedNerModel::load(&path)?;
        Ok(Arc::new(model) as Arc<dyn NerModel>)
    })
}

// =============================================================================
// Built-in general model: capitalization + context heuristics
// =============================================================================

/// Words that signal a following person name.
const PERSON_PREFIXES: &[&str] = &[
    "mr", "mr.", "mrs", "mrs.", "ms", "ms.", "dr", "dr.", "prof", "prof.", "president", "ceo",
    "director", "judge", "professor", "nurse", "officer", "coach", "by", "said", "told",
    "according",
];

/// Verbs that signal a preceding person name.
const PERSON_SUFFIXES: &[&str] = &[
    "said", "says", "told", "asked", "announced", "stated", "founded", "created", "leads", "led",
    "runs", "manages", "joined", "visited", "reported", "wrote",
];

/// Organization suffix tokens.
const ORG_SUFFIXES: &[&str] = &[
    "inc", "inc.", "corp", "corp.", "corporation", "co", "co.", "ltd", "ltd.", "llc", "llp",
    "plc", "gmbh", "company", "group", "holdings", "foundation", "institute", "university",
    "college", "hospital", "clinic", "bank", "labs", "technologies", "systems", "solutions",
    "services", "industries",
];

/// Prepositions that signal a following location.
const LOC_PREFIXES: &[&str] = &[
    "in", "at", "from", "near", "outside", "based", "located", "headquartered", "born", "lived",
    "lives", "visited", "moved",
];

/// Common first names (strong person signal for multi-word candidates).
const COMMON_FIRST_NAMES: &[&str] = &[
    "james", "john", "robert", "michael", "william", "david", "richard", "joseph", "thomas",
    "charles", "mary", "patricia", "jennifer", "linda", "elizabeth", "barbara", "susan",
    "jessica", "sarah", "karen", "steve", "mark", "paul", "peter", "george", "daniel", "matthew",
    "andrew", "brian", "chris", "eric", "frank", "jack", "jane", "kevin", "laura", "lisa",
    "maria", "nancy", "rachel", "samantha", "scott", "sean", "stephen", "tom", "anna", "emily",
    "emma", "julia", "kate",
];

/// Capitalized words that are not entity candidates.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "if", "then", "this", "that", "these", "those", "it",
    "he", "she", "they", "we", "you", "i", "his", "her", "their", "our", "my", "your", "contact",
    "dear", "hello", "regards", "thanks", "please", "monday", "tuesday", "wednesday", "thursday",
    "friday", "saturday", "sunday", "january", "february", "march", "april", "may", "june",
    "july", "august", "september", "october", "november", "december",
];

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

/// Built-in heuristic general NER model.
///
/// Identifies capitalized token runs and classifies them from context cues
/// (titles, org suffixes, location prepositions, first-name list). Lower
/// recall than a fine-tuned model; used as the always-available fallback
/// tier.
pub struct ContextNerModel;

impl ContextNerModel {
    /// Create the built-in general model.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn classify_run(tokens: &[Token<'_>], run: &[usize], prev: Option<&str>, next: Option<&str>) -> Option<&'static str> {
        let first = tokens[run[0]].text.to_lowercase();
        let last = tokens[*run.last()?].text.to_lowercase();

        if ORG_SUFFIXES.contains(&last.as_str()) {
            return Some("ORG");
        }
        if let Some(prev) = prev {
            if PERSON_PREFIXES.contains(&prev) {
                return Some("PERSON");
            }
            if LOC_PREFIXES.contains(&prev) {
                return Some("GPE");
            }
        }
        if let Some(next) = next {
            if PERSON_SUFFIXES.contains(&next) {
                return Some("PERSON");
            }
        }
        if COMMON_FIRST_NAMES.contains(&first.as_str()) {
            return Some("PERSON");
        }
        // Multi-word capitalized run with no other cue reads as an org name.
        if run.len() >= 2 {
            return Some("ORG");
        }
        None
    }
}

impl Default for ContextNerModel {
    fn default() -> Self {
        Self::new()
    }
}

impl NerModel for ContextNerModel {
    fn tag(&self, text: &str) -> Result<Vec<RawEntity>> {
        let tokens = tokenize(text);
        let mut entities = Vec::new();

        let is_candidate = |t: &Token<'_>| {
            let lower = t.text.to_lowercase();
            t.text.chars().next().is_some_and(char::is_uppercase)
                && !STOP_WORDS.contains(&lower.as_str())
                // Titles like "Dr" act as context, not as part of the name.
                && !PERSON_PREFIXES.contains(&lower.as_str())
        };

        let mut i = 0;
        while i < tokens.len() {
            if !is_candidate(&tokens[i]) {
                i += 1;
                continue;
            }

            let mut run = vec![i];
            let mut j = i + 1;
            while j < tokens.len() && is_candidate(&tokens[j]) {
                run.push(j);
                j += 1;
            }

            let prev = i.checked_sub(1).map(|p| tokens[p].text.to_lowercase());
            let next = tokens.get(j).map(|t| t.text.to_lowercase());

            if let Some(tag) =
                Self::classify_run(&tokens, &run, prev.as_deref(), next.as_deref())
            {
                let start = tokens[run[0]].start;
                let end = tokens[*run.last().unwrap_or(&i)].end;
                entities.push(RawEntity::new(&text[start..end], start, end, tag));
            }

            i = j;
        }

        Ok(entities)
    }

    fn name(&self) -> &str {
        "context-heuristic"
    }
}

/// Split text into words, trimming surrounding punctuation.
fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut offset = 0;

    for chunk in text.split_whitespace() {
        // split_whitespace loses offsets; recover them by searching forward.
        let found = text[offset..]
            .find(chunk)
            .map(|pos| offset + pos)
            .unwrap_or(offset);
        let chunk_start = found;
        offset = chunk_start + chunk.len();

        let trimmed_front = chunk.trim_start_matches(|c: char| !c.is_alphanumeric());
        let front_cut = chunk.len() - trimmed_front.len();
        let trimmed = trimmed_front.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '.');
        // Keep a trailing '.' only for abbreviation-like tokens ("Inc.").
        let trimmed = if trimmed.ends_with('.') && trimmed.chars().filter(|c| *c == '.').count() > 1
        {
            trimmed
        } else {
            trimmed.trim_end_matches('.')
        };

        if trimmed.is_empty() {
            continue;
        }
        let start = chunk_start + front_cut;
        tokens.push(Token {
            text: trimmed,
            start,
            end: start + trimmed.len(),
        });
    }

    tokens
}

// =============================================================================
// Built-in domain model: medical gazetteer
// =============================================================================

/// Gazetteer terms: `(term, tag)`. Multi-word terms match first.
const MEDICAL_TERMS: &[(&str, &str)] = &[
    ("shortness of breath", "SYMPTOM"),
    ("bypass surgery", "PROCEDURE"),
    ("chest pain", "SYMPTOM"),
    ("type 2 diabetes", "DISEASE"),
    ("diabetes", "DISEASE"),
    ("hypertension", "DISEASE"),
    ("asthma", "DISEASE"),
    ("cancer", "DISEASE"),
    ("melanoma", "DISEASE"),
    ("leukemia", "DISEASE"),
    ("influenza", "DISEASE"),
    ("pneumonia", "DISEASE"),
    ("hepatitis", "DISEASE"),
    ("arthritis", "DISEASE"),
    ("depression", "DISEASE"),
    ("migraine", "DISEASE"),
    ("ibuprofen", "CHEMICAL"),
    ("metformin", "CHEMICAL"),
    ("lisinopril", "CHEMICAL"),
    ("insulin", "CHEMICAL"),
    ("aspirin", "CHEMICAL"),
    ("atorvastatin", "CHEMICAL"),
    ("amoxicillin", "CHEMICAL"),
    ("penicillin", "CHEMICAL"),
    ("warfarin", "CHEMICAL"),
    ("prednisone", "CHEMICAL"),
    ("fever", "SYMPTOM"),
    ("nausea", "SYMPTOM"),
    ("fatigue", "SYMPTOM"),
    ("cough", "SYMPTOM"),
    ("headache", "SYMPTOM"),
    ("dizziness", "SYMPTOM"),
    ("rash", "SYMPTOM"),
    ("vomiting", "SYMPTOM"),
    ("biopsy", "PROCEDURE"),
    ("colonoscopy", "PROCEDURE"),
    ("chemotherapy", "PROCEDURE"),
    ("dialysis", "PROCEDURE"),
    ("angioplasty", "PROCEDURE"),
    ("appendectomy", "PROCEDURE"),
    ("vaccination", "PROCEDURE"),
];

/// Built-in domain (medical) NER model backed by a term gazetteer.
pub struct MedicalNerModel;

impl MedicalNerModel {
    /// Create the built-in medical model.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for MedicalNerModel {
    fn default() -> Self {
        Self::new()
    }
}

impl NerModel for MedicalNerModel {
    fn tag(&self, text: &str) -> Result<Vec<RawEntity>> {
        let lower = text.to_lowercase();
        let mut entities: Vec<RawEntity> = Vec::new();

        for (term, tag) in MEDICAL_TERMS {
            let mut search_from = 0;
            while let Some(pos) = lower[search_from..].find(term) {
                let start = search_from + pos;
                let end = start + term.len();
                search_from = end;

                if !word_bounded(&lower, start, end) {
                    continue;
                }
                let overlaps = entities.iter().any(|e| !(end <= e.start || start >= e.end));
                if overlaps {
                    continue;
                }
                // Lowercasing can shift byte offsets for non-ASCII text;
                // skip any span that no longer lands on a boundary.
                let Some(surface) = text.get(start..end) else {
                    continue;
                };
                entities.push(RawEntity::new(surface, start, end, *tag));
            }
        }

        entities.sort_by_key(|e| e.start);
        Ok(entities)
    }

    fn name(&self) -> &str {
        "medical-gazetteer"
    }
}

fn word_bounded(text: &str, start: usize, end: usize) -> bool {
    let before_ok = start == 0
        || text[..start]
            .chars()
            .next_back()
            .is_some_and(|c| !c.is_alphanumeric());
    let after_ok = end == text.len()
        || text[end..].chars().next().is_some_and(|c| !c.is_alphanumeric());
    before_ok && after_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_confidence_constants() {
        // Base + uppercase boost.
        assert!((heuristic_confidence("John") - 0.88).abs() < 1e-9);
        // Base only (lowercase, mid length).
        assert!((heuristic_confidence("john") - 0.85).abs() < 1e-9);
        // Long + uppercase: 0.85 + 0.05 + 0.03 = 0.93.
        assert!((heuristic_confidence("Johnathan Doe") - 0.93).abs() < 1e-9);
        // Short lowercase: 0.85 - 0.10 = 0.75.
        assert!((heuristic_confidence("ab") - 0.75).abs() < 1e-9);
        // Clamp floor.
        assert!(heuristic_confidence("a") >= 0.60);
        // Clamp ceiling: 0.85 + 0.05 + 0.03 = 0.93 < 0.95, never exceeds.
        assert!(heuristic_confidence("A Very Long Entity Name") <= 0.95);
    }

    #[test]
    fn test_general_tag_map() {
        assert_eq!(general_tag_map("PERSON"), Some((Label::Pii, "PERSON")));
        assert_eq!(general_tag_map("MONEY"), Some((Label::Financial, "MONEY")));
        assert_eq!(general_tag_map("GPE"), Some((Label::Pii, "LOCATION")));
        assert_eq!(general_tag_map("LOC"), Some((Label::Pii, "LOCATION")));
        assert_eq!(general_tag_map("WORK_OF_ART"), None);
    }

    #[test]
    fn test_domain_tag_map() {
        assert_eq!(domain_tag_map("DISEASE"), Some((Label::Phi, "DISEASE")));
        assert_eq!(domain_tag_map("CHEMICAL"), Some((Label::Phi, "MEDICATION")));
        assert_eq!(domain_tag_map("UNMAPPED"), None);
    }

    #[test]
    fn test_context_model_person() {
        let model = ContextNerModel::new();
        let entities = model.tag("Dr. Smith said the results look fine.").unwrap();
        assert!(entities.iter().any(|e| e.tag == "PERSON" && e.text == "Smith"));
    }

    #[test]
    fn test_context_model_org_suffix() {
        let model = ContextNerModel::new();
        let entities = model.tag("She works for Acme Corp in the city.").unwrap();
        assert!(entities.iter().any(|e| e.tag == "ORG" && e.text.contains("Acme")));
    }

    #[test]
    fn test_context_model_location() {
        let model = ContextNerModel::new();
        let entities = model.tag("He lives in Boston with family.").unwrap();
        assert!(entities.iter().any(|e| e.tag == "GPE" && e.text == "Boston"));
    }

    #[test]
    fn test_context_model_first_name() {
        let model = ContextNerModel::new();
        let entities = model.tag("John Smith filed the report.").unwrap();
        let person = entities.iter().find(|e| e.tag == "PERSON").unwrap();
        assert_eq!(person.text, "John Smith");
        assert_eq!(person.start, 0);
        assert_eq!(person.end, 10);
    }

    #[test]
    fn test_context_model_offsets() {
        let model = ContextNerModel::new();
        let text = "Ask Dr. Jones about it.";
        let entities = model.tag(text).unwrap();
        let person = entities.iter().find(|e| e.tag == "PERSON").unwrap();
        assert_eq!(&text[person.start..person.end], person.text);
    }

    #[test]
    fn test_medical_model_terms() {
        let model = MedicalNerModel::new();
        let text = "Patient has diabetes, takes Metformin, reports chest pain.";
        let entities = model.tag(text).unwrap();

        assert!(entities.iter().any(|e| e.tag == "DISEASE" && e.text == "diabetes"));
        assert!(entities.iter().any(|e| e.tag == "CHEMICAL" && e.text == "Metformin"));
        assert!(entities.iter().any(|e| e.tag == "SYMPTOM" && e.text == "chest pain"));
        // Sorted by position, offsets index the original text.
        for pair in entities.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
        for e in &entities {
            assert_eq!(&text[e.start..e.end], e.text);
        }
    }

    #[test]
    fn test_medical_model_word_boundaries() {
        let model = MedicalNerModel::new();
        // "rash" inside "crashed" must not match.
        let entities = model.tag("The server crashed overnight.").unwrap();
        assert!(entities.is_empty());
    }

    #[test]
    fn test_detector_routes_phi_to_domain() {
        let detector = StatisticalDetector::new();
        let entities = detector.classify("Diagnosed with hypertension last year.", Some(&[Label::Phi]));
        assert!(entities.iter().all(|e| e.source == EntitySource::StatisticalDomain));
        assert!(entities.iter().any(|e| e.sublabel == "DISEASE"));
    }

    #[test]
    fn test_detector_pii_does_not_run_domain() {
        let detector = StatisticalDetector::new();
        let entities = detector.classify("Diagnosed with hypertension last year.", Some(&[Label::Pii]));
        assert!(entities.iter().all(|e| e.source != EntitySource::StatisticalDomain));
    }

    #[test]
    fn test_detector_synthesized_confidence_bounds() {
        let detector = StatisticalDetector::new();
        let entities = detector.classify("John Smith met Dr. Jones in Boston.", None);
        assert!(!entities.is_empty());
        for e in &entities {
            assert!(e.confidence >= 0.60 && e.confidence <= 0.95);
        }
    }

    #[test]
    fn test_disabled_handle_yields_empty() {
        let detector =
            StatisticalDetector::with_handles(ModelHandle::disabled(), ModelHandle::disabled());
        let entities = detector.classify("John Smith has diabetes.", None);
        assert!(entities.is_empty());
        assert!(!detector.general_loaded());
    }

    #[test]
    fn test_all_candidates_fail_disables_handle() {
        let failing = ModelHandle::new(vec![ModelCandidate::new("broken", || {
            Err(crate::error::Error::model_load("missing artifact"))
        })]);
        let detector = StatisticalDetector::with_handles(failing, ModelHandle::disabled());
        // Never raises; degrades to zero entities.
        assert!(detector.classify("John Smith", None).is_empty());
        assert!(!detector.general_loaded());
        // Second call hits the resolved Unavailable state.
        assert!(detector.classify("John Smith", None).is_empty());
    }

    #[test]
    fn test_tier_recorded_on_load() {
        let detector = StatisticalDetector::new();
        assert_eq!(detector.general_tier(), None);
        let _ = detector.classify("John Smith said hello.", Some(&[Label::Pii]));
        assert_eq!(detector.general_tier(), Some("general-context"));
    }

    #[test]
    fn test_tier_fallback_order() {
        let handle = ModelHandle::new(vec![
            ModelCandidate::new("primary", || Err(crate::error::Error::model_load("nope"))),
            ModelCandidate::new("fallback", || {
                Ok(Arc::new(ContextNerModel::new()) as Arc<dyn NerModel>)
            }),
        ]);
        let (_, tier) = handle.get().unwrap();
        assert_eq!(tier, "fallback");
        assert_eq!(handle.loaded_tier(), Some("fallback"));
    }

    #[test]
    fn test_reload_clears_slot() {
        let handle = ModelHandle::new(vec![ModelCandidate::new("general-context", || {
            Ok(Arc::new(ContextNerModel::new()) as Arc<dyn NerModel>)
        })]);
        assert!(handle.get().is_some());
        assert!(handle.is_loaded());
        handle.reload();
        assert!(!handle.is_loaded());
        assert!(handle.get().is_some());
    }
}
