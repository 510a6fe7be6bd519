//! Active-learning loop tests: feedback in, promoted artifact out.
//!
//! These tests verify that:
//! - A pipeline run persists an artifact the detector can actually load
//! - Promotion plus reload switches the general model to the fine-tuned tier
//! - Failed runs leave no trace in the registry

use piisense::training::{
    DatasetRecord, EntityAnnotation, FeedbackRecord, FeedbackStore, MemoryDatasetStore,
    MemoryFeedbackStore, MemoryModelRegistry, ModelRegistry, RunStatus, TrainedNerModel,
    TrainingConfig, TrainingPipeline,
};
use piisense::{
    ConfidenceConfig, EntitySource, HybridEngine, Label, RegexDetector, StatisticalDetector,
};
use tempfile::tempdir;

fn correction(id: u64, text: &str, start: usize, end: usize, label: &str) -> FeedbackRecord {
    FeedbackRecord {
        id,
        text: text.to_string(),
        is_correct: false,
        corrected_entities: vec![EntityAnnotation::new(start, end, label)],
        incorporated_in_training: false,
    }
}

#[test]
fn pipeline_artifact_feeds_the_engine() {
    let feedback = MemoryFeedbackStore::new();
    let datasets = MemoryDatasetStore::new();
    let registry = MemoryModelRegistry::new();
    let dir = tempdir().unwrap();

    // "Zanthrox" is a name no built-in heuristic knows.
    // It sits at 11..19 in the text below.
    for id in 0..12 {
        feedback.add(correction(id, "Talked to  Zanthrox today", 11, 19, "PERSON"));
    }

    let config = TrainingConfig {
        epochs: 5,
        models_dir: dir.path().to_path_buf(),
        ..TrainingConfig::default()
    };
    let pipeline = TrainingPipeline::new(&feedback, &datasets, &registry, config);
    let run = pipeline.run();
    assert_eq!(run.status, RunStatus::Completed, "{:?}", run.error_message);

    let version = &registry.versions()[0];
    assert!(!version.is_active);

    // An operator wires the artifact into a new detector.
    let statistical = StatisticalDetector::with_artifact(version.artifact_path.clone());
    let engine = HybridEngine::with_detectors(
        Some(RegexDetector::new()),
        Some(statistical),
        ConfidenceConfig::default(),
    );

    let result = engine.classify("zanthrox called again", Some(&[Label::Pii]));
    let person = result
        .entities
        .iter()
        .find(|e| e.sublabel == "PERSON")
        .expect("fine-tuned model should recognize the learned name");
    assert_eq!(person.source, EntitySource::StatisticalGeneral);
    assert_eq!(person.text, "zanthrox");

    let stats = engine.statistics();
    assert_eq!(stats.general_model_tier.as_deref(), Some("general-fine-tuned"));
}

#[test]
fn reload_picks_up_a_newly_persisted_artifact() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("model_pending");

    // Artifact does not exist yet: detector falls back to the built-in tier.
    let detector = StatisticalDetector::with_artifact(artifact.clone());
    let _ = detector.classify("nothing notable", None);
    assert_eq!(detector.general_tier(), Some("general-context"));

    // Persist a model, then reload.
    let mut model = TrainedNerModel::blank();
    model.learn("Zanthrox", "PERSON", 1.0);
    model.save(&artifact).unwrap();
    detector.reload();

    let entities = detector.classify("met Zanthrox", Some(&[Label::Pii]));
    assert!(entities.iter().any(|e| e.sublabel == "PERSON"));
    assert_eq!(detector.general_tier(), Some("general-fine-tuned"));
}

#[test]
fn failed_run_registers_nothing_and_keeps_feedback_pending() {
    let feedback = MemoryFeedbackStore::new();
    let datasets = MemoryDatasetStore::new();
    let registry = MemoryModelRegistry::new();
    let dir = tempdir().unwrap();

    feedback.add(correction(1, "Talked to Zanthrox", 10, 18, "PERSON"));

    let config = TrainingConfig {
        models_dir: dir.path().to_path_buf(),
        ..TrainingConfig::default()
    };
    let pipeline = TrainingPipeline::new(&feedback, &datasets, &registry, config);
    let run = pipeline.run();

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .error_message
        .as_deref()
        .unwrap()
        .contains("insufficient training data"));
    assert_eq!(registry.count().unwrap(), 0);
    assert_eq!(feedback.unincorporated_incorrect().unwrap().len(), 1);
    // The models directory stays empty.
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn second_run_resumes_from_the_promoted_artifact() {
    let feedback = MemoryFeedbackStore::new();
    let datasets = MemoryDatasetStore::new();
    let registry = MemoryModelRegistry::new();
    let dir = tempdir().unwrap();

    for id in 0..10 {
        feedback.add(correction(id, "Talked to  Zanthrox today", 11, 19, "PERSON"));
    }
    let config = TrainingConfig {
        epochs: 3,
        models_dir: dir.path().to_path_buf(),
        ..TrainingConfig::default()
    };
    let pipeline = TrainingPipeline::new(&feedback, &datasets, &registry, config.clone());
    let first = pipeline.run();
    assert_eq!(first.status, RunStatus::Completed, "{:?}", first.error_message);
    registry.promote(&first.model_version.clone().unwrap()).unwrap();

    // New corrections for a different name.
    for id in 100..110 {
        datasets.add(DatasetRecord {
            id,
            text: "Visited  Qorvath yesterday".to_string(),
            entities: vec![EntityAnnotation::new(9, 16, "LOCATION")],
            verified: true,
            usage_count: 0,
        });
    }
    let second = TrainingPipeline::new(&feedback, &datasets, &registry, config).run();
    assert_eq!(second.status, RunStatus::Completed, "{:?}", second.error_message);

    // The second artifact knows both: it resumed from the first.
    let version = registry
        .versions()
        .into_iter()
        .find(|v| Some(v.id.clone()) == second.model_version)
        .unwrap();
    let model = TrainedNerModel::load(&version.artifact_path).unwrap();
    assert_eq!(model.best_label("zanthrox"), Some("PERSON"));
    assert_eq!(model.best_label("qorvath"), Some("LOCATION"));
    assert_eq!(version.version, "v2");
}
