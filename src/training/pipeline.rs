//! Active-learning training pipeline.
//!
//! Pulls unincorporated incorrect feedback and verified dataset records,
//! fine-tunes a [`TrainedNerModel`], evaluates it on a held-out split,
//! persists the artifact and registers an inactive model version.
//! Activation is a separate operator decision, never automatic.
//!
//! Each run is a strict step chain; any failure produces a
//! [`RunStatus::Failed`] run carrying the error message. The pipeline never
//! panics and performs no rollback: partially written artifacts of a failed
//! run are simply never registered.

use crate::error::{Error, Result};
use crate::training::data::{
    self, DatasetStore, FeedbackStore, TrainingExample,
};
use crate::training::metrics::{self, EvalMetrics};
use crate::training::model::TrainedNerModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Lifecycle of a training run. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, not yet started.
    Queued,
    /// Currently executing.
    Running,
    /// Finished: artifact persisted and version registered.
    Completed,
    /// Finished with an error; see `error_message`.
    Failed,
}

/// Training hyperparameters and paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Minimum combined sample count; runs fail fast below this.
    pub min_samples: usize,
    /// Fraction of samples held out for evaluation.
    pub test_split: f64,
    /// Training epochs.
    pub epochs: usize,
    /// Minibatch size.
    pub batch_size: usize,
    /// Shuffle seed; identical inputs and seed give identical runs.
    pub seed: u64,
    /// Directory receiving `model_{run_id}/` artifacts.
    pub models_dir: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            test_split: 0.2,
            epochs: 30,
            batch_size: 8,
            seed: 42,
            models_dir: PathBuf::from("models"),
        }
    }
}

impl TrainingConfig {
    /// Validate hyperparameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.test_split) {
            return Err(Error::invalid_config(format!(
                "test_split must be in [0, 1), got {}",
                self.test_split
            )));
        }
        if self.epochs == 0 {
            return Err(Error::invalid_config("epochs must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::invalid_config("batch_size must be at least 1"));
        }
        Ok(())
    }
}

/// Aggregate loss statistics from the fine-tuning loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainMetrics {
    /// Epochs executed.
    pub epochs: usize,
    /// Loss of the final epoch.
    pub final_loss: f64,
    /// Mean loss across epochs.
    pub average_loss: f64,
    /// Number of training examples.
    pub training_samples: usize,
}

/// Record of one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRun {
    /// Run identifier, unique within the process.
    pub id: String,
    /// Current status.
    pub status: RunStatus,
    /// Configuration the run executed with.
    pub config: TrainingConfig,
    /// Combined sample count gathered before the split.
    pub sample_count: usize,
    /// Loss statistics, present after a completed fine-tune step.
    pub train_metrics: Option<TrainMetrics>,
    /// Held-out evaluation metrics, present on completion.
    pub eval_metrics: Option<EvalMetrics>,
    /// Identifier of the registered model version, present on completion.
    pub model_version: Option<String>,
    /// Failure reason, present when `status == Failed`.
    pub error_message: Option<String>,
    /// Run start time.
    pub started_at: DateTime<Utc>,
    /// Run end time, set on either terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

/// A persisted, versioned model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Version identifier (derived from the run id).
    pub id: String,
    /// Monotonic display version, `v1`, `v2`, ...
    pub version: String,
    /// Held-out evaluation metrics at registration time.
    pub metrics: EvalMetrics,
    /// Directory containing the serialized model.
    pub artifact_path: PathBuf,
    /// Whether this version serves inference. Registration always starts
    /// inactive; promotion is an explicit operator action.
    pub is_active: bool,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

/// Model version registry collaborator contract.
pub trait ModelRegistry: Send + Sync {
    /// Register a new version.
    fn register(&self, version: ModelVersion) -> Result<()>;

    /// The currently active version, if any.
    fn active(&self) -> Result<Option<ModelVersion>>;

    /// Number of registered versions.
    fn count(&self) -> Result<usize>;
}

/// In-memory model registry.
#[derive(Debug, Default)]
pub struct MemoryModelRegistry {
    versions: RwLock<Vec<ModelVersion>>,
}

impl MemoryModelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all versions.
    #[must_use]
    pub fn versions(&self) -> Vec<ModelVersion> {
        self.versions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Activate one version and deactivate the rest.
    pub fn promote(&self, id: &str) -> Result<()> {
        let mut versions = self.versions.write().unwrap_or_else(|e| e.into_inner());
        if !versions.iter().any(|v| v.id == id) {
            return Err(Error::store(format!("unknown model version: {id}")));
        }
        for version in versions.iter_mut() {
            version.is_active = version.id == id;
        }
        log::info!("Promoted model version {id}");
        Ok(())
    }
}

impl ModelRegistry for MemoryModelRegistry {
    fn register(&self, version: ModelVersion) -> Result<()> {
        self.versions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(version);
        Ok(())
    }

    fn active(&self) -> Result<Option<ModelVersion>> {
        Ok(self
            .versions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|v| v.is_active)
            .cloned())
    }

    fn count(&self) -> Result<usize> {
        Ok(self
            .versions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len())
    }
}

static RUN_COUNTER: AtomicU64 = AtomicU64::new(1);

/// The training pipeline, wired to its three collaborator stores.
pub struct TrainingPipeline<'a> {
    feedback: &'a dyn FeedbackStore,
    datasets: &'a dyn DatasetStore,
    registry: &'a dyn ModelRegistry,
    config: TrainingConfig,
}

impl<'a> TrainingPipeline<'a> {
    /// Create a pipeline over the given collaborators.
    pub fn new(
        feedback: &'a dyn FeedbackStore,
        datasets: &'a dyn DatasetStore,
        registry: &'a dyn ModelRegistry,
        config: TrainingConfig,
    ) -> Self {
        Self {
            feedback,
            datasets,
            registry,
            config,
        }
    }

    /// Execute one training run, blocking until it reaches a terminal
    /// status. Never panics; any step error yields a `Failed` run.
    pub fn run(&self) -> TrainingRun {
        let run_id = format!(
            "run-{}-{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            RUN_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let mut run = TrainingRun {
            id: run_id.clone(),
            status: RunStatus::Queued,
            config: self.config.clone(),
            sample_count: 0,
            train_metrics: None,
            eval_metrics: None,
            model_version: None,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        };

        run.status = RunStatus::Running;
        log::info!("Starting training run {run_id}");

        match self.execute(&run_id, &mut run) {
            Ok(()) => {
                run.status = RunStatus::Completed;
                log::info!("Training run {run_id} completed");
            }
            Err(e) => {
                run.status = RunStatus::Failed;
                run.error_message = Some(e.to_string());
                log::error!("Training run {run_id} failed: {e}");
            }
        }
        run.completed_at = Some(Utc::now());
        run
    }

    fn execute(&self, run_id: &str, run: &mut TrainingRun) -> Result<()> {
        self.config.validate()?;

        // Gather from both sources, tracking what was consumed.
        let feedback_records = self.feedback.unincorporated_incorrect()?;
        let feedback_ids: Vec<u64> = feedback_records.iter().map(|r| r.id).collect();
        let dataset_records = self.datasets.verified()?;
        let dataset_ids: Vec<u64> = dataset_records.iter().map(|r| r.id).collect();

        let mut examples = data::examples_from_feedback(&feedback_records);
        examples.extend(data::examples_from_dataset(&dataset_records));
        run.sample_count = examples.len();

        if examples.len() < self.config.min_samples {
            return Err(Error::training(format!(
                "insufficient training data: {} samples, need {}",
                examples.len(),
                self.config.min_samples
            )));
        }

        data::shuffle(&mut examples, self.config.seed);
        let split = ((examples.len() as f64) * (1.0 - self.config.test_split)) as usize;
        let split = split.clamp(1, examples.len());
        let (train, test) = examples.split_at(split);
        log::info!(
            "Gathered {} samples ({} train, {} test)",
            examples.len(),
            train.len(),
            test.len()
        );

        // Resume from the active artifact when one exists.
        let mut model = match self.registry.active()? {
            Some(active) => match TrainedNerModel::load(&active.artifact_path) {
                Ok(model) => model,
                Err(e) => {
                    log::warn!("Active artifact unreadable, starting from blank: {e}");
                    TrainedNerModel::blank()
                }
            },
            None => TrainedNerModel::blank(),
        };

        let train_metrics = fine_tune(&mut model, train, &self.config);
        run.train_metrics = Some(train_metrics);

        let eval = metrics::evaluate(&model, test);
        run.eval_metrics = Some(eval);

        let artifact_path = self.config.models_dir.join(format!("model_{run_id}"));
        model.save(&artifact_path)?;

        let version_id = format!("model-{run_id}");
        let version = ModelVersion {
            id: version_id.clone(),
            version: format!("v{}", self.registry.count()? + 1),
            metrics: eval,
            artifact_path,
            is_active: false,
            created_at: Utc::now(),
        };
        self.registry.register(version)?;
        run.model_version = Some(version_id);

        self.feedback.mark_incorporated(&feedback_ids)?;
        for id in dataset_ids {
            self.datasets.increment_usage(id)?;
        }

        Ok(())
    }
}

/// Epoch loop over shuffled minibatches.
///
/// Loss for an example is the count of missed gold spans plus spurious
/// predictions before the example's update is applied, so a memorizing
/// model drives the loss toward zero across epochs.
fn fine_tune(
    model: &mut TrainedNerModel,
    train: &[TrainingExample],
    config: &TrainingConfig,
) -> TrainMetrics {
    for example in train {
        for span in &example.spans {
            model.register_label(&span.label);
        }
    }

    let mut losses = Vec::with_capacity(config.epochs);
    let mut order: Vec<usize> = (0..train.len()).collect();

    for epoch in 0..config.epochs {
        data::shuffle(&mut order, config.seed.wrapping_add(epoch as u64));
        let mut epoch_loss = 0.0;

        for batch in order.chunks(config.batch_size) {
            for &idx in batch {
                let example = &train[idx];
                epoch_loss += example_loss(model, example);
                for span in &example.spans {
                    if let Some(surface) = example.text.get(span.start..span.end) {
                        model.learn(surface, &span.label, 1.0);
                    }
                }
            }
        }

        losses.push(epoch_loss);
        if epoch % 5 == 0 || epoch + 1 == config.epochs {
            log::debug!("Epoch {epoch}: loss {epoch_loss:.1}");
        }
    }

    let final_loss = losses.last().copied().unwrap_or(0.0);
    let average_loss = if losses.is_empty() {
        0.0
    } else {
        losses.iter().sum::<f64>() / losses.len() as f64
    };
    TrainMetrics {
        epochs: config.epochs,
        final_loss,
        average_loss,
        training_samples: train.len(),
    }
}

fn example_loss(model: &TrainedNerModel, example: &TrainingExample) -> f64 {
    use crate::detectors::statistical::NerModel;

    let predicted = model.tag(&example.text).unwrap_or_default();
    let missed = example
        .spans
        .iter()
        .filter(|gold| {
            !predicted
                .iter()
                .any(|p| p.start == gold.start && p.end == gold.end && p.tag == gold.label)
        })
        .count();
    let spurious = predicted
        .iter()
        .filter(|p| {
            !example
                .spans
                .iter()
                .any(|gold| gold.start == p.start && gold.end == p.end && gold.label == p.tag)
        })
        .count();
    (missed + spurious) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::data::{
        DatasetRecord, EntityAnnotation, FeedbackRecord, MemoryDatasetStore, MemoryFeedbackStore,
    };
    use tempfile::tempdir;

    fn feedback(id: u64, text: &str, start: usize, end: usize, label: &str) -> FeedbackRecord {
        FeedbackRecord {
            id,
            text: text.to_string(),
            is_correct: false,
            corrected_entities: vec![EntityAnnotation::new(start, end, label)],
            incorporated_in_training: false,
        }
    }

    fn seeded_stores(n: u64) -> (MemoryFeedbackStore, MemoryDatasetStore) {
        let feedback_store = MemoryFeedbackStore::new();
        let dataset_store = MemoryDatasetStore::new();
        // "Patient Carol has diabetes" — "Carol" at 8..13.
        for id in 0..n {
            feedback_store.add(feedback(id, "Patient Carol has diabetes", 8, 13, "PERSON"));
        }
        (feedback_store, dataset_store)
    }

    #[test]
    fn test_insufficient_data_fails_without_registering() {
        let (feedback_store, dataset_store) = seeded_stores(3);
        let registry = MemoryModelRegistry::new();
        let dir = tempdir().unwrap();
        let config = TrainingConfig {
            models_dir: dir.path().to_path_buf(),
            ..TrainingConfig::default()
        };

        let pipeline = TrainingPipeline::new(&feedback_store, &dataset_store, &registry, config);
        let run = pipeline.run();

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run
            .error_message
            .as_deref()
            .unwrap()
            .contains("insufficient training data"));
        assert_eq!(run.sample_count, 3);
        assert_eq!(registry.count().unwrap(), 0);
        // Feedback stays pending for the next attempt.
        assert_eq!(feedback_store.unincorporated_incorrect().unwrap().len(), 3);
    }

    #[test]
    fn test_successful_run_registers_inactive_version() {
        let (feedback_store, dataset_store) = seeded_stores(12);
        let registry = MemoryModelRegistry::new();
        let dir = tempdir().unwrap();
        let config = TrainingConfig {
            epochs: 5,
            models_dir: dir.path().to_path_buf(),
            ..TrainingConfig::default()
        };

        let pipeline = TrainingPipeline::new(&feedback_store, &dataset_store, &registry, config);
        let run = pipeline.run();

        assert_eq!(run.status, RunStatus::Completed, "{:?}", run.error_message);
        assert_eq!(run.sample_count, 12);
        assert!(run.completed_at.is_some());
        assert!(run.error_message.is_none());

        let versions = registry.versions();
        assert_eq!(versions.len(), 1);
        assert!(!versions[0].is_active);
        assert_eq!(versions[0].version, "v1");
        assert!(versions[0].artifact_path.exists());

        // All identical texts: a memorizing model scores perfectly.
        let eval = run.eval_metrics.unwrap();
        assert!((eval.f1 - 1.0).abs() < f64::EPSILON);

        // Consumed feedback is flagged.
        assert!(feedback_store.unincorporated_incorrect().unwrap().is_empty());
    }

    #[test]
    fn test_dataset_usage_counted() {
        let feedback_store = MemoryFeedbackStore::new();
        let dataset_store = MemoryDatasetStore::new();
        for id in 0..10 {
            dataset_store.add(DatasetRecord {
                id,
                text: "Dr Alice prescribed insulin".to_string(),
                entities: vec![EntityAnnotation::new(3, 8, "PERSON")],
                verified: true,
                usage_count: 0,
            });
        }
        let registry = MemoryModelRegistry::new();
        let dir = tempdir().unwrap();
        let config = TrainingConfig {
            epochs: 3,
            models_dir: dir.path().to_path_buf(),
            ..TrainingConfig::default()
        };

        let pipeline = TrainingPipeline::new(&feedback_store, &dataset_store, &registry, config);
        let run = pipeline.run();

        assert_eq!(run.status, RunStatus::Completed, "{:?}", run.error_message);
        assert!(dataset_store.all().iter().all(|r| r.usage_count == 1));
    }

    #[test]
    fn test_promote_activates_single_version() {
        let registry = MemoryModelRegistry::new();
        for i in 1..=2 {
            registry
                .register(ModelVersion {
                    id: format!("m{i}"),
                    version: format!("v{i}"),
                    metrics: EvalMetrics::empty(),
                    artifact_path: PathBuf::from(format!("/tmp/m{i}")),
                    is_active: false,
                    created_at: Utc::now(),
                })
                .unwrap();
        }

        registry.promote("m1").unwrap();
        assert_eq!(registry.active().unwrap().unwrap().id, "m1");
        registry.promote("m2").unwrap();
        let versions = registry.versions();
        assert!(versions.iter().filter(|v| v.is_active).count() == 1);
        assert_eq!(registry.active().unwrap().unwrap().id, "m2");

        assert!(registry.promote("missing").is_err());
    }

    #[test]
    fn test_invalid_config_fails_run() {
        let (feedback_store, dataset_store) = seeded_stores(12);
        let registry = MemoryModelRegistry::new();
        let config = TrainingConfig {
            epochs: 0,
            ..TrainingConfig::default()
        };
        let pipeline = TrainingPipeline::new(&feedback_store, &dataset_store, &registry, config);
        let run = pipeline.run();
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[test]
    fn test_runs_are_deterministic_for_same_seed() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let mut evals = Vec::new();
        for dir in [&dir_a, &dir_b] {
            let (feedback_store, dataset_store) = seeded_stores(15);
            let registry = MemoryModelRegistry::new();
            let config = TrainingConfig {
                epochs: 4,
                models_dir: dir.path().to_path_buf(),
                ..TrainingConfig::default()
            };
            let pipeline =
                TrainingPipeline::new(&feedback_store, &dataset_store, &registry, config);
            let run = pipeline.run();
            assert_eq!(run.status, RunStatus::Completed, "{:?}", run.error_message);
            evals.push((run.train_metrics.unwrap(), run.eval_metrics.unwrap()));
        }
        assert_eq!(evals[0], evals[1]);
    }
}
