//! Active-learning training: data conversion, fine-tuning, evaluation and
//! the run pipeline.
//!
//! The loop: classification mistakes come back as feedback, the pipeline
//! fine-tunes a [`TrainedNerModel`] on corrections plus verified dataset
//! records, and an operator promotes the registered version so the
//! statistical detector picks it up on [`crate::HybridEngine::reload_models`].

pub mod data;
pub mod metrics;
pub mod model;
pub mod pipeline;

pub use data::{
    examples_from_dataset, examples_from_feedback, shuffle, AnnotatedSpan, DatasetRecord,
    DatasetStore, EntityAnnotation, FeedbackRecord, FeedbackStore, MemoryDatasetStore,
    MemoryFeedbackStore, TrainingExample,
};
pub use metrics::{evaluate, EvalMetrics};
pub use model::{TrainedNerModel, MODEL_FILE};
pub use pipeline::{
    MemoryModelRegistry, ModelRegistry, ModelVersion, RunStatus, TrainMetrics, TrainingConfig,
    TrainingPipeline, TrainingRun,
};
