//! Sequential train → deploy → score → evaluate pipeline.
//!
//! Each step starts only after the previous remote operation has returned,
//! and any failure aborts the run. The workflow itself owns no model logic;
//! it wires the dataset snapshots to the managed service and evaluates what
//! comes back.

use thiserror::Error;
use time::OffsetDateTime;

use crate::config::{ConfigError, WorkflowConfig};
use crate::dataset::{self, SnapshotError};
use crate::eval::{EvalError, EvalReport, abs_errors};
use crate::scoring::{self, ScoringError};
use crate::serving::{self, DeployError};
use crate::training::{self, TrainingError, TrainingJobRequest};

/// Errors raised anywhere in the pipeline.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Deploy(#[from] DeployError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    /// Train and test snapshots disagree on the feature width.
    #[error("Train and test snapshots disagree on feature width: {train} vs {test}")]
    FeatureDimMismatch { train: usize, test: usize },
}

/// Run the whole workflow and return the evaluation report.
pub fn run(config: &WorkflowConfig) -> Result<EvalReport, WorkflowError> {
    let ctx = config.service_context()?;

    let train = dataset::load_snapshot(&config.datasets.train)?;
    let test = dataset::load_snapshot(&config.datasets.test)?;
    if train.feature_dim() != test.feature_dim() {
        return Err(WorkflowError::FeatureDimMismatch {
            train: train.feature_dim(),
            test: test.feature_dim(),
        });
    }
    tracing::info!(
        train_rows = train.row_count(),
        test_rows = test.row_count(),
        feature_dim = train.feature_dim(),
        "snapshots loaded"
    );

    let feature_dim = config.training.feature_dim.unwrap_or(train.feature_dim());
    let name = training::job_name(&config.training.job_prefix, OffsetDateTime::now_utc())?;
    let request = TrainingJobRequest::from_config(&config.training, name, feature_dim);
    let model = training::submit_and_wait(&ctx, &request)?;

    let endpoint = serving::deploy_and_wait(&ctx, &model, config.endpoint.instance_count)?;

    let predictions = scoring::score_dataset(&ctx, &endpoint, &test, config.scoring.batch_size)?;
    let truths = test.labels();

    if tracing::enabled!(tracing::Level::DEBUG) {
        let errors = abs_errors(&predictions, &truths)?;
        for (row, error) in errors.iter().enumerate().take(5) {
            tracing::debug!(
                row,
                predicted = predictions[row],
                truth = truths[row],
                abs_error = error,
                "sample prediction"
            );
        }
    }

    let report = EvalReport::compute(&predictions, &truths)?;
    tracing::info!(
        rows = report.rows,
        mae = report.mae,
        positive_rows = report.positive_rows,
        "evaluation complete"
    );
    Ok(report)
}
