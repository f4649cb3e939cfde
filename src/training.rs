//! Training-job submission and completion polling.
//!
//! The heavy lifting (the linear-learner algorithm, distribution, artifact
//! storage) happens inside the managed service; this module only names a job,
//! describes its inputs, and waits for a terminal status.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

use crate::config::{ServiceContext, StoreLocation, TrainingConfig};
use crate::http_client::{self, HttpError};

const MAX_JOB_RESPONSE_BYTES: usize = 256 * 1024;

/// Hyperparameter value selecting the regression task.
pub const PREDICTOR_REGRESSOR: &str = "regressor";
/// Content type tag attached to both input channels.
pub const CHANNEL_CONTENT_TYPE: &str = "text/csv";

/// Errors raised while running a remote training job.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// The service reported the job as failed.
    #[error("Training job {name} failed: {reason}")]
    JobFailed { name: String, reason: String },
    /// The job succeeded but the describe response named no artifact.
    #[error("Training job {name} succeeded without a model artifact")]
    MissingArtifact { name: String },
    /// The request or response failed at the HTTP layer.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// The job-name timestamp could not be formatted.
    #[error("Failed to format job name: {0}")]
    FormatTime(time::error::Format),
}

/// Hyperparameters of the built-in linear learner.
#[derive(Debug, Clone, Serialize)]
pub struct Hyperparameters {
    /// Width of one feature row (label excluded).
    pub feature_dim: usize,
    /// Mini-batch size.
    pub mini_batch_size: usize,
    /// Task type; always [`PREDICTOR_REGRESSOR`] in this workflow.
    pub predictor_type: &'static str,
}

/// One named input channel backed by an object-store CSV.
#[derive(Debug, Clone, Serialize)]
pub struct InputChannel {
    /// Object-store location of the channel data.
    pub location: StoreLocation,
    /// Content type of the channel data.
    pub content_type: &'static str,
}

impl InputChannel {
    fn csv(location: StoreLocation) -> Self {
        Self {
            location,
            content_type: CHANNEL_CONTENT_TYPE,
        }
    }
}

/// The train and validation channels of a job.
#[derive(Debug, Clone, Serialize)]
pub struct InputChannels {
    /// Training data channel.
    pub train: InputChannel,
    /// Validation data channel.
    pub validation: InputChannel,
}

/// A complete training-job request as submitted to the service.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingJobRequest {
    /// Unique job name.
    pub name: String,
    /// Training container image identifier.
    pub image: String,
    /// Role credential assumed by the service.
    pub role: String,
    /// Number of training instances.
    pub instance_count: u32,
    /// Instance type to train on.
    pub instance_type: String,
    /// Object-store location for the model artifact.
    pub output_location: StoreLocation,
    /// Algorithm hyperparameters.
    pub hyperparameters: Hyperparameters,
    /// Input data channels.
    pub channels: InputChannels,
}

impl TrainingJobRequest {
    /// Build a request from the training config for a given job name and
    /// feature width.
    pub fn from_config(config: &TrainingConfig, name: String, feature_dim: usize) -> Self {
        Self {
            name,
            image: config.image.clone(),
            role: config.role.clone(),
            instance_count: config.instance_count,
            instance_type: config.instance_type.clone(),
            output_location: config.output_location.clone(),
            hyperparameters: Hyperparameters {
                feature_dim,
                mini_batch_size: config.mini_batch_size,
                predictor_type: PREDICTOR_REGRESSOR,
            },
            channels: InputChannels {
                train: InputChannel::csv(config.train_channel.clone()),
                validation: InputChannel::csv(config.validation_channel.clone()),
            },
        }
    }
}

/// Remote job lifecycle as reported by the describe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
struct JobStatusResponse {
    status: JobStatus,
    #[serde(default)]
    failure_reason: Option<String>,
    #[serde(default)]
    model_artifact: Option<String>,
}

/// Reference to the artifact produced by a succeeded job.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    /// Name of the job that produced the artifact.
    pub job_name: String,
    /// Service-side artifact reference.
    pub artifact: String,
}

/// Derive a unique job name from a prefix and a UTC timestamp.
pub fn job_name(prefix: &str, now: OffsetDateTime) -> Result<String, TrainingError> {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]-[hour]-[minute]-[second]");
    let stamp = now.format(NAME_FORMAT).map_err(TrainingError::FormatTime)?;
    Ok(format!("{prefix}-{stamp}"))
}

/// Submit a training job and block until it reaches a terminal state.
///
/// A failed job is surfaced as [`TrainingError::JobFailed`] and halts the
/// pipeline; there is no retry.
pub fn submit_and_wait(
    ctx: &ServiceContext,
    request: &TrainingJobRequest,
) -> Result<TrainedModel, TrainingError> {
    let submit_url = ctx.url("training-jobs");
    let _: JobStatusResponse =
        http_client::post_json(ctx, &submit_url, request, MAX_JOB_RESPONSE_BYTES)?;
    tracing::info!(
        job = %request.name,
        train = %request.channels.train.location.uri(),
        validation = %request.channels.validation.location.uri(),
        "training job submitted"
    );

    let describe_url = ctx.url(&format!("training-jobs/{}", request.name));
    loop {
        let described: JobStatusResponse =
            http_client::get_json(ctx, &describe_url, MAX_JOB_RESPONSE_BYTES)?;
        match described.status {
            JobStatus::Succeeded => {
                let artifact =
                    described
                        .model_artifact
                        .ok_or_else(|| TrainingError::MissingArtifact {
                            name: request.name.clone(),
                        })?;
                tracing::info!(job = %request.name, artifact = %artifact, "training job succeeded");
                return Ok(TrainedModel {
                    job_name: request.name.clone(),
                    artifact,
                });
            }
            JobStatus::Failed => {
                let reason = described
                    .failure_reason
                    .unwrap_or_else(|| "no failure reason reported".to_string());
                return Err(TrainingError::JobFailed {
                    name: request.name.clone(),
                    reason,
                });
            }
            JobStatus::Submitted | JobStatus::Running => {
                tracing::debug!(job = %request.name, status = ?described.status, "training job in progress");
                std::thread::sleep(ctx.poll_interval());
            }
        }
    }
}
