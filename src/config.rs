//! Workflow configuration loaded from a TOML file.
//!
//! All remote-service parameters live here so the pipeline components can be
//! handed an explicit [`ServiceContext`] instead of reading ambient process
//! state. Tests point the context at a local stub server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors that may occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML of the expected shape.
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// The configured service base URL does not parse.
    #[error("Invalid service base URL {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
}

/// Top-level configuration for one workflow run.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Remote-service session parameters.
    pub service: ServiceConfig,
    /// Training-job parameters.
    pub training: TrainingConfig,
    /// Endpoint deployment parameters.
    #[serde(default)]
    pub endpoint: EndpointConfig,
    /// Test-set scoring parameters.
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Local dataset snapshot locations.
    pub datasets: DatasetPaths,
    /// Optional directory for per-run log files.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

/// Connection parameters for the managed training/serving service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the service API.
    pub base_url: String,
    /// Bearer credential presented on every request.
    pub credential: String,
    /// Service region identifier.
    pub region: String,
    /// Seconds between job/endpoint status polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Parameters of the remote linear-learner training job.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Training container image identifier.
    pub image: String,
    /// Role credential the service assumes while training.
    pub role: String,
    /// Number of training instances.
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,
    /// Instance type to train on.
    pub instance_type: String,
    /// Object-store location for the model artifact.
    pub output_location: StoreLocation,
    /// Object-store location of the training channel CSV.
    pub train_channel: StoreLocation,
    /// Object-store location of the validation channel CSV.
    pub validation_channel: StoreLocation,
    /// Mini-batch size hyperparameter.
    #[serde(default = "default_mini_batch_size")]
    pub mini_batch_size: usize,
    /// Feature count override; defaults to the snapshot width minus the label.
    #[serde(default)]
    pub feature_dim: Option<usize>,
    /// Prefix for timestamped job names.
    #[serde(default = "default_job_prefix")]
    pub job_prefix: String,
}

/// Parameters of the hosted scoring endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Number of serving instances behind the endpoint.
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            instance_count: default_instance_count(),
        }
    }
}

/// Parameters of the batch scoring pass over the test set.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Rows per scoring request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Local snapshot directories for the two dataset splits.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetPaths {
    /// Merged train+validation snapshot directory.
    pub train: PathBuf,
    /// Held-out test snapshot directory.
    pub test: PathBuf,
}

/// An object-store location: bucket, key prefix, and optional file name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreLocation {
    /// Bucket name.
    pub bucket: String,
    /// Key prefix inside the bucket.
    pub prefix: String,
    /// File name under the prefix, when the location names a single object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl StoreLocation {
    /// Render the location as a single display string for logs.
    pub fn uri(&self) -> String {
        match &self.file {
            Some(file) => format!("{}/{}/{}", self.bucket, self.prefix, file),
            None => format!("{}/{}", self.bucket, self.prefix),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_instance_count() -> u32 {
    1
}

fn default_mini_batch_size() -> usize {
    100
}

fn default_batch_size() -> usize {
    100
}

fn default_job_prefix() -> String {
    "linear-learner".to_string()
}

impl WorkflowConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build the validated service context handed to each pipeline component.
    pub fn service_context(&self) -> Result<ServiceContext, ConfigError> {
        ServiceContext::new(
            &self.service.base_url,
            &self.service.credential,
            &self.service.region,
            Duration::from_secs(self.service.poll_interval_secs),
        )
    }
}

/// Validated session parameters for the remote service.
///
/// Passed explicitly into every component that talks to the service; nothing
/// in the pipeline reads credentials or endpoints from global state.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    base_url: String,
    credential: String,
    region: String,
    poll_interval: Duration,
}

impl ServiceContext {
    /// Validate the base URL and build a context.
    pub fn new(
        base_url: &str,
        credential: &str,
        region: &str,
        poll_interval: Duration,
    ) -> Result<Self, ConfigError> {
        Url::parse(base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credential: credential.to_string(),
            region: region.to_string(),
            poll_interval,
        })
    }

    /// Absolute URL for an API path below the service base.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.credential.trim())
    }

    /// Region header value.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Delay between status polls.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
