//! Library exports for the convrate workflow binary and its tests.
/// TOML configuration and the remote-service context.
pub mod config;
/// Dataset snapshot loading.
pub mod dataset;
/// Mean-absolute-error evaluation.
pub mod eval;
/// Shared HTTP agent and bounded response helpers.
pub mod http_client;
/// Logging setup.
pub mod logging;
/// Batch scoring against a hosted endpoint.
pub mod scoring;
/// Model endpoint deployment.
pub mod serving;
/// Training-job submission and polling.
pub mod training;
/// Sequential pipeline driver.
pub mod workflow;
