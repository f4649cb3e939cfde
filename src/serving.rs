//! Model endpoint deployment.
//!
//! Requests that the trained artifact be hosted behind a synchronous scoring
//! endpoint and waits for the service's own readiness signal. Teardown is
//! handled outside this workflow.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ServiceContext;
use crate::http_client::{self, HttpError};
use crate::training::TrainedModel;

const MAX_ENDPOINT_RESPONSE_BYTES: usize = 256 * 1024;

/// Errors raised while deploying a scoring endpoint.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The service reported the endpoint as failed.
    #[error("Endpoint {name} failed to deploy: {reason}")]
    DeployFailed { name: String, reason: String },
    /// The request or response failed at the HTTP layer.
    #[error(transparent)]
    Http(#[from] HttpError),
}

#[derive(Debug, Clone, Serialize)]
struct CreateEndpointRequest<'a> {
    model_artifact: &'a str,
    instance_count: u32,
}

/// Remote endpoint lifecycle as reported by the describe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Creating,
    InService,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
struct EndpointStatusResponse {
    name: String,
    status: EndpointStatus,
    #[serde(default)]
    failure_reason: Option<String>,
}

/// Handle to a ready scoring endpoint.
#[derive(Debug, Clone)]
pub struct EndpointHandle {
    name: String,
}

impl EndpointHandle {
    #[cfg(test)]
    pub(crate) fn for_tests(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Service-assigned endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL scoring requests are POSTed to.
    pub fn invocations_url(&self, ctx: &ServiceContext) -> String {
        ctx.url(&format!("endpoints/{}/invocations", self.name))
    }
}

/// Request deployment of a trained model and block until the endpoint is in
/// service.
pub fn deploy_and_wait(
    ctx: &ServiceContext,
    model: &TrainedModel,
    instance_count: u32,
) -> Result<EndpointHandle, DeployError> {
    let create_url = ctx.url("endpoints");
    let request = CreateEndpointRequest {
        model_artifact: &model.artifact,
        instance_count,
    };
    let created: EndpointStatusResponse =
        http_client::post_json(ctx, &create_url, &request, MAX_ENDPOINT_RESPONSE_BYTES)?;
    tracing::info!(
        endpoint = %created.name,
        model = %model.job_name,
        instances = instance_count,
        "endpoint deployment requested"
    );

    let describe_url = ctx.url(&format!("endpoints/{}", created.name));
    loop {
        let described: EndpointStatusResponse =
            http_client::get_json(ctx, &describe_url, MAX_ENDPOINT_RESPONSE_BYTES)?;
        match described.status {
            EndpointStatus::InService => {
                tracing::info!(endpoint = %described.name, "endpoint in service");
                return Ok(EndpointHandle {
                    name: described.name,
                });
            }
            EndpointStatus::Failed => {
                let reason = described
                    .failure_reason
                    .unwrap_or_else(|| "no failure reason reported".to_string());
                return Err(DeployError::DeployFailed {
                    name: described.name,
                    reason,
                });
            }
            EndpointStatus::Creating => {
                tracing::debug!(endpoint = %described.name, "endpoint still creating");
                std::thread::sleep(ctx.poll_interval());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn describe_response_parses_lifecycle_states() {
        let creating: EndpointStatusResponse =
            serde_json::from_str(r#"{ "name": "conv-ep", "status": "creating" }"#).unwrap();
        assert_eq!(creating.status, EndpointStatus::Creating);

        let failed: EndpointStatusResponse = serde_json::from_str(
            r#"{ "name": "conv-ep", "status": "failed", "failure_reason": "no capacity" }"#,
        )
        .unwrap();
        assert_eq!(failed.status, EndpointStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("no capacity"));
    }

    #[test]
    fn invocations_url_targets_the_named_endpoint() {
        let ctx = ServiceContext::new(
            "https://ml.example.invalid/api",
            "t",
            "r",
            Duration::from_secs(1),
        )
        .unwrap();
        let handle = EndpointHandle {
            name: "conv-ep".to_string(),
        };
        assert_eq!(
            handle.invocations_url(&ctx),
            "https://ml.example.invalid/api/endpoints/conv-ep/invocations"
        );
    }
}
