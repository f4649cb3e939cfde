//! Shared HTTP client configuration and bounded response helpers.

use std::io::{self, Read};
use std::sync::OnceLock;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ServiceContext;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors produced by requests against the managed service.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The service answered with a non-success status code.
    #[error("HTTP {code}: {body}")]
    Status {
        /// Status code returned by the service.
        code: u16,
        /// Response body, bounded and lossily decoded.
        body: String,
    },
    /// The request never produced a response.
    #[error("HTTP error: {0}")]
    Transport(String),
    /// The response body could not be read or decoded.
    #[error("Invalid response body: {0}")]
    Body(String),
}

/// Return a shared HTTP agent with consistent timeouts.
pub(crate) fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(WRITE_TIMEOUT)
            .build()
    })
}

/// Issue an authenticated GET and decode the JSON response.
pub(crate) fn get_json<T: DeserializeOwned>(
    ctx: &ServiceContext,
    url: &str,
    max_bytes: usize,
) -> Result<T, HttpError> {
    let request = agent()
        .get(url)
        .set("Accept", "application/json")
        .set("Authorization", &ctx.bearer())
        .set("X-Service-Region", ctx.region());
    decode_response(request.call(), max_bytes)
}

/// Issue an authenticated POST with a JSON body and decode the JSON response.
pub(crate) fn post_json<B: Serialize, T: DeserializeOwned>(
    ctx: &ServiceContext,
    url: &str,
    body: &B,
    max_bytes: usize,
) -> Result<T, HttpError> {
    let request = agent()
        .post(url)
        .set("Accept", "application/json")
        .set("Content-Type", "application/json")
        .set("Authorization", &ctx.bearer())
        .set("X-Service-Region", ctx.region());
    decode_response(request.send_json(body), max_bytes)
}

/// Issue an authenticated POST with a `text/csv` body and decode the JSON response.
pub(crate) fn post_csv<T: DeserializeOwned>(
    ctx: &ServiceContext,
    url: &str,
    payload: &str,
    max_bytes: usize,
) -> Result<T, HttpError> {
    let request = agent()
        .post(url)
        .set("Accept", "application/json")
        .set("Content-Type", "text/csv")
        .set("Authorization", &ctx.bearer())
        .set("X-Service-Region", ctx.region());
    decode_response(request.send_string(payload), max_bytes)
}

fn decode_response<T: DeserializeOwned>(
    result: Result<ureq::Response, ureq::Error>,
    max_bytes: usize,
) -> Result<T, HttpError> {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            let body = read_response_bytes(response, max_bytes)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_else(|err| err.to_string());
            return Err(HttpError::Status { code, body });
        }
        Err(ureq::Error::Transport(err)) => {
            return Err(HttpError::Transport(err.to_string()));
        }
    };
    let bytes =
        read_response_bytes(response, max_bytes).map_err(|err| HttpError::Body(err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| HttpError::Body(err.to_string()))
}

/// Read a response into memory, enforcing a maximum byte size.
pub(crate) fn read_response_bytes(
    response: ureq::Response,
    max_bytes: usize,
) -> Result<Vec<u8>, io::Error> {
    check_content_length(&response, max_bytes)?;
    let reader = response.into_reader();
    let mut limited = reader.take(max_bytes as u64 + 1);
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes)?;
    if bytes.len() > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Response exceeded {max_bytes} bytes"),
        ));
    }
    Ok(bytes)
}

fn check_content_length(response: &ureq::Response, max_bytes: usize) -> Result<(), io::Error> {
    let Some(length) = response.header("Content-Length") else {
        return Ok(());
    };
    let Ok(length) = length.parse::<u64>() else {
        return Ok(());
    };
    if length > max_bytes as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Response too large: {length} bytes"),
        ));
    }
    Ok(())
}
