//! Batch scoring of a test dataset against a hosted endpoint.
//!
//! Rows are sent in order, one synchronous CSV request per row-group, and the
//! returned scores are collected positionally: prediction `i` always belongs
//! to feature row `i`. A single failed request aborts the whole run.

use serde::Deserialize;
use thiserror::Error;

use crate::config::ServiceContext;
use crate::dataset::TabularDataset;
use crate::http_client::{self, HttpError};
use crate::serving::EndpointHandle;

const MAX_SCORE_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// Errors raised while scoring the test set.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// The request or response failed at the HTTP layer.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// The response parsed but violated the scoring contract.
    #[error("Malformed scoring response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Deserialize)]
struct ScoreResponse {
    predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, Deserialize)]
struct Prediction {
    score: f64,
}

/// Serialize a row-group as CSV lines, one feature row per line.
pub fn csv_batch(rows: &[Vec<f32>]) -> String {
    let mut payload = String::new();
    for row in rows {
        let mut first = true;
        for value in row {
            if !first {
                payload.push(',');
            }
            payload.push_str(&value.to_string());
            first = false;
        }
        payload.push('\n');
    }
    payload
}

/// Score every row of the test dataset, preserving row order.
pub fn score_dataset(
    ctx: &ServiceContext,
    endpoint: &EndpointHandle,
    dataset: &TabularDataset,
    batch_size: usize,
) -> Result<Vec<f64>, ScoringError> {
    let url = endpoint.invocations_url(ctx);
    let rows: Vec<Vec<f32>> = dataset.feature_rows().collect();
    let batch_size = batch_size.max(1);
    let mut predictions = Vec::with_capacity(rows.len());

    for group in rows.chunks(batch_size) {
        let payload = csv_batch(group);
        let response: ScoreResponse =
            http_client::post_csv(ctx, &url, &payload, MAX_SCORE_RESPONSE_BYTES)?;
        predictions.extend(extract_scores(&response, group.len())?);
    }

    tracing::info!(
        endpoint = %endpoint.name(),
        rows = predictions.len(),
        "test set scored"
    );
    Ok(predictions)
}

fn extract_scores(response: &ScoreResponse, expected: usize) -> Result<Vec<f64>, ScoringError> {
    if response.predictions.len() != expected {
        return Err(ScoringError::MalformedResponse(format!(
            "expected {expected} predictions, got {}",
            response.predictions.len()
        )));
    }
    let mut scores = Vec::with_capacity(expected);
    for prediction in &response.predictions {
        if !prediction.score.is_finite() {
            return Err(ScoringError::MalformedResponse(format!(
                "non-finite score {}",
                prediction.score
            )));
        }
        scores.push(prediction.score);
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use crate::dataset::load_snapshot;
    use tempfile::tempdir;

    fn stub_context(base_url: &str) -> ServiceContext {
        ServiceContext::new(base_url, "token", "eu-central-1", Duration::from_millis(0)).unwrap()
    }

    /// Serve a fixed sequence of JSON bodies, one connection per response.
    fn serve_script(bodies: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for body in bodies {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut buf = [0u8; 64 * 1024];
                let _ = stream.read(&mut buf);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn csv_batch_joins_values_per_row() {
        let rows = vec![vec![1.0_f32, 2.5, 0.0], vec![4.0, 5.0, 6.0]];
        assert_eq!(csv_batch(&rows), "1,2.5,0\n4,5,6\n");
    }

    #[test]
    fn csv_batch_of_nothing_is_empty() {
        assert_eq!(csv_batch(&[]), "");
    }

    #[test]
    fn extract_scores_rejects_count_mismatch() {
        let response: ScoreResponse = serde_json::from_str(
            r#"{ "predictions": [ { "score": 0.5 } ] }"#,
        )
        .unwrap();
        let err = extract_scores(&response, 2).unwrap_err();
        assert!(matches!(err, ScoringError::MalformedResponse(_)));
    }

    #[test]
    fn extract_scores_rejects_non_finite_values() {
        let response = ScoreResponse {
            predictions: vec![Prediction { score: f64::NAN }],
        };
        let err = extract_scores(&response, 1).unwrap_err();
        assert!(matches!(err, ScoringError::MalformedResponse(_)));
    }

    #[test]
    fn score_response_requires_score_field() {
        let err = serde_json::from_str::<ScoreResponse>(r#"{ "predictions": [ {} ] }"#);
        assert!(err.is_err());
    }

    #[test]
    fn scores_arrive_in_row_order_across_batches() {
        let dir = tempdir().unwrap();
        crate::dataset::tests::write_snapshot(
            dir.path(),
            &["impressions", "clicks", "conversion_rate"],
            "conversion_rate",
            &[
                &[10.0, 2.0, 0.0],
                &[20.0, 1.0, 0.0],
                &[30.0, 9.0, 1.0],
            ],
        );
        let dataset = load_snapshot(dir.path()).unwrap();

        let base_url = serve_script(vec![
            r#"{ "predictions": [ { "score": 0.0 }, { "score": 0.25 } ] }"#.to_string(),
            r#"{ "predictions": [ { "score": 0.5 } ] }"#.to_string(),
        ]);
        let ctx = stub_context(&base_url);
        let endpoint = EndpointHandle::for_tests("conv-ep");

        let scores = score_dataset(&ctx, &endpoint, &dataset, 2).unwrap();
        assert_eq!(scores, vec![0.0, 0.25, 0.5]);
    }

    #[test]
    fn short_prediction_list_fails_the_run() {
        let dir = tempdir().unwrap();
        crate::dataset::tests::write_snapshot(
            dir.path(),
            &["x", "conversion_rate"],
            "conversion_rate",
            &[&[1.0, 0.0], &[2.0, 0.0]],
        );
        let dataset = load_snapshot(dir.path()).unwrap();

        let base_url = serve_script(vec![
            r#"{ "predictions": [ { "score": 0.1 } ] }"#.to_string(),
        ]);
        let ctx = stub_context(&base_url);
        let endpoint = EndpointHandle::for_tests("conv-ep");

        let err = score_dataset(&ctx, &endpoint, &dataset, 2).unwrap_err();
        assert!(matches!(err, ScoringError::MalformedResponse(_)));
    }
}
