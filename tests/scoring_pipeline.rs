//! End-to-end pipeline test against a local stub of the managed service.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;

use convrate::config::{
    DatasetPaths, EndpointConfig, ScoringConfig, ServiceConfig, StoreLocation, TrainingConfig,
    WorkflowConfig,
};
use convrate::workflow::{self, WorkflowError};
use tempfile::tempdir;

const MAX_STUB_REQUESTS: usize = 16;

fn write_snapshot(dir: &Path, columns: &[&str], label_column: &str, rows: &[&[f32]]) {
    let manifest = serde_json::json!({
        "format_version": 1,
        "columns": columns,
        "label_column": label_column,
        "row_count": rows.len(),
    });
    std::fs::write(dir.join("manifest.json"), manifest.to_string()).unwrap();
    let mut blob = Vec::new();
    for row in rows {
        for value in *row {
            blob.extend_from_slice(&value.to_le_bytes());
        }
    }
    std::fs::write(dir.join("rows.f32le"), blob).unwrap();
}

/// Serve a stub service API, routing by request path. Scoring responses are
/// consumed in order, one per invocation request.
fn serve_stub(job_outcome: &'static str, score_bodies: Vec<&'static str>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let mut scores: VecDeque<&str> = score_bodies.into();
        for _ in 0..MAX_STUB_REQUESTS {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut buf = [0u8; 64 * 1024];
            let read = stream.read(&mut buf).unwrap_or(0);
            let head = String::from_utf8_lossy(&buf[..read]).into_owned();
            let mut parts = head.split_whitespace();
            let method = parts.next().unwrap_or("");
            let path = parts.next().unwrap_or("");

            let body = match (method, path) {
                ("POST", "/api/training-jobs") => {
                    r#"{ "status": "submitted" }"#.to_string()
                }
                ("GET", p) if p.starts_with("/api/training-jobs/") => match job_outcome {
                    "succeeded" => {
                        r#"{ "status": "succeeded", "model_artifact": "models/out/model.tar" }"#
                            .to_string()
                    }
                    _ => r#"{ "status": "failed", "failure_reason": "channel data unreadable" }"#
                        .to_string(),
                },
                ("POST", "/api/endpoints") => {
                    r#"{ "name": "conv-ep", "status": "creating" }"#.to_string()
                }
                ("GET", "/api/endpoints/conv-ep") => {
                    r#"{ "name": "conv-ep", "status": "in_service" }"#.to_string()
                }
                ("POST", "/api/endpoints/conv-ep/invocations") => scores
                    .pop_front()
                    .unwrap_or(r#"{ "predictions": [] }"#)
                    .to_string(),
                _ => r#"{ "error": "unexpected request" }"#.to_string(),
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    format!("http://{}/api", addr)
}

fn store(bucket: &str, prefix: &str, file: Option<&str>) -> StoreLocation {
    StoreLocation {
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
        file: file.map(str::to_string),
    }
}

fn workflow_config(base_url: String, train_dir: &Path, test_dir: &Path) -> WorkflowConfig {
    WorkflowConfig {
        service: ServiceConfig {
            base_url,
            credential: "token-123".to_string(),
            region: "eu-central-1".to_string(),
            poll_interval_secs: 0,
        },
        training: TrainingConfig {
            image: "linear-learner:1".to_string(),
            role: "workflow-trainer".to_string(),
            instance_count: 1,
            instance_type: "ml.c4.xlarge".to_string(),
            output_location: store("models", "conversion/output", None),
            train_channel: store("datasets", "conversion", Some("step2-train.csv")),
            validation_channel: store("datasets", "conversion", Some("step2-validation.csv")),
            mini_batch_size: 100,
            feature_dim: None,
            job_prefix: "linear-learner".to_string(),
        },
        endpoint: EndpointConfig { instance_count: 1 },
        scoring: ScoringConfig { batch_size: 2 },
        datasets: DatasetPaths {
            train: train_dir.to_path_buf(),
            test: test_dir.to_path_buf(),
        },
        log_dir: None,
    }
}

#[test]
fn pipeline_trains_scores_and_reports_mae() {
    let train_dir = tempdir().unwrap();
    let test_dir = tempdir().unwrap();
    let columns = ["impressions", "clicks", "conversion_rate"];
    write_snapshot(
        train_dir.path(),
        &columns,
        "conversion_rate",
        &[&[10.0, 2.0, 0.1], &[20.0, 1.0, 0.0]],
    );
    write_snapshot(
        test_dir.path(),
        &columns,
        "conversion_rate",
        &[
            &[10.0, 2.0, 0.0],
            &[20.0, 1.0, 0.0],
            &[30.0, 9.0, 1.0],
        ],
    );

    let base_url = serve_stub(
        "succeeded",
        vec![
            r#"{ "predictions": [ { "score": 0.0 }, { "score": 0.0 } ] }"#,
            r#"{ "predictions": [ { "score": 0.5 } ] }"#,
        ],
    );
    let config = workflow_config(base_url, train_dir.path(), test_dir.path());

    let report = workflow::run(&config).unwrap();
    assert_eq!(report.rows, 3);
    assert_eq!(report.positive_rows, 1);
    assert!((report.mae - 0.5 / 3.0).abs() < 1e-12);
    assert_eq!(report.mae_positive, Some(0.5));
}

#[test]
fn failed_training_job_halts_the_pipeline() {
    let train_dir = tempdir().unwrap();
    let test_dir = tempdir().unwrap();
    let columns = ["impressions", "conversion_rate"];
    write_snapshot(
        train_dir.path(),
        &columns,
        "conversion_rate",
        &[&[10.0, 0.1]],
    );
    write_snapshot(
        test_dir.path(),
        &columns,
        "conversion_rate",
        &[&[10.0, 0.0]],
    );

    let base_url = serve_stub("failed", vec![]);
    let config = workflow_config(base_url, train_dir.path(), test_dir.path());

    let err = workflow::run(&config).unwrap_err();
    match err {
        WorkflowError::Training(inner) => {
            assert!(inner.to_string().contains("channel data unreadable"));
        }
        other => panic!("expected a training failure, got {other}"),
    }
}

#[test]
fn mismatched_snapshot_widths_are_rejected_before_any_remote_call() {
    let train_dir = tempdir().unwrap();
    let test_dir = tempdir().unwrap();
    write_snapshot(
        train_dir.path(),
        &["a", "b", "conversion_rate"],
        "conversion_rate",
        &[&[1.0, 2.0, 0.0]],
    );
    write_snapshot(
        test_dir.path(),
        &["a", "conversion_rate"],
        "conversion_rate",
        &[&[1.0, 0.0]],
    );

    let config = workflow_config(
        "http://127.0.0.1:9/api".to_string(),
        train_dir.path(),
        test_dir.path(),
    );
    let err = workflow::run(&config).unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::FeatureDimMismatch { train: 2, test: 1 }
    ));
}
