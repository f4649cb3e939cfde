//! Loader for pre-processed tabular dataset snapshots.
//!
//! A snapshot is a directory holding `manifest.json` (column layout and row
//! count) plus `rows.f32le`, the row-major little-endian `f32` values for
//! every column including the label. Snapshots are produced by an upstream
//! pipeline stage and are read-only here.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Manifest file name inside a snapshot directory.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Row blob file name inside a snapshot directory.
pub const ROWS_FILE: &str = "rows.f32le";

const F32_BYTES: usize = 4;

/// Errors raised while loading a dataset snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// A snapshot file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The manifest is not valid JSON of the expected shape.
    #[error("Invalid manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// The manifest declares no columns.
    #[error("Snapshot manifest declares no columns")]
    NoColumns,
    /// The label column is missing from the declared columns.
    #[error("Label column {label:?} not present in snapshot columns")]
    MissingLabelColumn { label: String },
    /// The row blob does not match the manifest's declared dimensions.
    #[error("Row blob size mismatch: expected {expected} bytes, found {found}")]
    RowBlobSizeMismatch { expected: usize, found: usize },
}

/// Parsed contents of `manifest.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotManifest {
    /// Snapshot format version.
    pub format_version: i64,
    /// Ordered column names, label included.
    pub columns: Vec<String>,
    /// Name of the label column.
    pub label_column: String,
    /// Number of rows in the blob.
    pub row_count: usize,
}

/// A loaded, read-only tabular dataset.
#[derive(Debug, Clone)]
pub struct TabularDataset {
    manifest: SnapshotManifest,
    label_index: usize,
    values: Vec<f32>,
}

impl TabularDataset {
    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.manifest.row_count
    }

    /// Number of columns, label included.
    pub fn column_count(&self) -> usize {
        self.manifest.columns.len()
    }

    /// Number of feature columns (label excluded).
    pub fn feature_dim(&self) -> usize {
        self.column_count() - 1
    }

    /// The snapshot manifest.
    pub fn manifest(&self) -> &SnapshotManifest {
        &self.manifest
    }

    /// Iterate feature rows in order, with the label column removed.
    pub fn feature_rows(&self) -> impl Iterator<Item = Vec<f32>> + '_ {
        let width = self.column_count();
        let label_index = self.label_index;
        self.values.chunks_exact(width).map(move |row| {
            row.iter()
                .enumerate()
                .filter(|(idx, _)| *idx != label_index)
                .map(|(_, value)| *value)
                .collect()
        })
    }

    /// Label values in row order.
    pub fn labels(&self) -> Vec<f64> {
        let width = self.column_count();
        self.values
            .chunks_exact(width)
            .map(|row| f64::from(row[self.label_index]))
            .collect()
    }
}

/// Load a snapshot directory into memory, validating its declared shape.
pub fn load_snapshot(dir: &Path) -> Result<TabularDataset, SnapshotError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest_bytes = std::fs::read(&manifest_path).map_err(|source| SnapshotError::Io {
        path: manifest_path.clone(),
        source,
    })?;
    let manifest: SnapshotManifest =
        serde_json::from_slice(&manifest_bytes).map_err(|source| SnapshotError::Manifest {
            path: manifest_path,
            source,
        })?;

    if manifest.columns.is_empty() {
        return Err(SnapshotError::NoColumns);
    }
    let label_index = manifest
        .columns
        .iter()
        .position(|column| *column == manifest.label_column)
        .ok_or_else(|| SnapshotError::MissingLabelColumn {
            label: manifest.label_column.clone(),
        })?;

    let rows_path = dir.join(ROWS_FILE);
    let blob = std::fs::read(&rows_path).map_err(|source| SnapshotError::Io {
        path: rows_path,
        source,
    })?;
    let expected = manifest.row_count * manifest.columns.len() * F32_BYTES;
    if blob.len() != expected {
        return Err(SnapshotError::RowBlobSizeMismatch {
            expected,
            found: blob.len(),
        });
    }

    let values = blob
        .chunks_exact(F32_BYTES)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(TabularDataset {
        manifest,
        label_index,
        values,
    })
}
