//! Mean-absolute-error evaluation of scored predictions.

use std::fmt;

use thiserror::Error;

/// Errors raised by the evaluation functions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    /// Prediction and truth sequences have different lengths.
    #[error("Prediction and truth counts differ: {predictions} vs {truths}")]
    LengthMismatch {
        predictions: usize,
        truths: usize,
    },
    /// Both sequences are empty; the mean is undefined.
    #[error("Cannot evaluate an empty prediction set")]
    Empty,
}

/// Absolute error per row, aligned positionally with the inputs.
pub fn abs_errors(predictions: &[f64], truths: &[f64]) -> Result<Vec<f64>, EvalError> {
    check_lengths(predictions, truths)?;
    Ok(predictions
        .iter()
        .zip(truths)
        .map(|(prediction, truth)| (prediction - truth).abs())
        .collect())
}

/// Mean absolute error over all rows.
pub fn mean_abs_error(predictions: &[f64], truths: &[f64]) -> Result<f64, EvalError> {
    let errors = abs_errors(predictions, truths)?;
    if errors.is_empty() {
        return Err(EvalError::Empty);
    }
    Ok(errors.iter().sum::<f64>() / errors.len() as f64)
}

/// Mean absolute error restricted to rows whose truth is positive.
///
/// Returns `Ok(None)` when no row has a positive truth value; the statistic
/// is undefined there and must not be reported as a number.
pub fn mean_abs_error_positive(
    predictions: &[f64],
    truths: &[f64],
) -> Result<Option<f64>, EvalError> {
    check_lengths(predictions, truths)?;
    if predictions.is_empty() {
        return Err(EvalError::Empty);
    }
    let mut sum = 0.0;
    let mut count = 0usize;
    for (prediction, truth) in predictions.iter().zip(truths) {
        if *truth > 0.0 {
            sum += (prediction - truth).abs();
            count += 1;
        }
    }
    if count == 0 {
        return Ok(None);
    }
    Ok(Some(sum / count as f64))
}

fn check_lengths(predictions: &[f64], truths: &[f64]) -> Result<(), EvalError> {
    if predictions.len() != truths.len() {
        return Err(EvalError::LengthMismatch {
            predictions: predictions.len(),
            truths: truths.len(),
        });
    }
    Ok(())
}

/// Aggregate evaluation result for one scored test set.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    /// Number of scored rows.
    pub rows: usize,
    /// Mean absolute error over all rows.
    pub mae: f64,
    /// Number of rows with a positive truth value.
    pub positive_rows: usize,
    /// Mean absolute error over positive-truth rows, when any exist.
    pub mae_positive: Option<f64>,
}

impl EvalReport {
    /// Evaluate a prediction sequence against its ground truth.
    pub fn compute(predictions: &[f64], truths: &[f64]) -> Result<Self, EvalError> {
        let mae = mean_abs_error(predictions, truths)?;
        let mae_positive = mean_abs_error_positive(predictions, truths)?;
        let positive_rows = truths.iter().filter(|truth| **truth > 0.0).count();
        Ok(Self {
            rows: predictions.len(),
            mae,
            positive_rows,
            mae_positive,
        })
    }
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rows scored:          {}", self.rows)?;
        writeln!(f, "mae:                  {:.6}", self.mae)?;
        writeln!(f, "rows with truth > 0:  {}", self.positive_rows)?;
        match self.mae_positive {
            Some(value) => write!(f, "mae (truth > 0):      {value:.6}"),
            None => write!(f, "mae (truth > 0):      n/a"),
        }
    }
}
