//! Error types for the inference adapter.

use thiserror::Error;

/// Surfaced unchanged to the caller — the adapter never retries and never
/// returns a partial `FeatureBundle`.
#[derive(Error, Debug, Clone)]
#[error("inference runtime error: {reason}")]
pub struct RuntimeError {
    pub reason: String,
}

impl RuntimeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A feature bundle was missing an expected key, or a model returned a shape
/// the caller did not expect.
#[derive(Error, Debug, Clone)]
#[error("processing failed: {reason}")]
pub struct ProcessingFailed {
    pub reason: String,
}

impl ProcessingFailed {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
