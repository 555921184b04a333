//! Error taxonomy for the diarization half of the pipeline.

use infer_adapter::{ProcessingFailed, RuntimeError};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DiarizeError {
    #[error("operation called before models were loaded")]
    NotInitialized,

    #[error("invalid audio data: {reason}")]
    InvalidAudioData { reason: String },

    #[error("embedding has wrong dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Processing(#[from] ProcessingFailed),

    #[error(transparent)]
    Tensor(#[from] tensor_core::TensorError),
}
