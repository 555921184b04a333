//! Error taxonomy for the ASR half of the pipeline.

use thiserror::Error;
use infer_adapter::{ProcessingFailed, RuntimeError};

#[derive(Error, Debug, Clone)]
pub enum SttError {
    #[error("operation called before models were loaded")]
    NotInitialized,

    #[error("invalid audio data: {reason}")]
    InvalidAudioData { reason: String },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Processing(#[from] ProcessingFailed),

    #[error(transparent)]
    Tensor(#[from] tensor_core::TensorError),

    #[error("io error: {0}")]
    Io(String),
}
