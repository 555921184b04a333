//! Error types for the tensor/buffer layer

use thiserror::Error;

/// Errors surfaced by tensor allocation and viewing.
///
/// Both are recoverable by the caller: `AllocError` by falling back to a
/// plain (unaligned) allocation, `OutOfBounds` by fixing the view request.
#[derive(Error, Debug, Clone)]
pub enum TensorError {
    #[error("aligned allocation failed for {element_count} elements of {dtype:?}")]
    AllocError { element_count: usize, dtype: crate::DType },

    #[error("view of {requested} elements at offset {offset} exceeds source of {source_len} elements")]
    OutOfBounds {
        offset: usize,
        requested: usize,
        source_len: usize,
    },
}
