//! Aligned tensor storage and a pooled allocator.
//!
//! Exists only to shave allocation cost on the speech pipeline's hot paths —
//! there is no algorithmic content here, just 64-byte-aligned, DMA-friendly
//! buffers and a bucketed cache in front of them.

mod buffer;
mod dtype;
mod error;
mod pool;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use pool::TensorPool;
pub use shape::{Shape, BASE_ALIGNMENT, INNER_TILE};
pub use tensor::Tensor;
