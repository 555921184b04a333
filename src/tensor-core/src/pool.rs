//! A best-effort tensor cache keyed by (shape, dtype).

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::dtype::DType;
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Maximum number of idle tensors retained per (shape, dtype) bucket.
const POOL_BUCKET_CAP: usize = 8;

type BucketKey = (Vec<usize>, DType);

/// Many-producer, many-consumer tensor cache. `get`/`put` are O(1) amortized;
/// internally a map guarded by a single mutex.
#[derive(Default)]
pub struct TensorPool {
    buckets: Mutex<HashMap<BucketKey, Vec<Tensor>>>,
}

impl TensorPool {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Return a tensor of `shape`/`dtype`, reused from the pool if available.
    /// A pooled `f32` tensor is guaranteed zero-filled before being handed
    /// out; falls back to a fresh allocation (and, on allocation failure, is
    /// propagated to the caller) when the bucket is empty.
    pub fn get(&self, shape: Shape, dtype: DType) -> Result<Tensor, crate::TensorError> {
        let key = (shape.dims().to_vec(), dtype);
        if let Some(tensor) = {
            let mut buckets = self.buckets.lock();
            buckets.get_mut(&key).and_then(|bucket| bucket.pop())
        } {
            return Ok(zero_if_f32(tensor));
        }
        Tensor::alloc(shape, dtype)
    }

    /// Return a tensor to the pool for reuse. Dropped silently once its
    /// bucket is at capacity.
    pub fn put(&self, tensor: Tensor) {
        let key = (tensor.shape().dims().to_vec(), tensor.dtype());
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key).or_default();
        if bucket.len() < POOL_BUCKET_CAP {
            bucket.push(tensor);
        }
    }

    /// Eagerly allocate and stash tensors for the given shapes so the first
    /// real `get` call doesn't pay allocation cost. Failures are logged, not
    /// propagated — prewarming is an optimization, not a correctness
    /// requirement.
    pub fn prewarm(&self, shapes: &[(Shape, DType)]) {
        for (shape, dtype) in shapes {
            match Tensor::alloc(shape.clone(), *dtype) {
                Ok(tensor) => {
                    debug!(?dtype, dims = ?shape.dims(), "prewarmed tensor pool bucket");
                    self.put(tensor);
                }
                Err(e) => warn!(?dtype, dims = ?shape.dims(), error = %e, "prewarm allocation failed"),
            }
        }
    }
}

fn zero_if_f32(mut tensor: Tensor) -> Tensor {
    if tensor.dtype() == DType::F32 {
        if let Some(data) = tensor.as_f32_mut() {
            data.fill(0.0);
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reused_f32_tensor_is_zeroed() {
        let pool = TensorPool::new();
        let mut t = pool.get(Shape::new(vec![4]), DType::F32).unwrap();
        t.as_f32_mut().unwrap().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        pool.put(t);

        let reused = pool.get(Shape::new(vec![4]), DType::F32).unwrap();
        assert!(reused.as_f32().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn bucket_capacity_is_bounded() {
        let pool = TensorPool::new();
        for _ in 0..(POOL_BUCKET_CAP + 4) {
            let t = Tensor::alloc(Shape::new(vec![2]), DType::F32).unwrap();
            pool.put(t);
        }
        let bucket_len = pool
            .buckets
            .lock()
            .get(&(vec![2], DType::F32))
            .map(|b| b.len())
            .unwrap_or(0);
        assert_eq!(bucket_len, POOL_BUCKET_CAP);
    }
}
