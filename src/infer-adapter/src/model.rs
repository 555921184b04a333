//! The `Model` facade: a uniform `predict(inputs) -> outputs` seam over
//! whatever inference runtime actually backs a model.

use tracing::info;

use crate::bundle::FeatureBundle;
use crate::error::RuntimeError;

/// Compute-unit preference. A pure hint: it never changes a model's
/// observable outputs, only (in a real runtime) where the work happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeUnit {
    CpuOnly,
    CpuAndGpu,
    CpuAndAccelerator,
    Any,
}

/// Uniform facade over the opaque inference runtime. Implementors are
/// stateless with respect to `predict` — any state belongs to the caller
/// (e.g. the TDT decoder's predictor state), not to the model.
pub trait Model: Send + Sync {
    fn predict(&self, inputs: FeatureBundle) -> Result<FeatureBundle, RuntimeError>;
}

/// Wraps a closure-backed model and logs the compute-unit choice once at
/// construction. Prediction itself stays synchronous from the caller's
/// perspective; `predict_blocking` is provided for callers on an async task
/// that want to offload the call to a blocking thread pool.
pub struct BlockingModel<F> {
    name: &'static str,
    compute_unit: ComputeUnit,
    predict_fn: F,
}

impl<F> BlockingModel<F>
where
    F: Fn(FeatureBundle) -> Result<FeatureBundle, RuntimeError> + Send + Sync + 'static,
{
    pub fn new(name: &'static str, compute_unit: ComputeUnit, predict_fn: F) -> Self {
        info!(model = name, ?compute_unit, "model adapter configured");
        Self {
            name,
            compute_unit,
            predict_fn,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn compute_unit(&self) -> ComputeUnit {
        self.compute_unit
    }
}

impl<F> Model for BlockingModel<F>
where
    F: Fn(FeatureBundle) -> Result<FeatureBundle, RuntimeError> + Send + Sync,
{
    fn predict(&self, inputs: FeatureBundle) -> Result<FeatureBundle, RuntimeError> {
        (self.predict_fn)(inputs)
    }
}

/// Run a model's `predict` on a blocking thread pool, for callers that are
/// themselves on an async task and don't want to stall the executor.
pub async fn predict_blocking<M>(model: std::sync::Arc<M>, inputs: FeatureBundle) -> Result<FeatureBundle, RuntimeError>
where
    M: Model + 'static,
{
    tokio::task::spawn_blocking(move || model.predict(inputs))
        .await
        .map_err(|e| RuntimeError::new(format!("model task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::TensorValue;
    use tensor_core::{DType, Shape, Tensor};

    fn make_bundle(value: f32) -> FeatureBundle {
        let mut t = Tensor::alloc(Shape::new(vec![1]), DType::F32).unwrap();
        t.as_f32_mut().unwrap()[0] = value;
        let mut bundle = FeatureBundle::new();
        bundle.insert("x", TensorValue::F32(t));
        bundle
    }

    #[test]
    fn compute_unit_does_not_change_outputs() {
        for unit in [
            ComputeUnit::CpuOnly,
            ComputeUnit::CpuAndGpu,
            ComputeUnit::CpuAndAccelerator,
            ComputeUnit::Any,
        ] {
            let model = BlockingModel::new("identity", unit, |inputs| Ok(inputs));
            let out = model.predict(make_bundle(3.0)).unwrap();
            assert_eq!(out.require("x").unwrap().as_f32().unwrap(), &[3.0]);
        }
    }

    #[tokio::test]
    async fn predict_blocking_runs_off_the_caller_task() {
        let model = std::sync::Arc::new(BlockingModel::new("identity", ComputeUnit::Any, |inputs| Ok(inputs)));
        let out = predict_blocking(model, make_bundle(5.0)).await.unwrap();
        assert_eq!(out.require("x").unwrap().as_f32().unwrap(), &[5.0]);
    }
}
