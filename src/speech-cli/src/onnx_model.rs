//! The concrete `infer_adapter::Model` backend: an ONNX Runtime session.
//!
//! Marshals any named `FeatureBundle` across the ONNX Runtime boundary by
//! iterating its entries rather than assuming fixed encoder/decoder/joiner
//! input names.

use std::path::Path;

use infer_adapter::{FeatureBundle, Model, RuntimeError, TensorValue};
use ort::session::Session;
use ort::value::Tensor as OrtTensor;
use ort::value::Value;
use tensor_core::{DType, Shape, Tensor as CoreTensor};
use tracing::{info, warn};

/// Wraps one ONNX Runtime session behind the `Model` facade.
pub struct OnnxModel {
    name: &'static str,
    session: Session,
}

impl OnnxModel {
    pub fn load(name: &'static str, path: &Path, num_threads: usize, use_gpu: bool) -> anyhow::Result<Self> {
        let builder = Session::builder()?.with_intra_threads(num_threads)?;

        let builder = if use_gpu {
            match builder.with_execution_providers([ort::execution_providers::CUDAExecutionProvider::default().build()]) {
                Ok(b) => {
                    info!(model = name, "CUDA execution provider enabled");
                    b
                }
                Err(e) => {
                    warn!(model = name, error = %e, "falling back to CPU");
                    Session::builder()?.with_intra_threads(num_threads)?
                }
            }
        } else {
            builder
        };

        let session = builder.commit_from_file(path)?;
        info!(model = name, path = %path.display(), "ONNX session loaded");
        Ok(Self { name, session })
    }
}

impl Model for OnnxModel {
    fn predict(&self, inputs: FeatureBundle) -> Result<FeatureBundle, RuntimeError> {
        let mut ort_inputs: Vec<(String, Value)> = Vec::new();
        for (key, value) in inputs.iter() {
            let ort_value: Value = match value {
                TensorValue::F32(t) => {
                    let dims: Vec<i64> = t.shape().dims().iter().map(|&d| d as i64).collect();
                    OrtTensor::from_array((dims, t.as_f32().to_vec().into_boxed_slice()))
                        .map_err(|e| RuntimeError::new(format!("{} input `{key}`: {e}", self.name)))?
                        .into()
                }
                TensorValue::I32(t) => {
                    let dims: Vec<i64> = t.shape().dims().iter().map(|&d| d as i64).collect();
                    OrtTensor::from_array((dims, t.as_i32().to_vec().into_boxed_slice()))
                        .map_err(|e| RuntimeError::new(format!("{} input `{key}`: {e}", self.name)))?
                        .into()
                }
            };
            ort_inputs.push((key.clone(), ort_value));
        }

        let outputs = self
            .session
            .run(ort_inputs)
            .map_err(|e| RuntimeError::new(format!("{} run failed: {e}", self.name)))?;

        let mut bundle = FeatureBundle::new();
        for (name, value) in outputs.iter() {
            if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
                let mut tensor = CoreTensor::alloc(Shape::new(dims), DType::F32).map_err(|e| RuntimeError::new(e.to_string()))?;
                tensor.as_f32_mut().expect("freshly allocated tensor owns its storage").copy_from_slice(data);
                bundle.insert(name.to_string(), TensorValue::F32(tensor));
            } else if let Ok((shape, data)) = value.try_extract_tensor::<i32>() {
                let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
                let mut tensor = CoreTensor::alloc(Shape::new(dims), DType::I32).map_err(|e| RuntimeError::new(e.to_string()))?;
                tensor.as_i32_mut().expect("freshly allocated tensor owns its storage").copy_from_slice(data);
                bundle.insert(name.to_string(), TensorValue::I32(tensor));
            } else {
                warn!(model = self.name, output = name, "skipping output of unsupported dtype");
            }
        }

        Ok(bundle)
    }
}
