//! The named-tensor boundary passed to and returned from a model.

use std::collections::HashMap;

use tensor_core::Tensor;

use crate::error::ProcessingFailed;

/// A tagged tensor value, so a `FeatureBundle` can hold mixed dtypes without
/// every caller threading a generic parameter through (see DESIGN.md:
/// "dynamic typed feature dictionaries").
#[derive(Clone)]
pub enum TensorValue {
    F32(Tensor),
    I32(Tensor),
}

impl TensorValue {
    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            TensorValue::F32(t) => Some(t.as_f32()),
            TensorValue::I32(_) => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            TensorValue::I32(t) => Some(t.as_i32()),
            TensorValue::F32(_) => None,
        }
    }
}

/// Mapping from name to tensor, the sole boundary type crossed when calling
/// or receiving from a `Model`. Keys are the bit-exact names documented on
/// the model I/O table.
#[derive(Clone, Default)]
pub struct FeatureBundle(HashMap<String, TensorValue>);

impl FeatureBundle {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: TensorValue) -> &mut Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&TensorValue> {
        self.0.get(key)
    }

    /// Iterate the bundle's entries, e.g. to marshal every input across a
    /// concrete runtime boundary generically rather than by named field.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TensorValue)> {
        self.0.iter()
    }

    /// Fetch a required key, surfacing a `ProcessingFailed` with the missing
    /// key name rather than panicking — this is the model-output boundary,
    /// where a shape or naming mismatch is a processing error, not a bug in
    /// the caller.
    pub fn require(&self, key: &str) -> Result<&TensorValue, ProcessingFailed> {
        self.0
            .get(key)
            .ok_or_else(|| ProcessingFailed::new(format!("missing expected output key `{key}`")))
    }
}
