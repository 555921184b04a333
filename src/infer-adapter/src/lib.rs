//! Inference adapter: a uniform `Model::predict(inputs) -> outputs` facade
//! over whatever runtime actually executes the fixed neural models.

mod bundle;
mod error;
mod model;

pub use bundle::{FeatureBundle, TensorValue};
pub use error::{ProcessingFailed, RuntimeError};
pub use model::{predict_blocking, BlockingModel, ComputeUnit, Model};
