//! Segmentation processor: runs the powerset segmentation model on a fixed
//! 10s chunk and converts its "which subset of 3 local speaker slots is
//! active" output into a binary per-frame activity matrix.

use infer_adapter::{FeatureBundle, Model, RuntimeError, TensorValue};
use tensor_core::{DType, Shape, Tensor};
use tracing::debug;

/// Samples in one fixed segmentation chunk (10s at 16kHz).
pub const CHUNK_SAMPLES: usize = 160_000;

/// Frame step, in seconds, of the segmentation model's output.
pub const FRAME_STEP_SEC: f64 = 0.016875;

/// Frame receptive width, in seconds.
pub const FRAME_DURATION_SEC: f64 = 0.06194;

const NUM_SLOTS: usize = 3;
const NUM_CLASSES: usize = 7;

/// Canonical ordering of the 7 powerset classes over `{0, 1, 2}`, excluding
/// the 3-of-3 combination.
pub const POWERSET_ORDER: [&[usize]; NUM_CLASSES] = [&[], &[0], &[1], &[2], &[0, 1], &[0, 2], &[1, 2]];

/// Per-chunk sliding-window metadata carried alongside the binarized matrix.
#[derive(Debug, Clone, Copy)]
pub struct SlidingWindowMeta {
    pub start_sec: f64,
    pub duration_sec: f64,
}

/// `[F, 3]` binary activity matrix plus its sliding-window metadata.
#[derive(Debug, Clone)]
pub struct SegmentationOutput {
    pub activity: Vec<[f32; NUM_SLOTS]>,
    pub window: SlidingWindowMeta,
}

/// Run the segmentation model on one zero-padded 10s chunk and binarize its
/// powerset logits into a per-frame, per-slot activity matrix.
pub fn segment_chunk(model: &dyn Model, padded_samples: &[f32], chunk_start_sec: f64) -> Result<SegmentationOutput, RuntimeError> {
    debug_assert_eq!(padded_samples.len(), CHUNK_SAMPLES);

    let mut audio = Tensor::alloc(Shape::new(vec![1, 1, CHUNK_SAMPLES]), DType::F32).map_err(|e| RuntimeError::new(e.to_string()))?;
    audio.as_f32_mut().unwrap().copy_from_slice(padded_samples);

    let mut inputs = FeatureBundle::new();
    inputs.insert("audio", TensorValue::F32(audio));

    let outputs = model.predict(inputs)?;
    let segments = outputs
        .get("segments")
        .and_then(|v| v.as_f32())
        .ok_or_else(|| RuntimeError::new("segmentation model did not return `segments`"))?;

    let num_frames = segments.len() / NUM_CLASSES;
    debug!(num_frames, "segmentation produced powerset logits");

    let mut activity = Vec::with_capacity(num_frames);
    for frame in segments.chunks_exact(NUM_CLASSES) {
        activity.push(binarize_frame(frame));
    }

    Ok(SegmentationOutput {
        activity,
        window: SlidingWindowMeta {
            start_sec: chunk_start_sec,
            duration_sec: FRAME_DURATION_SEC,
        },
    })
}

/// Argmax the 7 powerset class logits, then set each speaker slot named by
/// the winning class to 1.
fn binarize_frame(class_logits: &[f32]) -> [f32; NUM_SLOTS] {
    let mut best_idx = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in class_logits.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = i;
        }
    }

    let mut slots = [0.0f32; NUM_SLOTS];
    for &slot in POWERSET_ORDER[best_idx] {
        slots[slot] = 1.0;
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubSegmentation {
        winning_class_per_frame: Vec<usize>,
    }
    impl Model for StubSegmentation {
        fn predict(&self, _inputs: FeatureBundle) -> Result<FeatureBundle, RuntimeError> {
            let mut logits = Vec::with_capacity(self.winning_class_per_frame.len() * NUM_CLASSES);
            for &winner in &self.winning_class_per_frame {
                let mut frame = vec![0.0f32; NUM_CLASSES];
                frame[winner] = 10.0;
                logits.extend(frame);
            }
            let mut t = Tensor::alloc(Shape::new(vec![logits.len()]), DType::F32).unwrap();
            t.as_f32_mut().unwrap().copy_from_slice(&logits);
            let mut bundle = FeatureBundle::new();
            bundle.insert("segments", TensorValue::F32(t));
            Ok(bundle)
        }
    }

    #[test]
    fn binarized_row_sums_to_powerset_class_cardinality() {
        let model = StubSegmentation {
            winning_class_per_frame: vec![0, 1, 4, 6],
        };
        let out = segment_chunk(&model, &vec![0.0; CHUNK_SAMPLES], 0.0).unwrap();
        assert_eq!(out.activity.len(), 4);
        assert_eq!(out.activity[0].iter().sum::<f32>(), 0.0); // {}
        assert_eq!(out.activity[1].iter().sum::<f32>(), 1.0); // {0}
        assert_eq!(out.activity[2].iter().sum::<f32>(), 2.0); // {0,1}
        assert_eq!(out.activity[3].iter().sum::<f32>(), 2.0); // {1,2}
    }

    #[test]
    fn class_zero_is_silence_all_slots_zero() {
        let model = StubSegmentation {
            winning_class_per_frame: vec![0],
        };
        let out = segment_chunk(&model, &vec![0.0; CHUNK_SAMPLES], 0.0).unwrap();
        assert_eq!(out.activity[0], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn window_metadata_carries_chunk_start() {
        let model = StubSegmentation {
            winning_class_per_frame: vec![0],
        };
        let out = segment_chunk(&model, &vec![0.0; CHUNK_SAMPLES], 20.0).unwrap();
        assert_eq!(out.window.start_sec, 20.0);
        assert!((out.window.duration_sec - FRAME_DURATION_SEC).abs() < 1e-9);
    }
}
