//! Embedding extractor: masks a chunk's waveform per local speaker slot and
//! runs the embedding model, skipping slots with negligible activity.

use infer_adapter::{FeatureBundle, Model, RuntimeError, TensorValue};
use tensor_core::{DType, Shape, Tensor};
use tracing::debug;

use crate::segmentation::CHUNK_SAMPLES;

const NUM_SLOTS: usize = 3;
const EMBEDDING_DIM: usize = 256;

/// Below this total per-slot activity (in frames), the extractor returns a
/// zero vector instead of invoking the model for that slot.
pub const DEFAULT_MIN_ACTIVITY_THRESHOLD: usize = 10;

/// Default overlap threshold for a frame to count toward a slot's mask.
const DEFAULT_ACTIVITY_THRESHOLD: f32 = 0.30;
/// Reduced threshold applied when another slot is active in the same frame,
/// so overlapped speech is detected earlier.
const OVERLAP_ACTIVITY_THRESHOLD: f32 = 0.15;
/// Frames where the cross-slot activity sum is at or above this are treated
/// as overlapped speech and excluded from every slot's clean mask.
const CLEAN_FRAME_SUM_LIMIT: f32 = 2.0;

/// Build the "clean" mask: a frame contributes to a slot's embedding only
/// if at most one speaker is active in it.
pub struct CleanMask;

impl CleanMask {
    /// `activity` is `[F, 3]` binarized segmentation output. Returns `[3, F]`
    /// masks, one per local slot.
    pub fn compute(activity: &[[f32; NUM_SLOTS]]) -> Vec<Vec<f32>> {
        let num_frames = activity.len();
        let mut masks = vec![vec![0.0f32; num_frames]; NUM_SLOTS];

        for (f, frame) in activity.iter().enumerate() {
            let sum: f32 = frame.iter().sum();
            if sum < CLEAN_FRAME_SUM_LIMIT {
                for slot in 0..NUM_SLOTS {
                    masks[slot][f] = frame[slot];
                }
            }
        }
        masks
    }
}

/// `[3, 256]` embeddings, one per local slot, zero for slots below the
/// activity threshold.
#[derive(Debug, Clone)]
pub struct SlotEmbeddings {
    pub embeddings: [Vec<f32>; NUM_SLOTS],
}

pub struct EmbeddingExtractor {
    min_activity_threshold: usize,
}

impl Default for EmbeddingExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_ACTIVITY_THRESHOLD)
    }
}

impl EmbeddingExtractor {
    pub fn new(min_activity_threshold: usize) -> Self {
        Self { min_activity_threshold }
    }

    /// Extract one embedding per local slot from a 10s waveform chunk and
    /// its `[F, 3]` activity matrix.
    pub fn extract(&self, model: &dyn Model, waveform: &[f32], activity: &[[f32; NUM_SLOTS]]) -> Result<SlotEmbeddings, RuntimeError> {
        debug_assert_eq!(waveform.len(), CHUNK_SAMPLES);

        let masks = CleanMask::compute(activity);
        let num_frames = activity.len();

        let active_slots: Vec<usize> = (0..NUM_SLOTS)
            .filter(|&slot| masks[slot].iter().sum::<f32>() as usize >= self.min_activity_threshold)
            .collect();

        if active_slots.is_empty() {
            debug!("no slot meets min_activity_threshold, skipping embedding model call");
            return Ok(SlotEmbeddings {
                embeddings: [vec![0.0; EMBEDDING_DIM], vec![0.0; EMBEDDING_DIM], vec![0.0; EMBEDDING_DIM]],
            });
        }

        let mut waveform_tensor = Tensor::alloc(Shape::new(vec![NUM_SLOTS, CHUNK_SAMPLES]), DType::F32).map_err(|e| RuntimeError::new(e.to_string()))?;
        {
            let data = waveform_tensor.as_f32_mut().unwrap();
            for slot in 0..NUM_SLOTS {
                data[slot * CHUNK_SAMPLES..(slot + 1) * CHUNK_SAMPLES].copy_from_slice(waveform);
            }
        }

        let mut mask_tensor = Tensor::alloc(Shape::new(vec![NUM_SLOTS, num_frames]), DType::F32).map_err(|e| RuntimeError::new(e.to_string()))?;
        {
            let data = mask_tensor.as_f32_mut().unwrap();
            for slot in 0..NUM_SLOTS {
                data[slot * num_frames..(slot + 1) * num_frames].copy_from_slice(&masks[slot]);
            }
        }

        let mut inputs = FeatureBundle::new();
        inputs.insert("waveform", TensorValue::F32(waveform_tensor));
        inputs.insert("mask", TensorValue::F32(mask_tensor));

        let outputs = model.predict(inputs)?;
        let embedding_data = outputs
            .get("embedding")
            .and_then(|v| v.as_f32())
            .ok_or_else(|| RuntimeError::new("embedding model did not return `embedding`"))?;

        let mut embeddings: [Vec<f32>; NUM_SLOTS] = [vec![0.0; EMBEDDING_DIM], vec![0.0; EMBEDDING_DIM], vec![0.0; EMBEDDING_DIM]];
        for slot in 0..NUM_SLOTS {
            if active_slots.contains(&slot) {
                embeddings[slot] = embedding_data[slot * EMBEDDING_DIM..(slot + 1) * EMBEDDING_DIM].to_vec();
            }
        }

        Ok(SlotEmbeddings { embeddings })
    }
}

/// The activity threshold to apply to a frame, lowered when another slot in
/// the same frame is already above [`DEFAULT_ACTIVITY_THRESHOLD`].
pub fn overlap_adaptive_threshold(frame: &[f32; NUM_SLOTS], slot: usize) -> f32 {
    let other_active = frame.iter().enumerate().any(|(i, &v)| i != slot && v > DEFAULT_ACTIVITY_THRESHOLD);
    if other_active {
        OVERLAP_ACTIVITY_THRESHOLD
    } else {
        DEFAULT_ACTIVITY_THRESHOLD
    }
}
