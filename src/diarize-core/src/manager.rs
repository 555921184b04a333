//! Diarizer manager: chunks raw audio into fixed segmentation windows and
//! composes segmentation, embedding extraction, and speaker tracking into a
//! timed speaker timeline.

use std::sync::Arc;

use chrono::Utc;
use infer_adapter::Model;
use tracing::debug;

use crate::embedding::EmbeddingExtractor;
use crate::error::DiarizeError;
use crate::segmentation::{self, CHUNK_SAMPLES, FRAME_STEP_SEC};
use crate::tracker::{self, SpeakerTracker, TrackerConfig};

/// Default gap, in seconds, skipped between consecutive segmentation
/// chunks; 0 means chunks are contiguous.
pub const DEFAULT_CHUNK_OVERLAP_SEC: f64 = 0.0;

const SAMPLE_RATE: usize = 16_000;

#[derive(Debug, Clone, PartialEq)]
pub struct TimedSpeakerSegment {
    pub speaker_id: String,
    pub start_s: f64,
    pub end_s: f64,
    pub quality: f32,
}

#[derive(Debug, Clone, Default)]
pub struct DiarizationResult {
    pub segments: Vec<TimedSpeakerSegment>,
    pub speaker_registry: std::collections::HashMap<String, Vec<f32>>,
}

pub struct DiarizerModels {
    pub segmentation: Arc<dyn Model>,
    pub embedding: Arc<dyn Model>,
}

pub struct DiarizerManager {
    models: Option<DiarizerModels>,
    tracker: SpeakerTracker,
    extractor: EmbeddingExtractor,
    chunk_overlap_sec: f64,
}

impl Default for DiarizerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DiarizerManager {
    pub fn new() -> Self {
        Self {
            models: None,
            tracker: SpeakerTracker::new(TrackerConfig::default()),
            extractor: EmbeddingExtractor::default(),
            chunk_overlap_sec: DEFAULT_CHUNK_OVERLAP_SEC,
        }
    }

    pub fn with_chunk_overlap_sec(mut self, overlap_sec: f64) -> Self {
        self.chunk_overlap_sec = overlap_sec;
        self
    }

    pub fn load(&mut self, models: DiarizerModels) {
        self.models = Some(models);
    }

    pub fn is_ready(&self) -> bool {
        self.models.is_some()
    }

    pub fn cleanup(&mut self) {
        self.models = None;
    }

    /// Preserve externally-registered speaker ids verbatim and advance the
    /// tracker's id counter past any numeric collision.
    pub fn initialize_known_speakers(&self, speakers: Vec<(String, Vec<f32>)>) {
        self.tracker.initialize_known_speakers(speakers, Utc::now());
    }

    pub fn diarize(&self, samples: &[f32]) -> Result<DiarizationResult, DiarizeError> {
        let models = self.models.as_ref().ok_or(DiarizeError::NotInitialized)?;
        if samples.is_empty() {
            return Err(DiarizeError::InvalidAudioData { reason: "empty audio buffer".to_string() });
        }

        let stride_samples = (CHUNK_SAMPLES as f64 - self.chunk_overlap_sec * SAMPLE_RATE as f64).max(1.0) as usize;

        let mut segments = Vec::new();
        let mut chunk_start_sample = 0usize;

        while chunk_start_sample < samples.len() {
            let chunk_start_sec = chunk_start_sample as f64 / SAMPLE_RATE as f64;
            let chunk_end_sample = (chunk_start_sample + CHUNK_SAMPLES).min(samples.len());

            let mut padded = vec![0.0f32; CHUNK_SAMPLES];
            padded[..chunk_end_sample - chunk_start_sample].copy_from_slice(&samples[chunk_start_sample..chunk_end_sample]);

            debug!(chunk_start_sec, "diarizing segmentation chunk");

            let seg_out = segmentation::segment_chunk(models.segmentation.as_ref(), &padded, chunk_start_sec)?;
            let slot_embeddings = self.extractor.extract(models.embedding.as_ref(), &padded, &seg_out.activity)?;

            let min_activity_frames = 10;
            let raw_segments = tracker::candidate_segments(&seg_out.activity, min_activity_frames);

            for raw in raw_segments {
                let start_s = chunk_start_sec + raw.start_frame as f64 * FRAME_STEP_SEC;
                let end_s = chunk_start_sec + raw.end_frame as f64 * FRAME_STEP_SEC;
                let duration = end_s - start_s;
                if duration < self.tracker_min_speech_duration() {
                    continue;
                }

                let embedding = &slot_embeddings.embeddings[raw.slot];
                if let Some(speaker) = self.tracker.assign(embedding, duration, Utc::now()) {
                    segments.push(TimedSpeakerSegment {
                        speaker_id: speaker.id,
                        start_s,
                        end_s,
                        quality: 1.0,
                    });
                }
            }

            if chunk_end_sample >= samples.len() {
                break;
            }
            chunk_start_sample += stride_samples;
        }

        segments.sort_by(|a, b| a.start_s.partial_cmp(&b.start_s).unwrap());

        let speaker_registry = (1..)
            .map(|n| n.to_string())
            .take_while(|id| self.tracker.get(id).is_some())
            .filter_map(|id| self.tracker.get(&id).map(|s| (id, s.current_embedding)))
            .collect();

        Ok(DiarizationResult { segments, speaker_registry })
    }

    fn tracker_min_speech_duration(&self) -> f64 {
        tracker::DEFAULT_MIN_SPEECH_DURATION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infer_adapter::{FeatureBundle, RuntimeError, TensorValue};
    use tensor_core::{DType, Shape, Tensor};

    struct AllSilentSegmentation;
    impl Model for AllSilentSegmentation {
        fn predict(&self, _inputs: FeatureBundle) -> Result<FeatureBundle, RuntimeError> {
            let num_frames = CHUNK_SAMPLES / 256;
            let mut logits = vec![0.0f32; num_frames * 7];
            for f in 0..num_frames {
                logits[f * 7] = 10.0; // class 0 = silence
            }
            let mut t = Tensor::alloc(Shape::new(vec![logits.len()]), DType::F32).unwrap();
            t.as_f32_mut().unwrap().copy_from_slice(&logits);
            let mut bundle = FeatureBundle::new();
            bundle.insert("segments", TensorValue::F32(t));
            Ok(bundle)
        }
    }

    struct ZeroEmbedding;
    impl Model for ZeroEmbedding {
        fn predict(&self, _inputs: FeatureBundle) -> Result<FeatureBundle, RuntimeError> {
            let mut t = Tensor::alloc(Shape::new(vec![3 * 256]), DType::F32).unwrap();
            t.as_f32_mut().unwrap().fill(0.0);
            let mut bundle = FeatureBundle::new();
            bundle.insert("embedding", TensorValue::F32(t));
            Ok(bundle)
        }
    }

    #[test]
    fn not_initialized_before_load() {
        let manager = DiarizerManager::new();
        let err = manager.diarize(&vec![0.0; CHUNK_SAMPLES]).unwrap_err();
        assert!(matches!(err, DiarizeError::NotInitialized));
    }

    #[test]
    fn empty_audio_is_rejected() {
        let mut manager = DiarizerManager::new();
        manager.load(DiarizerModels {
            segmentation: Arc::new(AllSilentSegmentation),
            embedding: Arc::new(ZeroEmbedding),
        });
        let err = manager.diarize(&[]).unwrap_err();
        assert!(matches!(err, DiarizeError::InvalidAudioData { .. }));
    }

    #[test]
    fn all_silent_audio_produces_no_segments() {
        let mut manager = DiarizerManager::new();
        manager.load(DiarizerModels {
            segmentation: Arc::new(AllSilentSegmentation),
            embedding: Arc::new(ZeroEmbedding),
        });
        let result = manager.diarize(&vec![0.0; CHUNK_SAMPLES]).unwrap();
        assert!(result.segments.is_empty());
        assert!(result.speaker_registry.is_empty());
    }
}
