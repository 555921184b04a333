//! ASR manager: composes mel extraction, the encoder model, the TDT decoder,
//! the streaming window driver, and post-processing into a single
//! `transcribe` call per audio source.
//!
//! Microphone and system audio each own an independent predictor state so
//! the two can run concurrently without contaminating each other's decoder
//! context.

use std::sync::Arc;

use infer_adapter::{FeatureBundle, Model, TensorValue};
use tensor_core::{DType, Shape, Tensor};
use tracing::{debug, info, warn};

use crate::mel::{self, SAMPLE_RATE};
use crate::postprocess::{self, TokenTiming};
use crate::streaming::{self, WindowTokens};
use crate::tdt::{EncoderFrames, PredictorState, TdtDecoder};
use crate::tokenizer::Tokenizer;
use crate::SttError;

/// Which live audio stream a transcription call belongs to. Each source owns
/// an independent predictor state so the two can run concurrently without
/// stepping on each other's decoder context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioSource {
    Microphone,
    System,
}

/// The four models this pipeline's ASR half depends on, loaded once and
/// shared read-only across transcribe calls.
pub struct AsrModels {
    pub mel: Arc<dyn Model>,
    pub encoder: Arc<dyn Model>,
    pub predictor: Arc<dyn Model>,
    pub joint: Arc<dyn Model>,
    pub tokenizer: Tokenizer,
}

enum EngineState {
    Uninitialized,
    Ready(AsrModels),
}

/// Result returned to callers of `transcribe`.
#[derive(Debug, Clone, PartialEq)]
pub struct AsrResult {
    pub text: String,
    pub confidence: f64,
    pub duration_s: f64,
    pub processing_time_s: f64,
    pub token_timings: Vec<TokenTiming>,
}

pub struct AsrManager {
    state: EngineState,
    microphone_state: PredictorState,
    system_state: PredictorState,
}

impl Default for AsrManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AsrManager {
    pub fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
            microphone_state: PredictorState::reset(),
            system_state: PredictorState::reset(),
        }
    }

    pub fn load(&mut self, models: AsrModels) {
        info!(vocab_size = models.tokenizer.vocab_size(), "ASR manager models loaded");
        self.state = EngineState::Ready(models);
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, EngineState::Ready(_))
    }

    /// Zero a source's predictor state, as at a fresh utterance start.
    pub fn reset_state(&mut self, source: AudioSource) {
        *self.state_slot(source) = PredictorState::reset();
    }

    /// Drop loaded models, returning the manager to `Uninitialized`.
    pub fn cleanup(&mut self) {
        self.state = EngineState::Uninitialized;
    }

    fn state_slot(&mut self, source: AudioSource) -> &mut PredictorState {
        match source {
            AudioSource::Microphone => &mut self.microphone_state,
            AudioSource::System => &mut self.system_state,
        }
    }

    pub fn transcribe(&mut self, samples: &[f32], source: AudioSource) -> Result<AsrResult, SttError> {
        if samples.len() < SAMPLE_RATE as usize {
            return Err(SttError::InvalidAudioData {
                reason: format!("{} samples is less than 1s of audio", samples.len()),
            });
        }
        debug!(samples = samples.len(), ?source, "transcribing audio");

        let started = std::time::Instant::now();
        let models = match &self.state {
            EngineState::Ready(models) => models,
            EngineState::Uninitialized => return Err(SttError::NotInitialized),
        };
        let predictor_state = match source {
            AudioSource::Microphone => &mut self.microphone_state,
            AudioSource::System => &mut self.system_state,
        };

        let windows = streaming::plan_windows(samples);
        let mut accumulated = WindowTokens::default();

        for window in &windows {
            let decode_region = &window.samples[..window.actual_length];
            let (mel_tensor, mel_frames) = mel::extract_via_model(models.mel.as_ref(), decode_region)?;

            let (encoder_data, encoder_len, hidden_dim) = run_encoder(models.encoder.as_ref(), &mel_tensor, mel_frames)?;

            if window.start_frame_offset >= encoder_len {
                warn!(start_frame_offset = window.start_frame_offset, encoder_len, "window produced no frames past its context offset");
                continue;
            }

            let sliced = &encoder_data[window.start_frame_offset * hidden_dim..encoder_len * hidden_dim];
            let frames = EncoderFrames::new(sliced.to_vec(), encoder_len - window.start_frame_offset, hidden_dim);

            let decoder = TdtDecoder::new(models.predictor.as_ref(), models.joint.as_ref(), models.tokenizer.vocab_size());
            let out = decoder.decode_chunk(&frames, predictor_state)?;

            let absolute_frames: Vec<i64> = out.frame_indices.iter().map(|&f| f + window.start_frame_offset as i64).collect();
            let timestamps = streaming::to_absolute_seconds(&absolute_frames, window.start_sample);

            let window_tokens = WindowTokens {
                tokens: out.tokens,
                timestamps,
            };

            if window.is_first {
                accumulated = window_tokens;
            } else {
                streaming::merge_tokens(&mut accumulated, window_tokens, 2.0);
            }
        }

        let duration_s = samples.len() as f64 / SAMPLE_RATE as f64;
        let transcript = postprocess::postprocess_with_seconds(&models.tokenizer, &accumulated.tokens, &accumulated.timestamps, duration_s);

        Ok(AsrResult {
            text: transcript.text,
            confidence: transcript.confidence,
            duration_s,
            processing_time_s: started.elapsed().as_secs_f64(),
            token_timings: transcript.tokens,
        })
    }
}

/// Run the encoder model on a mel-spectrogram tensor, returning the flat
/// `[T, H]` encoder output, its effective length, and hidden dim.
fn run_encoder(encoder: &dyn Model, mel_tensor: &Tensor, mel_frames: usize) -> Result<(Vec<f32>, usize, usize), SttError> {
    let mut length = Tensor::alloc(Shape::new(vec![1]), DType::I32)?;
    length.as_i32_mut().unwrap()[0] = mel_frames as i32;

    let mut inputs = FeatureBundle::new();
    inputs.insert("audio_signal", TensorValue::F32(mel_tensor.clone()));
    inputs.insert("length", TensorValue::I32(length));

    let outputs = encoder.predict(inputs)?;
    let (encoder_output, shape_dims) = match outputs.get("encoder_output") {
        Some(TensorValue::F32(t)) => (t.as_f32().to_vec(), t.shape().dims().to_vec()),
        _ => return Err(SttError::Io("encoder_output missing or not f32".into())),
    };
    let hidden = *shape_dims.last().unwrap_or(&0);

    let effective_len = outputs
        .get("encoder_output_length")
        .and_then(|v| v.as_i32())
        .map(|s| s[0] as usize)
        .unwrap_or_else(|| shape_dims.get(1).copied().unwrap_or(0));

    Ok((encoder_output, effective_len, hidden))
}

#[cfg(test)]
mod tests {
    use super::*;
    use infer_adapter::RuntimeError;

    struct IdentityMel;
    impl Model for IdentityMel {
        fn predict(&self, inputs: FeatureBundle) -> Result<FeatureBundle, RuntimeError> {
            let length = inputs.get("audio_length").and_then(|v| v.as_i32()).unwrap()[0];
            let frames = ((length as usize).saturating_sub(400) / 160 + 1).max(1);
            let mut mel = Tensor::alloc(Shape::new(vec![1, frames, 80]), DType::F32).unwrap();
            mel.as_f32_mut().unwrap().fill(0.1);
            let mut mel_len = Tensor::alloc(Shape::new(vec![1]), DType::I32).unwrap();
            mel_len.as_i32_mut().unwrap()[0] = frames as i32;
            let mut bundle = FeatureBundle::new();
            bundle.insert("melspectrogram", TensorValue::F32(mel));
            bundle.insert("melspectrogram_length", TensorValue::I32(mel_len));
            Ok(bundle)
        }
    }

    struct IdentityEncoder {
        hidden_dim: usize,
    }
    impl Model for IdentityEncoder {
        fn predict(&self, inputs: FeatureBundle) -> Result<FeatureBundle, RuntimeError> {
            let length = inputs.get("length").and_then(|v| v.as_i32()).unwrap()[0] as usize;
            let t_out = (length / 8).max(1);
            let mut out = Tensor::alloc(Shape::new(vec![1, t_out, self.hidden_dim]), DType::F32).unwrap();
            out.as_f32_mut().unwrap().fill(0.0);
            let mut out_len = Tensor::alloc(Shape::new(vec![1]), DType::I32).unwrap();
            out_len.as_i32_mut().unwrap()[0] = t_out as i32;
            let mut bundle = FeatureBundle::new();
            bundle.insert("encoder_output", TensorValue::F32(out));
            bundle.insert("encoder_output_length", TensorValue::I32(out_len));
            Ok(bundle)
        }
    }

    struct AlwaysBlankPredictor;
    impl Model for AlwaysBlankPredictor {
        fn predict(&self, _inputs: FeatureBundle) -> Result<FeatureBundle, RuntimeError> {
            let out = Tensor::alloc(Shape::new(vec![1, 1, 16]), DType::F32).unwrap();
            let h = Tensor::alloc(Shape::new(vec![2, 1, 640]), DType::F32).unwrap();
            let c = Tensor::alloc(Shape::new(vec![2, 1, 640]), DType::F32).unwrap();
            let mut bundle = FeatureBundle::new();
            bundle.insert("decoder_output", TensorValue::F32(out));
            bundle.insert("h_out", TensorValue::F32(h));
            bundle.insert("c_out", TensorValue::F32(c));
            Ok(bundle)
        }
    }

    struct AlwaysBlankJoint {
        vocab_size: usize,
    }
    impl Model for AlwaysBlankJoint {
        fn predict(&self, _inputs: FeatureBundle) -> Result<FeatureBundle, RuntimeError> {
            let mut logits = vec![0.0f32; self.vocab_size + 5];
            logits[self.vocab_size - 1] = 10.0; // blank id == vocab_size - 1 in this test vocab
            logits[self.vocab_size + 1] = 10.0; // duration 1
            let mut t = Tensor::alloc(Shape::new(vec![logits.len()]), DType::F32).unwrap();
            t.as_f32_mut().unwrap().copy_from_slice(&logits);
            let mut bundle = FeatureBundle::new();
            bundle.insert("logits", TensorValue::F32(t));
            Ok(bundle)
        }
    }

    fn tiny_vocab(vocab_size: usize) -> Tokenizer {
        let mut content = String::new();
        for i in 0..vocab_size - 1 {
            content.push_str(&format!("\u{2581}t{i} {i}\n"));
        }
        content.push_str(&format!("<blk> {}", vocab_size - 1));
        Tokenizer::from_str(&content).unwrap()
    }

    #[test]
    fn audio_shorter_than_one_second_is_rejected() {
        let mut manager = AsrManager::new();
        let err = manager.transcribe(&[0.0; 100], AudioSource::Microphone).unwrap_err();
        assert!(matches!(err, SttError::InvalidAudioData { .. }));
    }

    #[test]
    fn transcribe_before_load_is_not_initialized() {
        let mut manager = AsrManager::new();
        let err = manager.transcribe(&vec![0.0; SAMPLE_RATE as usize], AudioSource::Microphone).unwrap_err();
        assert!(matches!(err, SttError::NotInitialized));
    }

    #[test]
    fn all_blank_audio_yields_empty_but_successful_transcript() {
        let vocab_size = 1024usize + 1; // keep BLANK_AND_SOS_ID's expected slot size out of this tiny test vocab
        let mut manager = AsrManager::new();
        manager.load(AsrModels {
            mel: Arc::new(IdentityMel),
            encoder: Arc::new(IdentityEncoder { hidden_dim: 16 }),
            predictor: Arc::new(AlwaysBlankPredictor),
            joint: Arc::new(AlwaysBlankJoint { vocab_size }),
            tokenizer: tiny_vocab(vocab_size),
        });

        let samples = vec![0.0f32; SAMPLE_RATE as usize * 2];
        let result = manager.transcribe(&samples, AudioSource::Microphone).unwrap();
        assert_eq!(result.text, "");
        assert_eq!(result.confidence, 0.1);
    }

    #[test]
    fn reset_state_zeroes_the_requested_source_only() {
        let mut manager = AsrManager::new();
        manager.microphone_state = PredictorState::reset();
        manager.reset_state(AudioSource::Microphone);
        assert!(manager.microphone_state.is_reset());
    }
}
