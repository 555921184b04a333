//! Token-and-Duration Transducer (TDT) greedy decoder.
//!
//! A stateful decoder over encoder frames: at each emission step a predictor
//! (recurrent) module and a joint network jointly pick a subword token and a
//! non-negative frame jump. Blank emissions with a zero jump are forced to
//! advance one frame so the decoder never stalls.

use infer_adapter::{FeatureBundle, Model, RuntimeError, TensorValue};
use tensor_core::{DType, Shape, Tensor};
use tracing::warn;

use crate::mel::ENCODER_FRAME_DURATION_SEC;
use crate::tokenizer::BLANK_AND_SOS_ID;

/// Fixed duration set the joint network's duration head predicts over.
pub const DURATIONS: [i64; 5] = [0, 1, 2, 3, 4];

/// Predictor LSTM layer/hidden dims: state shape is `[2, 1, 640]`.
const PREDICTOR_LAYERS: usize = 2;
const PREDICTOR_HIDDEN: usize = 640;

/// Caps consecutive non-blank emissions at a single encoder frame before the
/// decoder forces an advance.
const DEFAULT_MAX_SYMBOLS_PER_STEP: usize = 10;

/// One encoder-frame tensor for a chunk: `[1, T, H]`, `T` the effective
/// length (which may be less than the frame tensor's padded capacity).
pub struct EncoderFrames {
    data: Vec<f32>,
    effective_length: usize,
    hidden_dim: usize,
}

impl EncoderFrames {
    pub fn new(data: Vec<f32>, effective_length: usize, hidden_dim: usize) -> Self {
        debug_assert_eq!(data.len(), effective_length * hidden_dim, "encoder frame data must cover exactly effective_length * hidden_dim elements");
        Self {
            data,
            effective_length,
            hidden_dim,
        }
    }

    pub fn effective_length(&self) -> usize {
        self.effective_length
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    fn frame(&self, t: usize) -> &[f32] {
        let t = t.min(self.effective_length.saturating_sub(1));
        let start = t * self.hidden_dim;
        &self.data[start..start + self.hidden_dim]
    }
}

/// Carried across decode steps and across audio chunks.
pub struct PredictorState {
    h: Tensor,
    c: Tensor,
    last_token: Option<i32>,
    predictor_output: Option<Vec<f32>>,
    time_jump: Option<i64>,
}

impl PredictorState {
    /// A fresh, all-zero state (as at utterance start).
    pub fn reset() -> Self {
        let h = Tensor::alloc(Shape::new(vec![PREDICTOR_LAYERS, 1, PREDICTOR_HIDDEN]), DType::F32).expect("state alloc");
        let c = Tensor::alloc(Shape::new(vec![PREDICTOR_LAYERS, 1, PREDICTOR_HIDDEN]), DType::F32).expect("state alloc");
        Self {
            h,
            c,
            last_token: None,
            predictor_output: None,
            time_jump: None,
        }
    }

    /// True at rest: either freshly reset (all-zero, no context) or exactly
    /// the predictor's last output.
    pub fn is_reset(&self) -> bool {
        self.last_token.is_none() && self.predictor_output.is_none() && self.h.as_f32().iter().all(|&v| v == 0.0) && self.c.as_f32().iter().all(|&v| v == 0.0)
    }

    pub fn last_token(&self) -> Option<i32> {
        self.last_token
    }

    pub fn time_jump(&self) -> Option<i64> {
        self.time_jump
    }
}

impl Clone for PredictorState {
    fn clone(&self) -> Self {
        let mut h = Tensor::alloc(self.h.shape().clone(), DType::F32).expect("state alloc");
        h.as_f32_mut().unwrap().copy_from_slice(self.h.as_f32());
        let mut c = Tensor::alloc(self.c.shape().clone(), DType::F32).expect("state alloc");
        c.as_f32_mut().unwrap().copy_from_slice(self.c.as_f32());
        Self {
            h,
            c,
            last_token: self.last_token,
            predictor_output: self.predictor_output.clone(),
            time_jump: self.time_jump,
        }
    }
}

/// Result of decoding one chunk: non-blank token ids and the encoder frame
/// index each was emitted at (same length, index-aligned).
#[derive(Debug, Clone, Default)]
pub struct DecodeOutput {
    pub tokens: Vec<i32>,
    pub frame_indices: Vec<i64>,
    pub final_time_index: i64,
}

pub struct TdtDecoder<'a> {
    predictor: &'a dyn Model,
    joint: &'a dyn Model,
    vocab_size: usize,
    max_symbols_per_step: Option<usize>,
}

impl<'a> TdtDecoder<'a> {
    pub fn new(predictor: &'a dyn Model, joint: &'a dyn Model, vocab_size: usize) -> Self {
        Self {
            predictor,
            joint,
            vocab_size,
            max_symbols_per_step: Some(DEFAULT_MAX_SYMBOLS_PER_STEP),
        }
    }

    pub fn with_max_symbols_per_step(mut self, max: Option<usize>) -> Self {
        self.max_symbols_per_step = max;
        self
    }

    /// Decode one chunk's encoder frames, threading `state` in and out.
    pub fn decode_chunk(&self, encoder: &EncoderFrames, state: &mut PredictorState) -> Result<DecodeOutput, RuntimeError> {
        let t_len = encoder.effective_length() as i64;
        if t_len < 2 {
            warn!(t_len, "encoder effective length < 2, emitting empty token sequence");
            return Ok(DecodeOutput {
                final_time_index: t_len.max(0),
                ..Default::default()
            });
        }

        let mut tokens = Vec::new();
        let mut frame_indices = Vec::new();

        let mut time_index: i64 = 0;
        let mut safe_time_index: usize = 0;
        let mut active = true;
        let mut input_token = state.last_token.unwrap_or(BLANK_AND_SOS_ID);

        let mut same_frame_count: usize = 0;
        let mut last_frame_seen: i64 = -1;

        while active {
            // (a) run predictor once per outer round.
            let (predictor_output, new_h, new_c) = self.run_predictor(input_token, &state.h, &state.c)?;

            loop {
                // (b)-(c) fetch frame, run joint network.
                let frame = encoder.frame(safe_time_index);
                let logits = self.run_joint(frame, &predictor_output)?;

                // (d)-(e) split and argmax.
                let (token, duration_idx) = split_argmax(&logits, self.vocab_size);
                let mut duration = DURATIONS[duration_idx];

                // (f) anti-stall.
                if token == BLANK_AND_SOS_ID && duration == 0 {
                    duration = 1;
                }

                // (g)-(h)
                let emission_frame = time_index;
                time_index += duration;
                safe_time_index = (time_index.max(0) as usize).min(t_len as usize - 1);
                active = time_index < t_len;

                if token != BLANK_AND_SOS_ID {
                    tokens.push(token);
                    frame_indices.push(emission_frame);
                    state.last_token = Some(token);
                    state.h = new_h;
                    state.c = new_c;
                    state.predictor_output = Some(predictor_output.clone());
                    input_token = token;

                    if emission_frame == last_frame_seen {
                        same_frame_count += 1;
                    } else {
                        last_frame_seen = emission_frame;
                        same_frame_count = 1;
                    }

                    // (k) symbol-count safeguard.
                    if let Some(max_syms) = self.max_symbols_per_step {
                        if same_frame_count > max_syms {
                            time_index += 1;
                            safe_time_index = (time_index.max(0) as usize).min(t_len as usize - 1);
                            active = time_index < t_len;
                            same_frame_count = 0;
                        }
                    }

                    break;
                }

                if !active {
                    break;
                }
                // (i) inner blank loop continues without rerunning the predictor.
            }
        }

        state.time_jump = Some(time_index - t_len);

        Ok(DecodeOutput {
            tokens,
            frame_indices,
            final_time_index: time_index,
        })
    }

    fn run_predictor(&self, input_token: i32, h: &Tensor, c: &Tensor) -> Result<(Vec<f32>, Tensor, Tensor), RuntimeError> {
        let mut targets = Tensor::alloc(Shape::new(vec![1, 1]), DType::I32).map_err(|e| RuntimeError::new(e.to_string()))?;
        targets.as_i32_mut().unwrap()[0] = input_token;

        let mut target_lengths = Tensor::alloc(Shape::new(vec![1]), DType::I32).map_err(|e| RuntimeError::new(e.to_string()))?;
        target_lengths.as_i32_mut().unwrap()[0] = 1;

        let mut inputs = FeatureBundle::new();
        inputs.insert("targets", TensorValue::I32(targets));
        inputs.insert("target_lengths", TensorValue::I32(target_lengths));
        inputs.insert("h_in", TensorValue::F32(h.clone()));
        inputs.insert("c_in", TensorValue::F32(c.clone()));

        let outputs = self.predictor.predict(inputs)?;
        let decoder_output = outputs
            .get("decoder_output")
            .and_then(|v| v.as_f32())
            .ok_or_else(|| RuntimeError::new("predictor did not return `decoder_output`"))?
            .to_vec();
        let h_out = match outputs.get("h_out") {
            Some(TensorValue::F32(t)) => t.clone(),
            _ => return Err(RuntimeError::new("predictor did not return `h_out`")),
        };
        let c_out = match outputs.get("c_out") {
            Some(TensorValue::F32(t)) => t.clone(),
            _ => return Err(RuntimeError::new("predictor did not return `c_out`")),
        };

        Ok((decoder_output, h_out, c_out))
    }

    fn run_joint(&self, encoder_frame: &[f32], decoder_output: &[f32]) -> Result<Vec<f32>, RuntimeError> {
        let mut encoder_outputs = Tensor::alloc(Shape::new(vec![1, 1, encoder_frame.len()]), DType::F32).map_err(|e| RuntimeError::new(e.to_string()))?;
        encoder_outputs.as_f32_mut().unwrap().copy_from_slice(encoder_frame);

        let mut decoder_outputs = Tensor::alloc(Shape::new(vec![1, 1, decoder_output.len()]), DType::F32).map_err(|e| RuntimeError::new(e.to_string()))?;
        decoder_outputs.as_f32_mut().unwrap().copy_from_slice(decoder_output);

        let mut inputs = FeatureBundle::new();
        inputs.insert("encoder_outputs", TensorValue::F32(encoder_outputs));
        inputs.insert("decoder_outputs", TensorValue::F32(decoder_outputs));

        let outputs = self.joint.predict(inputs)?;
        outputs
            .get("logits")
            .and_then(|v| v.as_f32())
            .map(|s| s.to_vec())
            .ok_or_else(|| RuntimeError::new("joint network did not return `logits`"))
    }
}

/// Split joint-network logits into token/duration segments and argmax each,
/// with ties breaking to the lowest index.
fn split_argmax(logits: &[f32], vocab_size: usize) -> (i32, usize) {
    let token_logits = &logits[..vocab_size];
    let duration_logits = &logits[vocab_size..];

    let token = argmax(token_logits) as i32;
    let duration_idx = argmax(duration_logits);
    (token, duration_idx)
}

fn argmax(values: &[f32]) -> usize {
    let mut best_idx = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = i;
        }
    }
    best_idx
}

/// Convert a frame index to seconds at the fixed 12.5Hz encoder frame rate.
pub fn frame_to_seconds(frame: i64) -> f64 {
    frame as f64 * ENCODER_FRAME_DURATION_SEC
}
