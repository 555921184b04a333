//! Mel-spectrogram feature extraction.
//!
//! Two paths are kept: a pure-Rust extractor (useful for tests and for
//! running without a mel model loaded) and a model-backed path that calls
//! the external `audio_signal`/`audio_length` -> `melspectrogram` model on
//! the bit-exact boundary documented for this pipeline.

use std::f32::consts::PI;

use infer_adapter::{FeatureBundle, Model, RuntimeError, TensorValue};
use tensor_core::{DType, Shape, Tensor};
use tracing::debug;

/// Sample rate this pipeline operates at.
pub const SAMPLE_RATE: u32 = 16_000;

/// STFT window size in samples (25ms at 16kHz).
const WINDOW_SIZE: usize = 400;

/// STFT hop size in samples (10ms at 16kHz).
const HOP_SIZE: usize = 160;

/// FFT size (next power of two >= window size).
const FFT_SIZE: usize = 512;

/// Encoder subsampling factor: encoder frames per mel frame.
pub const SUBSAMPLING_FACTOR: usize = 8;

/// Duration of one encoder output frame in seconds. Fixed at 12.5Hz (80ms)
/// per the encoder frame rate invariant.
pub const ENCODER_FRAME_DURATION_SEC: f64 = 0.08;

const NUM_MELS: usize = 80;

/// Pure-Rust mel-spectrogram extractor, used when no mel model is loaded.
pub struct MelSpectrogram {
    num_mels: usize,
    mel_filters: Vec<Vec<f32>>,
    window: Vec<f32>,
}

impl Default for MelSpectrogram {
    fn default() -> Self {
        Self::new(NUM_MELS)
    }
}

impl MelSpectrogram {
    pub fn new(num_mels: usize) -> Self {
        let mel_filters = create_mel_filterbank(num_mels, FFT_SIZE, SAMPLE_RATE, 0.0, 8000.0);
        let window = create_hann_window(WINDOW_SIZE);
        debug!(num_mels, fft_size = FFT_SIZE, "created mel spectrogram extractor");
        Self { num_mels, mel_filters, window }
    }

    pub fn num_mels(&self) -> usize {
        self.num_mels
    }

    /// Extract `[num_frames, num_mels]` log-mel features from 16kHz samples.
    pub fn extract(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        if samples.len() < WINDOW_SIZE {
            return Vec::new();
        }

        let num_frames = (samples.len() - WINDOW_SIZE) / HOP_SIZE + 1;
        let mut features = Vec::with_capacity(num_frames);

        for frame_idx in 0..num_frames {
            let start = frame_idx * HOP_SIZE;
            let frame = &samples[start..start + WINDOW_SIZE];
            let spectrum = self.compute_spectrum(frame);
            features.push(self.apply_mel_filterbank(&spectrum));
        }

        features
    }

    fn compute_spectrum(&self, frame: &[f32]) -> Vec<f32> {
        let mut windowed: Vec<f32> = frame.iter().zip(self.window.iter()).map(|(s, w)| s * w).collect();
        windowed.resize(FFT_SIZE, 0.0);
        magnitude_spectrum(&windowed)
    }

    fn apply_mel_filterbank(&self, spectrum: &[f32]) -> Vec<f32> {
        let mut mel_energies = vec![0.0f32; self.num_mels];
        for (mel_idx, filter) in self.mel_filters.iter().enumerate() {
            let mut energy = 0.0f32;
            for (bin_idx, &weight) in filter.iter().enumerate() {
                if bin_idx < spectrum.len() && weight > 0.0 {
                    energy += spectrum[bin_idx] * weight;
                }
            }
            mel_energies[mel_idx] = energy.max(1e-10).ln();
        }
        mel_energies
    }
}

/// Run the external mel-spectrogram model on the `audio_signal`/`audio_length`
/// boundary, returning the raw `[1, M, 80]` feature tensor and its effective
/// frame count.
pub fn extract_via_model(model: &dyn Model, samples: &[f32]) -> Result<(Tensor, usize), RuntimeError> {
    let mut signal = Tensor::alloc(Shape::new(vec![1, samples.len()]), DType::F32)
        .map_err(|e| RuntimeError::new(format!("mel input alloc failed: {e}")))?;
    signal.as_f32_mut().unwrap().copy_from_slice(samples);

    let mut length = Tensor::alloc(Shape::new(vec![1]), DType::I32)
        .map_err(|e| RuntimeError::new(format!("mel length alloc failed: {e}")))?;
    length.as_i32_mut().unwrap()[0] = samples.len() as i32;

    let mut inputs = FeatureBundle::new();
    inputs.insert("audio_signal", TensorValue::F32(signal));
    inputs.insert("audio_length", TensorValue::I32(length));

    let outputs = model.predict(inputs)?;
    let mel = outputs
        .get("melspectrogram")
        .and_then(|v| v.as_f32())
        .ok_or_else(|| RuntimeError::new("mel model did not return `melspectrogram`"))?;
    let frame_count = outputs
        .get("melspectrogram_length")
        .and_then(|v| v.as_i32())
        .map(|s| s[0] as usize)
        .unwrap_or(mel.len() / NUM_MELS);

    let mut tensor = Tensor::alloc(Shape::new(vec![1, frame_count, NUM_MELS]), DType::F32)
        .map_err(|e| RuntimeError::new(format!("mel output alloc failed: {e}")))?;
    tensor.as_f32_mut().unwrap()[..mel.len().min(frame_count * NUM_MELS)]
        .copy_from_slice(&mel[..mel.len().min(frame_count * NUM_MELS)]);

    Ok((tensor, frame_count))
}

fn create_hann_window(length: usize) -> Vec<f32> {
    (0..length)
        .map(|n| 0.5 * (1.0 - (2.0 * PI * n as f32 / (length - 1) as f32).cos()))
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

fn create_mel_filterbank(num_mels: usize, fft_size: usize, sample_rate: u32, low_freq: f32, high_freq: f32) -> Vec<Vec<f32>> {
    let num_bins = fft_size / 2 + 1;
    let sample_rate = sample_rate as f32;

    let low_mel = hz_to_mel(low_freq);
    let high_mel = hz_to_mel(high_freq);
    let mel_points: Vec<f32> = (0..=num_mels + 1)
        .map(|i| low_mel + (high_mel - low_mel) * i as f32 / (num_mels + 1) as f32)
        .collect();

    let bin_points: Vec<usize> = mel_points
        .iter()
        .map(|&mel| {
            let hz = mel_to_hz(mel);
            let bin = ((fft_size as f32 + 1.0) * hz / sample_rate).floor() as usize;
            bin.min(num_bins - 1)
        })
        .collect();

    let mut filters = Vec::with_capacity(num_mels);
    for m in 0..num_mels {
        let mut filter = vec![0.0f32; num_bins];
        let left = bin_points[m];
        let center = bin_points[m + 1];
        let right = bin_points[m + 2];

        for k in left..center {
            if center > left {
                filter[k] = (k - left) as f32 / (center - left) as f32;
            }
        }
        for k in center..=right {
            if right > center {
                filter[k] = (right - k) as f32 / (right - center) as f32;
            }
        }
        filters.push(filter);
    }
    filters
}

/// Naive O(n^2) magnitude spectrum. Correct, not fast — fine for the window
/// sizes used here (512 samples); a production build would swap in `rustfft`.
fn magnitude_spectrum(samples: &[f32]) -> Vec<f32> {
    let n = samples.len();
    let num_bins = n / 2 + 1;
    let mut spectrum = vec![0.0f32; num_bins];
    let n_f32 = n as f32;

    for k in 0..num_bins {
        let mut real = 0.0f32;
        let mut imag = 0.0f32;
        let k_f32 = k as f32;
        for (idx, &sample) in samples.iter().enumerate() {
            let angle = -2.0 * PI * k_f32 * (idx as f32) / n_f32;
            real += sample * angle.cos();
            imag += sample * angle.sin();
        }
        spectrum[k] = (real * real + imag * imag).sqrt();
    }
    spectrum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_expected_frame_count_and_width() {
        let mel = MelSpectrogram::default();
        let samples: Vec<f32> = (0..16_000).map(|i| (2.0 * PI * 440.0 * i as f32 / 16_000.0).sin()).collect();
        let features = mel.extract(&samples);
        assert!(!features.is_empty());
        assert_eq!(features[0].len(), NUM_MELS);
    }

    #[test]
    fn short_input_yields_no_frames() {
        let mel = MelSpectrogram::default();
        assert!(mel.extract(&[0.0; 100]).is_empty());
    }
}
