//! Token post-processing: text reconstruction, per-token timing, and the
//! overall confidence heuristic.

use tracing::warn;

use crate::tdt::frame_to_seconds;
use crate::tokenizer::Tokenizer;

const TOKEN_DURATION_SEC: f64 = 0.08;

/// One token's reconstructed text fragment and timing.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenTiming {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Fully reconstructed transcription: full text, per-token timings, and an
/// overall confidence heuristic.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub tokens: Vec<TokenTiming>,
    pub confidence: f64,
}

/// Build a `Transcript` from decoded token ids, their per-token encoder
/// frame indices, and audio duration (for the confidence heuristic).
pub fn postprocess(tokenizer: &Tokenizer, tokens: &[i32], frame_indices: &[i64], audio_duration_sec: f64) -> Transcript {
    let start_seconds: Vec<f64> = frame_indices.iter().map(|&f| frame_to_seconds(f)).collect();
    postprocess_with_seconds(tokenizer, tokens, &start_seconds, audio_duration_sec)
}

/// Like [`postprocess`], but takes already-resolved token start times. Used
/// by the streaming orchestrator, whose token timestamps cross multiple
/// windows and are no longer a single chunk-local frame domain.
pub fn postprocess_with_seconds(tokenizer: &Tokenizer, tokens: &[i32], start_seconds: &[f64], audio_duration_sec: f64) -> Transcript {
    if tokens.is_empty() {
        return Transcript {
            text: String::new(),
            tokens: Vec::new(),
            confidence: 0.1,
        };
    }

    let mut timings = Vec::with_capacity(tokens.len());
    for (i, &id) in tokens.iter().enumerate() {
        if id == tokenizer.blank_id() {
            continue;
        }
        let Some(token_str) = tokenizer.token_str(id) else {
            continue;
        };
        let start = start_seconds.get(i).copied().unwrap_or(0.0);
        timings.push(TokenTiming {
            text: token_str.replace('\u{2581}', " "),
            start,
            end: start + TOKEN_DURATION_SEC,
        });
    }

    let text = tokenizer.decode(tokens);
    if text.trim().is_empty() {
        warn!("post-processed transcript is whitespace-only despite non-empty token sequence");
    }

    let confidence = confidence_heuristic(audio_duration_sec, tokens.len(), tokens.iter().filter(|&&id| id != tokenizer.blank_id()).count());

    Transcript {
        text,
        tokens: timings,
        confidence,
    }
}

/// `start at 0.3, + up to 0.4 for duration (capped at 10s), + up to 0.3 for
/// token density (capped at 3 tokens/s)`.
fn confidence_heuristic(audio_duration_sec: f64, raw_token_count: usize, non_blank_token_count: usize) -> f64 {
    if raw_token_count == 0 {
        return 0.1;
    }
    let duration_bonus = (audio_duration_sec.min(10.0) / 10.0) * 0.4;
    let density = if audio_duration_sec > 0.0 {
        non_blank_token_count as f64 / audio_duration_sec
    } else {
        0.0
    };
    let density_bonus = (density.min(3.0) / 3.0) * 0.3;
    (0.3 + duration_bonus + density_bonus).clamp(0.1, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOCAB: &str = "<unk> 0\n\u{2581}t 1\n\u{2581}th 2\n\u{2581}a 3\nin 4\n\u{2581}the 5\n<blk> 6";

    #[test]
    fn empty_tokens_yield_empty_transcript_and_minimum_confidence() {
        let tok = Tokenizer::from_str(VOCAB).unwrap();
        let out = postprocess(&tok, &[], &[], 5.0);
        assert_eq!(out.text, "");
        assert!(out.tokens.is_empty());
        assert_eq!(out.confidence, 0.1);
    }

    #[test]
    fn token_timing_uses_frame_times_eighty_ms() {
        let tok = Tokenizer::from_str(VOCAB).unwrap();
        let out = postprocess(&tok, &[5], &[10], 1.0);
        assert_eq!(out.tokens.len(), 1);
        assert!((out.tokens[0].start - 0.8).abs() < 1e-9);
        assert!((out.tokens[0].end - 0.88).abs() < 1e-9);
    }

    #[test]
    fn confidence_increases_with_duration_and_density() {
        let tok = Tokenizer::from_str(VOCAB).unwrap();
        let short = postprocess(&tok, &[5], &[0], 0.1);
        let long = postprocess(&tok, &[5, 3, 4], &[0, 1, 2], 10.0);
        assert!(long.confidence > short.confidence);
        assert!(long.confidence <= 1.0);
    }

    #[test]
    fn blank_tokens_are_skipped_in_timings() {
        let tok = Tokenizer::from_str(VOCAB).unwrap();
        let out = postprocess(&tok, &[6, 5], &[0, 1], 1.0);
        assert_eq!(out.tokens.len(), 1);
    }
}
