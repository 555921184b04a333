//! Chunked streaming orchestration: splits long audio into overlapping
//! context/center/right windows, threads decoder state across them, and
//! reconciles duplicated tokens at window boundaries.

use tracing::{debug, warn};

use crate::mel::{ENCODER_FRAME_DURATION_SEC, SAMPLE_RATE};

/// Model's maximum window capacity: 15s at 16kHz.
pub const WINDOW_SAMPLES: usize = 240_000;
const CENTER_SECONDS: f64 = 11.0;
const LEFT_CONTEXT_SECONDS: f64 = 2.0;
const RIGHT_CONTEXT_SECONDS: f64 = 2.0;
const ENCODER_FRAME_RATE_HZ: f64 = 12.5;

const CENTER_SAMPLES: usize = (CENTER_SECONDS * SAMPLE_RATE as f64) as usize;
const LEFT_CONTEXT_SAMPLES: usize = (LEFT_CONTEXT_SECONDS * SAMPLE_RATE as f64) as usize;
const RIGHT_CONTEXT_SAMPLES: usize = (RIGHT_CONTEXT_SECONDS * SAMPLE_RATE as f64) as usize;

/// One sliding window's sample bounds, its zero-padded buffer, and the
/// `start_frame_offset` the decoder should skip past.
#[derive(Debug, Clone)]
pub struct Window {
    pub samples: Vec<f32>,
    pub actual_length: usize,
    pub start_frame_offset: usize,
    pub is_first: bool,
    /// Sample index, in the full audio, that `samples[0]` corresponds to.
    pub start_sample: usize,
}

/// Split `N`-sample audio into the fixed center/left/right window scheme.
///
/// The first window has no left context to draw on, so its right edge
/// extends all the way to `WINDOW_SAMPLES` (not just `CENTER_SAMPLES +
/// RIGHT_CONTEXT_SAMPLES`) before falling back to later windows.
pub fn plan_windows(audio: &[f32]) -> Vec<Window> {
    let n = audio.len();
    let mut windows = Vec::new();
    let mut center_start = 0usize;
    let mut is_first = true;

    loop {
        if center_start >= n && !(is_first && n == 0) {
            break;
        }

        let lo = center_start.saturating_sub(LEFT_CONTEXT_SAMPLES);
        let hi = if is_first {
            WINDOW_SAMPLES.min(n)
        } else {
            (center_start + CENTER_SAMPLES + RIGHT_CONTEXT_SAMPLES).min(n)
        };
        let actual_length = hi - lo;

        let mut samples = vec![0.0f32; WINDOW_SAMPLES];
        samples[..actual_length].copy_from_slice(&audio[lo..hi]);

        let start_frame_offset = if is_first {
            0
        } else {
            (LEFT_CONTEXT_SECONDS * ENCODER_FRAME_RATE_HZ).round() as usize
        };

        windows.push(Window {
            samples,
            actual_length,
            start_frame_offset,
            is_first,
            start_sample: lo,
        });

        is_first = false;
        center_start += CENTER_SAMPLES;

        if hi >= n {
            break;
        }
    }

    windows
}

/// One window's decode: tokens with their absolute-sample-domain timestamps
/// (seconds), already adjusted for the window's position in the full audio.
#[derive(Debug, Clone, Default)]
pub struct WindowTokens {
    pub tokens: Vec<i32>,
    pub timestamps: Vec<f64>,
}

/// Append `incoming` (the next window's decoded tokens) onto `accumulated`,
/// deduplicating the overlap region per the contiguous / LCS / midpoint-cut
/// fallback chain.
pub fn merge_tokens(accumulated: &mut WindowTokens, incoming: WindowTokens, overlap_duration_sec: f64) {
    if incoming.tokens.is_empty() {
        return;
    }
    if accumulated.tokens.is_empty() {
        *accumulated = incoming;
        return;
    }

    if let Some(drop_prefix) = contiguous_overlap(accumulated, &incoming, overlap_duration_sec) {
        debug!(drop_prefix, "merged window via contiguous suffix/prefix match");
        extend_from(accumulated, &incoming, drop_prefix);
        return;
    }

    if let Some(drop_prefix) = lcs_overlap(accumulated, &incoming, overlap_duration_sec) {
        debug!(drop_prefix, "merged window via LCS alignment");
        extend_from(accumulated, &incoming, drop_prefix);
        return;
    }

    let cut = midpoint_cut(accumulated, &incoming, overlap_duration_sec);
    warn!(drop_prefix = cut, "merged window via midpoint-cut fallback (no alignment found)");
    extend_from(accumulated, &incoming, cut);
}

fn extend_from(accumulated: &mut WindowTokens, incoming: &WindowTokens, from: usize) {
    accumulated.tokens.extend_from_slice(&incoming.tokens[from..]);
    accumulated.timestamps.extend_from_slice(&incoming.timestamps[from..]);
}

/// Longest contiguous subsequence that is both a suffix of `accumulated` and
/// a prefix of `incoming`, with matching timestamps within one overlap
/// duration of each other. Returns how many leading `incoming` tokens to
/// drop, if at least two tokens matched.
fn contiguous_overlap(accumulated: &WindowTokens, incoming: &WindowTokens, overlap_duration_sec: f64) -> Option<usize> {
    let max_len = accumulated.tokens.len().min(incoming.tokens.len());
    for len in (2..=max_len).rev() {
        let suffix = &accumulated.tokens[accumulated.tokens.len() - len..];
        let prefix = &incoming.tokens[..len];
        if suffix != prefix {
            continue;
        }
        let suffix_ts = &accumulated.timestamps[accumulated.timestamps.len() - len..];
        let prefix_ts = &incoming.timestamps[..len];
        let aligned = suffix_ts
            .iter()
            .zip(prefix_ts.iter())
            .all(|(a, b)| (a - b).abs() <= overlap_duration_sec);
        if aligned {
            return Some(len);
        }
    }
    None
}

/// Longest-common-subsequence alignment restricted to the overlap region,
/// used when no contiguous run matches. Returns the index into `incoming`
/// just past the last token that also appears (in order) in `accumulated`'s
/// tail, or `None` if the LCS has fewer than two matched tokens.
fn lcs_overlap(accumulated: &WindowTokens, incoming: &WindowTokens, overlap_duration_sec: f64) -> Option<usize> {
    let tail_len = accumulated.tokens.len().min(32);
    let head_len = incoming.tokens.len().min(32);
    let tail = &accumulated.tokens[accumulated.tokens.len() - tail_len..];
    let head = &incoming.tokens[..head_len];

    // Standard O(n*m) LCS table, then backtrack to find the last matched
    // head index.
    let mut table = vec![vec![0u32; head_len + 1]; tail_len + 1];
    for i in 1..=tail_len {
        for j in 1..=head_len {
            table[i][j] = if tail[i - 1] == head[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }
    let matched = table[tail_len][head_len];
    if matched < 2 {
        return None;
    }

    // Backtrack to find the largest head index touched by the LCS.
    let (mut i, mut j) = (tail_len, head_len);
    let mut last_head_idx = None;
    while i > 0 && j > 0 {
        if tail[i - 1] == head[j - 1] {
            last_head_idx = Some(j - 1);
            i -= 1;
            j -= 1;
        } else if table[i - 1][j] >= table[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }

    let drop_prefix = last_head_idx.map(|idx| idx + 1)?;
    let ts_ok = (accumulated.timestamps.last().unwrap() - incoming.timestamps[drop_prefix - 1]).abs() <= overlap_duration_sec * 2.0;
    ts_ok.then_some(drop_prefix)
}

/// Split at the midpoint of the overlap window by timestamp: drop any
/// leading `incoming` tokens whose timestamp falls before the midpoint of
/// the accumulated tail and the incoming head's time range.
fn midpoint_cut(accumulated: &WindowTokens, incoming: &WindowTokens, overlap_duration_sec: f64) -> usize {
    let tail_start = *accumulated.timestamps.last().unwrap() - overlap_duration_sec;
    let head_end = incoming.timestamps.first().copied().unwrap_or(tail_start) + overlap_duration_sec;
    let midpoint = (tail_start + head_end) / 2.0;
    incoming.timestamps.iter().take_while(|&&t| t < midpoint).count()
}

/// Offsets a window's within-window frame-domain timestamps into the full
/// audio's seconds domain.
pub fn to_absolute_seconds(frame_indices: &[i64], window_start_sample: usize) -> Vec<f64> {
    let window_offset_sec = window_start_sample as f64 / SAMPLE_RATE as f64;
    frame_indices.iter().map(|&f| window_offset_sec + f as f64 * ENCODER_FRAME_DURATION_SEC).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_one_window_audio_yields_single_window() {
        let audio = vec![0.0f32; WINDOW_SAMPLES];
        let windows = plan_windows(&audio);
        assert_eq!(windows.len(), 1);
        assert!(windows[0].is_first);
        assert_eq!(windows[0].start_frame_offset, 0);
    }

    #[test]
    fn slightly_longer_than_one_window_yields_two_windows() {
        let audio = vec![0.0f32; WINDOW_SAMPLES + 1];
        let windows = plan_windows(&audio);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].start_frame_offset, 25); // round(2.0 * 12.5)
    }

    #[test]
    fn merge_with_no_overlap_tokens_is_pure_append() {
        let mut acc = WindowTokens {
            tokens: vec![1, 2, 3],
            timestamps: vec![0.0, 0.1, 0.2],
        };
        let incoming = WindowTokens {
            tokens: vec![9, 10],
            timestamps: vec![100.0, 100.1],
        };
        merge_tokens(&mut acc, incoming, 2.0);
        assert_eq!(acc.tokens, vec![1, 2, 3, 9, 10]);
    }

    #[test]
    fn merge_drops_contiguous_duplicate_suffix_prefix() {
        let mut acc = WindowTokens {
            tokens: vec![1, 2, 3, 4, 5],
            timestamps: vec![0.0, 1.0, 2.0, 3.0, 4.0],
        };
        let incoming = WindowTokens {
            tokens: vec![4, 5, 6, 7],
            timestamps: vec![3.05, 4.05, 5.0, 6.0],
        };
        merge_tokens(&mut acc, incoming, 2.0);
        assert_eq!(acc.tokens, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn merge_into_empty_accumulated_takes_incoming_verbatim() {
        let mut acc = WindowTokens::default();
        let incoming = WindowTokens {
            tokens: vec![1, 2],
            timestamps: vec![0.0, 0.1],
        };
        merge_tokens(&mut acc, incoming.clone(), 2.0);
        assert_eq!(acc.tokens, incoming.tokens);
    }

    #[test]
    fn merge_with_empty_incoming_leaves_accumulated_unchanged() {
        let mut acc = WindowTokens {
            tokens: vec![1, 2],
            timestamps: vec![0.0, 0.1],
        };
        let before = acc.tokens.clone();
        merge_tokens(&mut acc, WindowTokens::default(), 2.0);
        assert_eq!(acc.tokens, before);
    }
}
