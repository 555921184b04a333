//! Incremental speaker registry: assigns embeddings to stable speaker ids,
//! updates centroids with an exponential moving average, and turns frame
//! activity into timed segments.

use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::embedding::overlap_adaptive_threshold;

const EMBEDDING_DIM: usize = 256;
const MAX_RAW_EMBEDDINGS: usize = 50;
const EMA_ALPHA: f64 = 0.9;
const MIN_EMBEDDING_MAGNITUDE: f32 = 0.1;

/// Minimum distance below which an assigned embedding is merged into the
/// matched speaker's centroid (EMA update) rather than just counted.
pub const DEFAULT_EMBEDDING_THRESHOLD: f32 = 0.35;
/// Maximum distance within which an incoming embedding is considered the
/// same speaker at all (matched, but not necessarily updated).
pub const DEFAULT_SPEAKER_THRESHOLD: f32 = 0.55;
/// Minimum speech duration, in seconds, a segment must carry before a new
/// speaker is created or a segment is kept.
pub const DEFAULT_MIN_SPEECH_DURATION: f64 = 0.5;

/// Lifecycle stage of a tracked speaker; `Nascent` speakers have been
/// matched only once and may still be noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerStage {
    Nascent,
    Tracking,
}

#[derive(Debug, Clone)]
pub struct Speaker {
    pub id: String,
    pub display_name: String,
    pub current_embedding: Vec<f32>,
    pub duration: f64,
    pub raw_embeddings: VecDeque<Vec<f32>>,
    pub update_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Speaker {
    fn new(id: String, embedding: Vec<f32>, duration: f64, now: DateTime<Utc>) -> Self {
        let mut raw_embeddings = VecDeque::with_capacity(MAX_RAW_EMBEDDINGS);
        raw_embeddings.push_back(embedding.clone());
        Self {
            display_name: id.clone(),
            id,
            current_embedding: embedding,
            duration,
            raw_embeddings,
            update_count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage(&self) -> SpeakerStage {
        if self.update_count >= 2 {
            SpeakerStage::Tracking
        } else {
            SpeakerStage::Nascent
        }
    }

    fn push_raw(&mut self, embedding: Vec<f32>) {
        if self.raw_embeddings.len() >= MAX_RAW_EMBEDDINGS {
            self.raw_embeddings.pop_front();
        }
        self.raw_embeddings.push_back(embedding);
    }

    /// EMA centroid update: `new = alpha*old + (1-alpha)*input`.
    fn update(&mut self, embedding: &[f32], speech_duration: f64, now: DateTime<Utc>) {
        for (c, &e) in self.current_embedding.iter_mut().zip(embedding.iter()) {
            *c = (EMA_ALPHA as f32) * *c + (1.0 - EMA_ALPHA as f32) * e;
        }
        self.push_raw(embedding.to_vec());
        self.duration += speech_duration;
        self.update_count += 1;
        self.updated_at = now;
    }

    /// Duration-only accumulation for a matched-but-not-updated assignment.
    fn observe(&mut self, speech_duration: f64, now: DateTime<Utc>) {
        self.duration += speech_duration;
        self.updated_at = now;
    }

    /// Combine another speaker's raw embeddings into this one, capping at
    /// the 50 most recent and recomputing the mean embedding.
    pub fn merge(&mut self, other: &Speaker, now: DateTime<Utc>) {
        for emb in &other.raw_embeddings {
            self.push_raw(emb.clone());
        }
        self.current_embedding = mean_embedding(&self.raw_embeddings);
        self.duration += other.duration;
        self.update_count += other.update_count;
        self.updated_at = now;
    }
}

fn mean_embedding(embeddings: &VecDeque<Vec<f32>>) -> Vec<f32> {
    let mut mean = vec![0.0f32; EMBEDDING_DIM];
    for emb in embeddings {
        for (m, &v) in mean.iter_mut().zip(emb.iter()) {
            *m += v;
        }
    }
    let n = embeddings.len().max(1) as f32;
    for m in mean.iter_mut() {
        *m /= n;
    }
    mean
}

/// Cosine distance `1 - (a.b / (|a||b|))`. `+inf` on zero magnitude or a
/// dimension mismatch.
pub fn distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return f32::INFINITY;
    }
    1.0 - (dot / (mag_a * mag_b))
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub struct TrackerConfig {
    pub embedding_threshold: f32,
    pub speaker_threshold: f32,
    pub min_speech_duration: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            embedding_threshold: DEFAULT_EMBEDDING_THRESHOLD,
            speaker_threshold: DEFAULT_SPEAKER_THRESHOLD,
            min_speech_duration: DEFAULT_MIN_SPEECH_DURATION,
        }
    }
}

struct Registry {
    speakers: HashMap<String, Speaker>,
    next_id: u64,
}

pub struct SpeakerTracker {
    registry: RwLock<Registry>,
    config: TrackerConfig,
}

impl Default for SpeakerTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl SpeakerTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            registry: RwLock::new(Registry {
                speakers: HashMap::new(),
                next_id: 1,
            }),
            config,
        }
    }

    /// Pre-register known speakers, preserving ids verbatim and advancing
    /// `next_id` past any numeric collision.
    pub fn initialize_known_speakers(&self, speakers: Vec<(String, Vec<f32>)>, now: DateTime<Utc>) {
        let mut reg = self.registry.write();
        for (id, embedding) in speakers {
            if let Ok(n) = id.parse::<u64>() {
                if n >= reg.next_id {
                    reg.next_id = n + 1;
                }
            }
            let speaker = Speaker::new(id.clone(), embedding, 0.0, now);
            reg.speakers.insert(id, speaker);
        }
    }

    pub fn speaker_count(&self) -> usize {
        self.registry.read().speakers.len()
    }

    pub fn get(&self, id: &str) -> Option<Speaker> {
        self.registry.read().speakers.get(id).cloned()
    }

    /// Five-step assignment algorithm: reject malformed embeddings, seed the
    /// registry on first contact, else match-or-create against the nearest
    /// registered centroid.
    pub fn assign(&self, embedding: &[f32], speech_duration: f64, now: DateTime<Utc>) -> Option<Speaker> {
        if embedding.len() != EMBEDDING_DIM {
            debug!(len = embedding.len(), "rejecting embedding with wrong dimension");
            return None;
        }

        let mut reg = self.registry.write();

        if reg.speakers.is_empty() {
            if speech_duration >= self.config.min_speech_duration {
                let id = reg.next_id.to_string();
                reg.next_id += 1;
                let speaker = Speaker::new(id.clone(), embedding.to_vec(), speech_duration, now);
                reg.speakers.insert(id.clone(), speaker);
                return reg.speakers.get(&id).cloned();
            }
            return None;
        }

        let (best_id, best_dist) = reg
            .speakers
            .iter()
            .map(|(id, s)| (id.clone(), distance(embedding, &s.current_embedding)))
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .expect("registry checked non-empty above");

        if best_dist < self.config.speaker_threshold {
            let speaker = reg.speakers.get_mut(&best_id).expect("best_id came from this registry");
            if best_dist < self.config.embedding_threshold && magnitude(embedding) > MIN_EMBEDDING_MAGNITUDE {
                speaker.update(embedding, speech_duration, now);
            } else {
                speaker.observe(speech_duration, now);
            }
            return reg.speakers.get(&best_id).cloned();
        }

        if speech_duration >= self.config.min_speech_duration {
            let id = reg.next_id.to_string();
            reg.next_id += 1;
            let speaker = Speaker::new(id.clone(), embedding.to_vec(), speech_duration, now);
            reg.speakers.insert(id.clone(), speaker);
            return reg.speakers.get(&id).cloned();
        }

        None
    }
}

/// A contiguous run of active frames for one local slot, before it has been
/// assigned a speaker id.
#[derive(Debug, Clone, Copy)]
pub struct RawSegment {
    pub slot: usize,
    pub start_frame: usize,
    pub end_frame: usize,
}

/// Scan an activity matrix for one chunk and produce candidate segments per
/// local slot using the overlap-adaptive threshold, in frame units.
pub fn candidate_segments(activity: &[[f32; 3]], min_activity_frames: usize) -> Vec<RawSegment> {
    let mut segments = Vec::new();

    for slot in 0..3 {
        let total: f32 = activity.iter().map(|f| f[slot]).sum();
        if (total as usize) < min_activity_frames {
            continue;
        }

        let mut run_start: Option<usize> = None;
        for (f, frame) in activity.iter().enumerate() {
            let threshold = overlap_adaptive_threshold(frame, slot);
            let above = frame[slot] > threshold;
            match (above, run_start) {
                (true, None) => run_start = Some(f),
                (false, Some(start)) => {
                    segments.push(RawSegment { slot, start_frame: start, end_frame: f });
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            segments.push(RawSegment {
                slot,
                start_frame: start,
                end_frame: activity.len(),
            });
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn unit_vec(lead: f32) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[0] = lead;
        v[1] = (1.0 - lead * lead).max(0.0).sqrt();
        v
    }

    #[test]
    fn distance_self_is_zero_and_symmetric() {
        let a = unit_vec(0.7);
        let b = unit_vec(0.3);
        assert!(distance(&a, &a).abs() < 1e-5);
        assert!((distance(&a, &b) - distance(&b, &a)).abs() < 1e-5);
    }

    #[test]
    fn distance_opposite_vectors_is_two() {
        let a = vec![1.0f32, 0.0];
        let b = vec![-1.0f32, 0.0];
        assert!((distance(&a, &b) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn distance_dimension_mismatch_is_infinite() {
        let a = vec![1.0f32; 256];
        let b = vec![1.0f32; 128];
        assert_eq!(distance(&a, &b), f32::INFINITY);
    }

    #[test]
    fn first_assignment_below_min_duration_returns_none() {
        let tracker = SpeakerTracker::default();
        let now = Utc.timestamp_opt(0, 0).unwrap();
        let out = tracker.assign(&unit_vec(0.9), 0.1, now);
        assert!(out.is_none());
        assert_eq!(tracker.speaker_count(), 0);
    }

    #[test]
    fn first_assignment_creates_speaker_one() {
        let tracker = SpeakerTracker::default();
        let now = Utc.timestamp_opt(0, 0).unwrap();
        let out = tracker.assign(&unit_vec(0.9), 2.0, now).unwrap();
        assert_eq!(out.id, "1");
        assert_eq!(out.stage(), SpeakerStage::Nascent);
    }

    #[test]
    fn repeated_close_embedding_updates_same_speaker() {
        let tracker = SpeakerTracker::default();
        let now = Utc.timestamp_opt(0, 0).unwrap();
        let first = tracker.assign(&unit_vec(0.9), 2.0, now).unwrap();
        let second = tracker.assign(&unit_vec(0.9), 1.0, now).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(tracker.speaker_count(), 1);
        assert!((second.duration - 3.0).abs() < 1e-9);
        assert_eq!(second.stage(), SpeakerStage::Tracking);
    }

    #[test]
    fn far_embedding_creates_second_speaker() {
        let tracker = SpeakerTracker::default();
        let now = Utc.timestamp_opt(0, 0).unwrap();
        tracker.assign(&unit_vec(1.0), 2.0, now).unwrap();
        let second = tracker.assign(&unit_vec(-1.0), 2.0, now).unwrap();
        assert_eq!(second.id, "2");
        assert_eq!(tracker.speaker_count(), 2);
    }

    #[test]
    fn known_speakers_preserve_ids_and_advance_next_id() {
        let tracker = SpeakerTracker::default();
        let now = Utc.timestamp_opt(0, 0).unwrap();
        tracker.initialize_known_speakers(vec![("A".to_string(), unit_vec(0.1)), ("42".to_string(), unit_vec(0.9))], now);

        let matched = tracker.assign(&unit_vec(0.9), 2.0, now).unwrap();
        assert_eq!(matched.id, "42");

        let new_speaker = tracker.assign(&unit_vec(-0.9), 2.0, now).unwrap();
        assert_eq!(new_speaker.id, "43");
    }

    #[test]
    fn wrong_dimension_embedding_is_rejected() {
        let tracker = SpeakerTracker::default();
        let now = Utc.timestamp_opt(0, 0).unwrap();
        assert!(tracker.assign(&vec![0.0f32; 10], 5.0, now).is_none());
    }

    #[test]
    fn candidate_segments_drops_slots_below_min_activity() {
        let activity = vec![[0.9, 0.0, 0.0]; 3];
        let segments = candidate_segments(&activity, 10);
        assert!(segments.is_empty());
    }

    #[test]
    fn candidate_segments_finds_one_run_per_slot() {
        let activity = vec![[0.9, 0.0, 0.0]; 20];
        let segments = candidate_segments(&activity, 10);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_frame, 0);
        assert_eq!(segments[0].end_frame, 20);
    }
}
