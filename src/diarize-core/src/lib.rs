//! Speaker diarization: powerset segmentation, masked embedding extraction,
//! an incremental speaker tracker, and the manager that composes them into
//! `diarize(samples) -> DiarizationResult`.

pub mod embedding;
pub mod error;
pub mod manager;
pub mod segmentation;
pub mod tracker;

pub use error::DiarizeError;
pub use manager::{DiarizationResult, DiarizerManager, DiarizerModels, TimedSpeakerSegment};
pub use tracker::{Speaker, SpeakerStage, SpeakerTracker};
