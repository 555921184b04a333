//! Streaming ASR: mel extraction, the TDT greedy decoder, chunked-window
//! orchestration, token post-processing, and the top-level manager that
//! composes them into `transcribe(samples, source)`.

pub mod error;
pub mod manager;
pub mod mel;
pub mod postprocess;
pub mod streaming;
pub mod tdt;
pub mod tokenizer;

pub use error::SttError;
pub use manager::{AsrManager, AsrModels, AsrResult, AudioSource};
pub use postprocess::{Transcript, TokenTiming};
pub use tdt::{DecodeOutput, EncoderFrames, PredictorState, TdtDecoder};
pub use tokenizer::{Tokenizer, BLANK_AND_SOS_ID};
