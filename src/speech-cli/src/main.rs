//! Speech pipeline CLI: transcribe or diarize a WAV file against a directory
//! of ONNX models.

mod audio_io;
mod onnx_model;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use diarize_core::{DiarizerManager, DiarizerModels};
use stt_core::{AsrManager, AsrModels, AudioSource, Tokenizer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use onnx_model::OnnxModel;

#[derive(Parser)]
#[command(name = "speech-cli")]
#[command(about = "Streaming ASR and speaker diarization over a fixed model set")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory containing the pipeline's ONNX models and tokens.txt
    #[arg(short, long, global = true, default_value = "models")]
    model_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Prefer GPU execution where available
    #[arg(long, global = true)]
    gpu: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe a WAV file
    Transcribe {
        /// Input WAV file (any sample rate/channel count; resampled to 16kHz mono)
        wav: PathBuf,

        /// Which predictor-state slot to use
        #[arg(long, default_value = "microphone")]
        source: String,
    },

    /// Diarize a WAV file into timed speaker segments
    Diarize {
        /// Input WAV file
        wav: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder().with_max_level(level).with_target(false).compact().init();

    match cli.command {
        Commands::Transcribe { wav, source } => cmd_transcribe(&cli.model_dir, &wav, &source, cli.gpu),
        Commands::Diarize { wav } => cmd_diarize(&cli.model_dir, &wav, cli.gpu),
    }
}

fn parse_source(source: &str) -> Result<AudioSource> {
    match source {
        "microphone" | "mic" => Ok(AudioSource::Microphone),
        "system" => Ok(AudioSource::System),
        other => anyhow::bail!("unknown audio source `{other}`, expected `microphone` or `system`"),
    }
}

fn cmd_transcribe(model_dir: &Path, wav: &Path, source: &str, use_gpu: bool) -> Result<()> {
    let source = parse_source(source)?;
    let samples = audio_io::load_wav_mono_16k(wav)?;
    info!(samples = samples.len(), "loaded audio");

    let mel = Arc::new(OnnxModel::load("mel", &model_dir.join("mel.onnx"), 4, use_gpu)?);
    let encoder = Arc::new(OnnxModel::load("encoder", &model_dir.join("encoder.onnx"), 4, use_gpu)?);
    let predictor = Arc::new(OnnxModel::load("predictor", &model_dir.join("decoder.onnx"), 4, use_gpu)?);
    let joint = Arc::new(OnnxModel::load("joint", &model_dir.join("joiner.onnx"), 4, use_gpu)?);
    let tokenizer = Tokenizer::from_file(model_dir.join("tokens.txt")).context("loading vocabulary")?;

    let mut manager = AsrManager::new();
    manager.load(AsrModels { mel, encoder, predictor, joint, tokenizer });

    let result = manager.transcribe(&samples, source)?;

    println!("{}", result.text);
    println!();
    println!("confidence: {:.2}", result.confidence);
    println!("duration:   {:.2}s", result.duration_s);
    println!("processed:  {:.2}s", result.processing_time_s);
    for timing in &result.token_timings {
        println!("  [{:>6.2} - {:>6.2}] {}", timing.start, timing.end, timing.text);
    }

    Ok(())
}

fn cmd_diarize(model_dir: &Path, wav: &Path, use_gpu: bool) -> Result<()> {
    let samples = audio_io::load_wav_mono_16k(wav)?;
    info!(samples = samples.len(), "loaded audio");

    let segmentation = Arc::new(OnnxModel::load("segmentation", &model_dir.join("segmentation.onnx"), 4, use_gpu)?);
    let embedding = Arc::new(OnnxModel::load("embedding", &model_dir.join("embedding.onnx"), 4, use_gpu)?);

    let mut manager = DiarizerManager::new();
    manager.load(DiarizerModels { segmentation, embedding });

    let result = manager.diarize(&samples)?;

    println!("{} speaker segment(s):", result.segments.len());
    for segment in &result.segments {
        println!("  [{:>7.2} - {:>7.2}] speaker {}", segment.start_s, segment.end_s, segment.speaker_id);
    }

    Ok(())
}
