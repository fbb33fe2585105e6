//! pcm-play: stream raw PCM through the playback engine to an output device.
//!
//! ## Modes
//! - `play`: stream a headerless PCM file in the given format.
//! - `tone`: play a generated float32 sine tone.
//!
//! Input is fed in frame-aligned chunks while keeping about `--lead-seconds` of audio queued;
//! Ctrl-C stops feeding, discards what is queued and releases the device.

mod cli;
mod config;
mod runtime;

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use pcm_player::{SampleEncoding, SampleFormat};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,pcm_player=info,pcm_play=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let config = config::PlayConfig::resolve(&args)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_for_signal = cancel.clone();
    let _ = ctrlc::set_handler(move || {
        if cancel_for_signal.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    });

    match args.cmd {
        Some(cli::Command::Play {
            path,
            rate,
            channels,
            encoding,
        }) => {
            let format = SampleFormat::new(rate, channels, encoding)?;
            let file = File::open(&path).with_context(|| format!("open {:?}", path))?;
            tracing::info!(path = %path.display(), "streaming file");
            runtime::run(&config, format, BufReader::new(file), cancel)
        }
        Some(cli::Command::Tone {
            freq,
            seconds,
            rate,
            channels,
        }) => {
            let format = SampleFormat::new(rate, channels, SampleEncoding::Float32)?;
            let pcm = runtime::sine_tone(format, freq, seconds);
            tracing::info!(freq_hz = freq, seconds, "playing tone");
            runtime::run(&config, format, Cursor::new(pcm), cancel)
        }
        None => {
            anyhow::bail!("nothing to do: pass a subcommand or --list-devices");
        }
    }
}
