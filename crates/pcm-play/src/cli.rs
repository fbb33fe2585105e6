use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pcm_player::SampleEncoding;

#[derive(Parser, Debug)]
#[command(name = "pcm-play", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// TOML config file (CLI flags override its values)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bytes per feed call; rounded down to whole frames
    #[arg(long)]
    pub chunk_bytes: Option<usize>,

    /// Playback gain, 0.0 to 1.0
    #[arg(long)]
    pub volume: Option<f32>,

    /// Seconds of audio to keep queued ahead of the device
    #[arg(long)]
    pub lead_seconds: Option<f32>,

    /// Device callback size in frames (clamped to what the device supports)
    #[arg(long)]
    pub buffer_frames: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream a headerless little-endian PCM file
    Play {
        /// Path to raw PCM data
        path: PathBuf,

        #[arg(long, default_value_t = 44_100)]
        rate: u32,

        #[arg(long, default_value_t = 2)]
        channels: u16,

        /// int8, int16 or float32
        #[arg(long, default_value = "int16")]
        encoding: SampleEncoding,
    },

    /// Play a generated sine tone as float32 PCM
    Tone {
        #[arg(long, default_value_t = 440.0)]
        freq: f32,

        #[arg(long, default_value_t = 2.0)]
        seconds: f32,

        #[arg(long, default_value_t = 48_000)]
        rate: u32,

        #[arg(long, default_value_t = 2)]
        channels: u16,
    },
}
