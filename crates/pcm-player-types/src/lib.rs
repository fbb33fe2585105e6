use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Encoding of the samples carried by fed PCM buffers.
///
/// All multi-byte encodings are little-endian and interleaved by channel.
/// The integer codes match the `pcmType` values sent by dispatchers
/// (`0 = pcm8`, `1 = pcm16`, `2 = pcm32`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SampleEncoding {
    /// Signed 8-bit integer samples.
    Int8,
    /// Signed 16-bit integer samples.
    Int16,
    /// 32-bit IEEE float samples in `[-1.0, 1.0]`.
    Float32,
}

impl SampleEncoding {
    /// Size of a single sample in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleEncoding::Int8 => 1,
            SampleEncoding::Int16 => 2,
            SampleEncoding::Float32 => 4,
        }
    }

    /// Stable integer code used by dispatchers.
    pub fn code(self) -> i64 {
        match self {
            SampleEncoding::Int8 => 0,
            SampleEncoding::Int16 => 1,
            SampleEncoding::Float32 => 2,
        }
    }

    /// Decode a dispatcher integer code; `None` for anything outside the closed set.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(SampleEncoding::Int8),
            1 => Some(SampleEncoding::Int16),
            2 => Some(SampleEncoding::Float32),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleEncoding::Int8 => "int8",
            SampleEncoding::Int16 => "int16",
            SampleEncoding::Float32 => "float32",
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleEncoding {
    type Err = String;

    /// Accepts the canonical names plus the short `i8`/`s16le`/`f32` style aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int8" | "i8" | "s8" | "pcm8" => Ok(SampleEncoding::Int8),
            "int16" | "i16" | "s16" | "s16le" | "pcm16" => Ok(SampleEncoding::Int16),
            "float32" | "f32" | "f32le" | "pcm32" => Ok(SampleEncoding::Float32),
            other => Err(format!("unknown sample encoding: {other}")),
        }
    }
}

/// Lifecycle state of a player as reported to callers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlayState {
    /// Initialized, sink not running.
    Stopped,
    /// Sink running and pulling queued audio.
    Playing,
    /// Sink suspended; queued audio retained.
    Paused,
    /// No sink has been opened yet.
    Uninitialized,
    /// Terminal; every resource has been freed.
    Released,
}

impl PlayState {
    /// Integer encoding returned to dispatchers.
    ///
    /// `stopped`, `playing` and `paused` keep the ordinals callers already rely on.
    pub fn code(self) -> i32 {
        match self {
            PlayState::Stopped => 0,
            PlayState::Playing => 1,
            PlayState::Paused => 2,
            PlayState::Uninitialized => 3,
            PlayState::Released => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PlayState::Stopped),
            1 => Some(PlayState::Playing),
            2 => Some(PlayState::Paused),
            3 => Some(PlayState::Uninitialized),
            4 => Some(PlayState::Released),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PlayState::Stopped => "stopped",
            PlayState::Playing => "playing",
            PlayState::Paused => "paused",
            PlayState::Uninitialized => "uninitialized",
            PlayState::Released => "released",
        }
    }
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Point-in-time status of one player.
///
/// Counters are best-effort snapshots of values the render path updates concurrently.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlayerStatus {
    /// Current lifecycle state.
    pub state: PlayState,
    /// Stream sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Encoding of fed buffers.
    pub encoding: SampleEncoding,
    /// Current linear gain.
    pub volume: f32,
    /// Frames accepted by `feed` and not yet rendered.
    pub queued_frames: u64,
    /// Frames rendered from the queue since initialization.
    pub played_frames: u64,
    /// Elapsed playback derived from `played_frames`.
    pub elapsed_ms: u64,
    /// Frames emitted as silence because the queue ran dry while playing.
    pub underrun_frames: u64,
    /// Number of callbacks that hit an underrun.
    pub underrun_events: u64,
    /// Callbacks that found the queue busy and rendered silence instead.
    pub contended_callbacks: u64,
    /// Errors reported by the output stream, plus failed sink stops.
    pub sink_errors: u64,
    /// Consumed chunks freed on the render thread because the return channel was full.
    pub dropped_spent_chunks: u64,
}
