//! Sample format descriptor.
//!
//! Fixed at player initialization; the queue and render driver use it to validate and
//! split fed buffers on frame boundaries.

use pcm_player_types::SampleEncoding;

use crate::error::{PlayerError, Result};

/// How fed bytes are interpreted: encoding, channel count and sample rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SampleFormat {
    sample_rate: u32,
    channels: u16,
    encoding: SampleEncoding,
}

impl SampleFormat {
    /// Validate and build a format.
    ///
    /// Fails with `InvalidFormat` when the rate or channel count is zero.
    pub fn new(sample_rate: u32, channels: u16, encoding: SampleEncoding) -> Result<Self> {
        if sample_rate == 0 {
            return Err(PlayerError::invalid_format("sample rate must be > 0"));
        }
        if channels == 0 {
            return Err(PlayerError::invalid_format("channel count must be >= 1"));
        }
        Ok(Self {
            sample_rate,
            channels,
            encoding,
        })
    }

    /// Build a format from untyped dispatcher arguments.
    ///
    /// Negative or out-of-range integers and unknown encoding codes are `InvalidFormat`.
    pub fn from_raw(sample_rate: i64, channels: i64, encoding_code: i64) -> Result<Self> {
        let rate = u32::try_from(sample_rate)
            .map_err(|_| PlayerError::invalid_format(format!("sample rate out of range: {sample_rate}")))?;
        let channels = u16::try_from(channels)
            .map_err(|_| PlayerError::invalid_format(format!("channel count out of range: {channels}")))?;
        let encoding = SampleEncoding::from_code(encoding_code).ok_or_else(|| {
            PlayerError::invalid_format(format!("unknown encoding code: {encoding_code}"))
        })?;
        Self::new(rate, channels, encoding)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn encoding(&self) -> SampleEncoding {
        self.encoding
    }

    /// Bytes in one interleaved frame (one sample per channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.encoding.bytes_per_sample() * self.channels as usize
    }

    /// Reject byte lengths that are not a whole number of frames.
    pub fn check_aligned(&self, len: usize) -> Result<()> {
        let bpf = self.bytes_per_frame();
        if len % bpf != 0 {
            return Err(PlayerError::invalid_format(format!(
                "buffer of {len} bytes is not a multiple of the {bpf}-byte frame ({} x {}ch)",
                self.encoding, self.channels
            )));
        }
        Ok(())
    }

    /// Duration of `frames` in milliseconds (saturating).
    pub fn frames_to_ms(&self, frames: u64) -> u64 {
        frames.saturating_mul(1000) / self.sample_rate as u64
    }

    /// Number of frames covering `seconds`, rounded up. Non-finite or negative input yields 0.
    pub fn frames_for_seconds(&self, seconds: f32) -> u64 {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        (self.sample_rate as f64 * seconds as f64).ceil() as u64
    }
}
