//! CPAL output backend.
//!
//! Opens an output stream whose real-time callback renders through the player's
//! [`RenderDriver`]. The callback:
//! - renders interleaved `f32` into a preallocated mix block, one block at a time
//! - converts `f32` samples to the device sample format
//! - never allocates, blocks or logs

use std::sync::atomic::Ordering;

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::device;
use crate::format::SampleFormat;
use crate::render::RenderDriver;
use crate::sink::{AudioSink, SinkBackend, SinkError};

/// Sink backend that plays through a CPAL output device.
#[derive(Clone, Debug, Default)]
pub struct CpalBackend {
    device: Option<String>,
    buffer_frames: Option<u32>,
}

impl CpalBackend {
    /// `device` selects an output device by case-insensitive substring; `None` uses the
    /// host default.
    pub fn new(device: Option<String>) -> Self {
        Self {
            device: device.and_then(|name| {
                let trimmed = name.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }),
            buffer_frames: None,
        }
    }

    /// Request a fixed callback size; clamped to what the device supports.
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_frames = Some(frames);
        self
    }
}

impl SinkBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(
        &self,
        format: &SampleFormat,
        driver: RenderDriver,
    ) -> Result<Box<dyn AudioSink>, SinkError> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, self.device.as_deref())
            .map_err(|e| SinkError::Device(format!("{e:#}")))?;
        let config = device::pick_output_config(&device, format.channels(), format.sample_rate())
            .map_err(|e| SinkError::UnsupportedConfig(format!("{e:#}")))?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(buf) = device::pick_buffer_size(&config, self.buffer_frames) {
            stream_config.buffer_size = buf;
        }

        let stream = build_output_stream(&device, &stream_config, config.sample_format(), driver)
            .map_err(|e| SinkError::Stream(format!("{e:#}")))?;
        // Some hosts start streams on creation; players open in the stopped state.
        if let Err(e) = stream.pause() {
            tracing::debug!("initial stream pause not supported: {e}");
        }

        tracing::info!(
            device = %device.description().map(|d| d.to_string()).unwrap_or_default(),
            rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            sample_format = ?config.sample_format(),
            buffer_size = ?stream_config.buffer_size,
            "output stream opened"
        );
        Ok(Box::new(CpalSink { stream }))
    }
}

struct CpalSink {
    stream: cpal::Stream,
}

impl AudioSink for CpalSink {
    fn start(&mut self) -> Result<(), SinkError> {
        self.stream
            .play()
            .map_err(|e| SinkError::Stream(e.to_string()))
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.stream
            .pause()
            .map_err(|e| SinkError::Stream(e.to_string()))
    }

    fn close(self: Box<Self>) -> Result<(), SinkError> {
        let stopped = self.stream.pause();
        // Dropping the stream tears down the platform callback.
        drop(self.stream);
        stopped.map_err(|e| SinkError::Stream(e.to_string()))
    }
}

/// Build a CPAL output stream rendering through `driver`.
///
/// ## Real-time constraints
/// The mix block is allocated here, once. The callback only renders into it and converts,
/// so underruns, contention and a stopped player all come out as zeros.
fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    driver: RenderDriver,
) -> anyhow::Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, driver),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, driver),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, driver),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, driver),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut driver: RenderDriver,
) -> anyhow::Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let block_frames = match config.buffer_size {
        cpal::BufferSize::Fixed(frames) => frames.max(1) as usize,
        cpal::BufferSize::Default => 4096,
    };
    let mut mix = vec![0.0f32; block_frames * channels];

    // Stream errors land in the player's counters and show up in its status.
    let shared = driver.shared().clone();
    let err_fn = move |err: cpal::StreamError| {
        shared
            .counters()
            .sink_errors
            .fetch_add(1, Ordering::Relaxed);
        tracing::warn!("stream error: {err}");
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            for block in data.chunks_mut(mix.len()) {
                let mix = &mut mix[..block.len()];
                driver.render(mix);
                for (dst, &src) in block.iter_mut().zip(mix.iter()) {
                    *dst = <T as cpal::Sample>::from_sample::<f32>(src);
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_options_are_normalized() {
        let backend = CpalBackend::new(Some("  USB DAC ".into())).with_buffer_frames(512);
        assert_eq!(backend.device.as_deref(), Some("USB DAC"));
        assert_eq!(backend.buffer_frames, Some(512));

        let backend = CpalBackend::new(Some("   ".into()));
        assert_eq!(backend.device, None);
        assert_eq!(backend.buffer_frames, None);
    }
}
