//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - finding a stream config that carries a player's exact rate and channel count

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device matching `needle` (case-insensitive), or the default device.
///
/// Returns an error if no suitable device is found.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .context("No output devices")?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose a supported output config with exactly `channels` channels at `rate_hz`.
///
/// Among matching ranges, prefers the sample format that needs the least conversion from
/// the render path's `f32` output. Errors when the device cannot carry the format as-is.
pub fn pick_output_config(
    device: &cpal::Device,
    channels: u16,
    rate_hz: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query supported output configs")?
        .collect();
    if ranges.is_empty() {
        return Err(anyhow!("No supported output configs"));
    }

    let best = ranges
        .into_iter()
        .filter(|r| r.channels() == channels)
        .filter(|r| r.min_sample_rate() <= rate_hz && rate_hz <= r.max_sample_rate())
        .min_by_key(|r| sample_format_rank(r.sample_format()));

    match best {
        Some(range) => Ok(range.with_sample_rate(rate_hz)),
        None => Err(anyhow!(
            "device does not support {channels} channel(s) at {rate_hz} Hz"
        )),
    }
}

/// Pick a stream buffer size.
///
/// If the device reports a range, `preferred_frames` is clamped into it (or the largest
/// size up to 16384 frames is used). If `Unknown`, returns `None` so CPAL uses the device
/// default.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    preferred_frames: Option<u32>,
) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(clamp_buffer_frames(*min, *max, preferred_frames)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

fn clamp_buffer_frames(min: u32, max: u32, preferred: Option<u32>) -> u32 {
    const MAX_FRAMES: u32 = 16_384;
    match preferred {
        Some(frames) => frames.clamp(min, max.max(min)),
        None if max > MAX_FRAMES => min.max(MAX_FRAMES),
        None => max,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

/// Log available output devices for the current host to stdout.
///
/// This is intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
        if let Ok(ranges) = d.supported_output_configs() {
            for r in ranges {
                println!(
                    "    {} ch, {}-{} Hz, {:?}",
                    r.channels(),
                    r.min_sample_rate(),
                    r.max_sample_rate(),
                    r.sample_format()
                );
            }
        }
    }
    Ok(())
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
