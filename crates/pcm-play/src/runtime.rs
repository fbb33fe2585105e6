//! Playback runtime: streams PCM into one engine player and drains it.

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use pcm_player::{
    CpalBackend, PlayState, PlayerHandle, PlayerRegistry, SampleEncoding, SampleFormat,
};

use crate::config::PlayConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    pcm_player::device::list_devices(&host)
}

/// Stream everything `source` yields through a new player, then drain and release it.
///
/// `cancel` stops feeding early; queued audio is then discarded by `stop`.
pub fn run(
    config: &PlayConfig,
    format: SampleFormat,
    mut source: impl Read,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let mut backend = CpalBackend::new(config.device.clone());
    if let Some(frames) = config.buffer_frames {
        backend = backend.with_buffer_frames(frames);
    }
    let registry = PlayerRegistry::new(Arc::new(backend), config.engine.clone());
    let handle = registry
        .initialize_format(format)
        .context("open output stream")?;
    tracing::info!(
        handle = %handle,
        rate_hz = format.sample_rate(),
        channels = format.channels(),
        encoding = %format.encoding(),
        "player ready"
    );

    let result = stream(&registry, handle, config, format, &mut source, &cancel);

    let stopped = registry.stop(handle).wait();
    if let Err(e) = &stopped {
        tracing::warn!("stop failed: {e}");
    }
    if let Ok(status) = registry.status(handle).wait() {
        tracing::info!(
            played_frames = status.played_frames,
            elapsed_ms = status.elapsed_ms,
            underrun_events = status.underrun_events,
            underrun_frames = status.underrun_frames,
            "playback finished"
        );
    }
    registry.release(handle)?;
    result
}

fn stream(
    registry: &PlayerRegistry,
    handle: PlayerHandle,
    config: &PlayConfig,
    format: SampleFormat,
    source: &mut impl Read,
    cancel: &AtomicBool,
) -> Result<()> {
    registry.set_volume(handle, config.volume).wait()?;

    let chunk_bytes = frame_aligned(config.chunk_bytes, format.bytes_per_frame());
    let lead_frames = format.frames_for_seconds(config.lead_seconds).max(1) as usize;
    let mut started = false;

    loop {
        if cancel.load(Ordering::Relaxed) {
            tracing::info!("cancelled");
            return Ok(());
        }
        let mut chunk = vec![0u8; chunk_bytes];
        let n = read_full(source, &mut chunk).context("read PCM input")?;
        if n == 0 {
            break;
        }
        chunk.truncate(n);
        let tail = n % format.bytes_per_frame();
        if tail != 0 {
            tracing::warn!(bytes = tail, "dropping trailing partial frame");
            chunk.truncate(n - tail);
        }
        if !chunk.is_empty() {
            registry.feed(handle, chunk).wait()?;
        }

        if !started {
            if queued_frames(registry, handle)? >= lead_frames {
                start(registry, handle)?;
                started = true;
            }
            continue;
        }
        while queued_frames(registry, handle)? > lead_frames {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    if !started {
        start(registry, handle)?;
    }
    while queued_frames(registry, handle)? > 0 {
        if cancel.load(Ordering::Relaxed) {
            tracing::info!("cancelled while draining");
            return Ok(());
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    Ok(())
}

fn start(registry: &PlayerRegistry, handle: PlayerHandle) -> Result<()> {
    let state = registry.play(handle).wait()?;
    debug_assert_eq!(state, PlayState::Playing);
    tracing::debug!(handle = %handle, "prebuffer filled, playing");
    Ok(())
}

fn queued_frames(registry: &PlayerRegistry, handle: PlayerHandle) -> Result<usize> {
    Ok(registry.status(handle).wait()?.queued_frames as usize)
}

/// Round `bytes` down to whole frames, keeping at least one frame.
fn frame_aligned(bytes: usize, bytes_per_frame: usize) -> usize {
    (bytes / bytes_per_frame).max(1) * bytes_per_frame
}

/// Read until `buf` is full or the source ends.
fn read_full(source: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Interleaved float32 little-endian sine at `freq` Hz, identical on every channel.
pub fn sine_tone(format: SampleFormat, freq: f32, seconds: f32) -> Vec<u8> {
    debug_assert_eq!(format.encoding(), SampleEncoding::Float32);
    let frames = format.frames_for_seconds(seconds) as usize;
    let channels = format.channels() as usize;
    let step = std::f32::consts::TAU * freq / format.sample_rate() as f32;
    let mut out = Vec::with_capacity(frames * format.bytes_per_frame());
    for i in 0..frames {
        let v = (step * i as f32).sin() * 0.5;
        for _ in 0..channels {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}
