//! Player façade: one output stream, one queue, one state machine.
//!
//! Every operation validates against the transition table first, performs its queue or sink
//! side effect, and only then commits the new state. A failed side effect leaves the player
//! in the state it was in.
//!
//! `feed` acknowledges once the chunk is in the queue, not once it has been heard. Callers
//! that need "fully played" semantics poll [`Player::status`] until `queued_frames` is zero.

use std::sync::Arc;
use std::time::Duration;

use pcm_player_types::PlayState;

use crate::config::EngineConfig;
use crate::error::{PlayerError, Result};
use crate::format::SampleFormat;
use crate::queue::BufferQueue;
use crate::render::{RenderDriver, RenderShared};
use crate::sink::{AudioSink, SinkBackend};
use crate::state::{StateMachine, Transition};
use crate::status::{self, StatusSnapshot};

pub struct Player {
    format: SampleFormat,
    machine: StateMachine,
    queue: Arc<BufferQueue>,
    render: Arc<RenderShared>,
    sink: Option<Box<dyn AudioSink>>,
    max_volume: f32,
    release_timeout: Duration,
}

impl Player {
    /// Open a sink for `format` and return a player in the `Stopped` state.
    ///
    /// Fails with `SinkUnavailable` when the backend cannot open a matching stream.
    pub fn initialize(
        backend: &dyn SinkBackend,
        format: SampleFormat,
        config: &EngineConfig,
    ) -> Result<Self> {
        let mut machine = StateMachine::new();
        let stopped = machine.check(Transition::Initialize)?;

        let high_watermark_bytes = format
            .frames_for_seconds(config.high_watermark_seconds)
            .saturating_mul(format.bytes_per_frame() as u64);
        let queue = Arc::new(BufferQueue::new(
            format.bytes_per_frame(),
            config.spent_chunk_slots,
            high_watermark_bytes,
        ));
        let render = Arc::new(RenderShared::new(
            queue.clone(),
            machine.cell(),
            config.clamp_volume(1.0),
        ));
        let driver = RenderDriver::new(render.clone(), format, config.max_callback_frames);

        let sink = backend.open(&format, driver).map_err(|e| {
            tracing::warn!(
                backend = backend.name(),
                rate_hz = format.sample_rate(),
                channels = format.channels(),
                encoding = %format.encoding(),
                "sink open failed: {e}"
            );
            PlayerError::from(e)
        })?;

        machine.commit(stopped);
        tracing::info!(
            backend = backend.name(),
            rate_hz = format.sample_rate(),
            channels = format.channels(),
            encoding = %format.encoding(),
            "player initialized"
        );
        Ok(Self {
            format,
            machine,
            queue,
            render,
            sink: Some(sink),
            max_volume: config.max_volume,
            release_timeout: Duration::from_millis(config.release_timeout_ms),
        })
    }

    pub fn state(&self) -> PlayState {
        self.machine.current()
    }

    pub fn volume(&self) -> f32 {
        self.render.gain()
    }

    /// Frames accepted by `feed` and not yet rendered.
    pub fn queued_frames(&self) -> usize {
        self.queue.len_frames()
    }

    /// Snapshot of state and counters. Also frees chunks the render path has finished with,
    /// so a caller polling status during a long playback keeps the return channel drained.
    pub fn status(&self) -> StatusSnapshot {
        self.queue.reclaim_spent();
        status::snapshot(self.state(), &self.format, &self.queue, &self.render)
    }

    /// Start (or restart after pause) the sink. Data queued while stopped is played first.
    pub fn play(&mut self) -> Result<PlayState> {
        let to = self.machine.check(Transition::Play)?;
        self.start_sink("play")?;
        self.machine.commit(to);
        tracing::info!(queued_frames = self.queue.len_frames(), "playback started");
        Ok(to)
    }

    /// Suspend the sink, keeping queued audio.
    pub fn pause(&mut self) -> Result<PlayState> {
        let to = self.machine.check(Transition::Pause)?;
        self.machine.commit(to);
        self.stop_sink("pause");
        tracing::info!(queued_frames = self.queue.len_frames(), "playback paused");
        Ok(to)
    }

    pub fn resume(&mut self) -> Result<PlayState> {
        let to = self.machine.check(Transition::Resume)?;
        self.start_sink("resume")?;
        self.machine.commit(to);
        tracing::info!("playback resumed");
        Ok(to)
    }

    /// Stop the sink and discard everything queued.
    pub fn stop(&mut self) -> Result<PlayState> {
        let to = self.machine.check(Transition::Stop)?;
        self.machine.commit(to);
        self.stop_sink("stop");
        let dropped = self.queue.clear();
        tracing::info!(dropped_bytes = dropped, "playback stopped");
        Ok(to)
    }

    /// Queue `bytes` for playback and acknowledge with the current state.
    ///
    /// Misaligned buffers fail with `InvalidFormat` and leave the queue unchanged.
    pub fn feed(&mut self, bytes: Vec<u8>) -> Result<PlayState> {
        let state = self.machine.check(Transition::Feed)?;
        self.format.check_aligned(bytes.len())?;
        let len = bytes.len();
        self.queue.push(bytes)?;
        tracing::trace!(
            bytes = len,
            queued_frames = self.queue.len_frames(),
            "feed queued"
        );
        Ok(state)
    }

    /// Update the gain applied by the render path; clamped into `[0.0, max_volume]`.
    pub fn set_volume(&mut self, gain: f32) -> Result<PlayState> {
        let state = self.machine.check(Transition::SetVolume)?;
        if gain.is_nan() {
            return Err(PlayerError::invalid_format("volume must be a number"));
        }
        let clamped = gain.clamp(0.0, self.max_volume);
        self.render.set_gain(clamped);
        tracing::debug!(requested = gain, volume = clamped, "volume set");
        Ok(state)
    }

    /// Tear the player down: the render path is cut off from the queue before the sink is
    /// stopped and closed and the queue freed.
    ///
    /// A second call fails with `InvalidState`.
    pub fn release(&mut self) -> Result<PlayState> {
        let to = self.machine.check(Transition::Release)?;
        self.machine.commit(to);

        if !self.render.detach(self.release_timeout) {
            tracing::warn!(
                timeout_ms = self.release_timeout.as_millis() as u64,
                "render callback still running at release deadline"
            );
        }
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.stop() {
                tracing::warn!("sink stop during release failed: {e}");
            }
            if let Err(e) = sink.close() {
                tracing::warn!("sink close failed: {e}");
            }
        }
        let dropped = self.queue.clear();
        tracing::info!(dropped_bytes = dropped, "player released");
        Ok(to)
    }

    fn start_sink(&mut self, op: &'static str) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(PlayerError::invalid_state(op, self.machine.current()));
        };
        sink.start().map_err(|e| {
            tracing::warn!(op, "sink start failed: {e}");
            PlayerError::from(e)
        })
    }

    /// Sink stop failures are not surfaced: the render path already saw the new state and
    /// stopped pulling.
    fn stop_sink(&mut self, op: &'static str) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.stop() {
                self.render
                    .counters()
                    .sink_errors
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                tracing::warn!(op, "sink stop failed: {e}");
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if self.state() != PlayState::Released {
            let _ = self.release();
        }
    }
}
