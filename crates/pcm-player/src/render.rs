//! Render driver: the real-time side of a player.
//!
//! A sink calls [`RenderDriver::render`] from its periodic audio callback. The driver:
//! - outputs silence and does not touch the queue unless the player is `Playing`
//! - pulls whole frames from the queue into a preallocated scratch block
//! - decodes them to interleaved `f32` and applies the current gain
//! - fills any shortfall with silence (underrun) and counts it
//!
//! Nothing here allocates, blocks or logs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use pcm_player_types::SampleEncoding;

use crate::format::SampleFormat;
use crate::queue::BufferQueue;
use crate::state::StateCell;

/// Counters updated by the render path. All values are monotonic.
#[derive(Debug, Default)]
pub struct RenderCounters {
    /// Frames rendered from queued audio.
    pub played_frames: AtomicU64,
    /// Frames filled with silence because the queue ran dry while playing.
    pub underrun_frames: AtomicU64,
    /// Callbacks that ran out of queued audio.
    pub underrun_events: AtomicU64,
    /// Callbacks that found the queue lock busy and rendered silence.
    pub contended_callbacks: AtomicU64,
    /// Errors reported by the platform stream, plus failed sink stops.
    pub sink_errors: AtomicU64,
}

/// State shared between a player's control path and its render callback.
pub struct RenderShared {
    queue: Arc<BufferQueue>,
    state: Arc<StateCell>,
    gain_bits: AtomicU32,
    detached: AtomicBool,
    in_callback: AtomicU32,
    counters: RenderCounters,
}

impl RenderShared {
    pub fn new(queue: Arc<BufferQueue>, state: Arc<StateCell>, gain: f32) -> Self {
        Self {
            queue,
            state,
            gain_bits: AtomicU32::new(gain.to_bits()),
            detached: AtomicBool::new(false),
            in_callback: AtomicU32::new(0),
            counters: RenderCounters::default(),
        }
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain_bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn counters(&self) -> &RenderCounters {
        &self.counters
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// Cut the render path off from the queue and wait for in-flight callbacks.
    ///
    /// Any callback that starts after this call outputs silence without reading the queue.
    /// Returns `false` if a callback was still running when `timeout` elapsed.
    pub fn detach(&self, timeout: Duration) -> bool {
        self.detached.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + timeout;
        while self.in_callback.load(Ordering::SeqCst) != 0 {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::yield_now();
        }
        true
    }
}

/// Marks a callback as in flight for the duration of its scope.
struct CallbackGuard<'a>(&'a AtomicU32);

impl<'a> CallbackGuard<'a> {
    fn enter(counter: &'a AtomicU32) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CallbackGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-stream render state owned by the sink's callback.
pub struct RenderDriver {
    shared: Arc<RenderShared>,
    format: SampleFormat,
    scratch: Vec<u8>,
    #[cfg(test)]
    between_blocks: Option<Box<dyn FnMut() + Send>>,
}

impl RenderDriver {
    /// `max_block_frames` sizes the scratch block; larger requests are rendered in pieces.
    pub fn new(shared: Arc<RenderShared>, format: SampleFormat, max_block_frames: usize) -> Self {
        let scratch = vec![0u8; max_block_frames.max(1) * format.bytes_per_frame()];
        Self {
            shared,
            format,
            scratch,
            #[cfg(test)]
            between_blocks: None,
        }
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.format.channels() as usize
    }

    pub fn shared(&self) -> &Arc<RenderShared> {
        &self.shared
    }

    /// Fill `out` (interleaved `f32`, `out.len() / channels` frames) for one callback.
    ///
    /// The state is re-read before every block, so a stop or pause committed mid-callback
    /// leaves the rest of the queue untouched.
    ///
    /// Returns the number of frames taken from the queue.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        let shared = &*self.shared;
        let _guard = CallbackGuard::enter(&shared.in_callback);
        if shared.is_detached() || !shared.state.is_playing() {
            out.fill(0.0);
            return 0;
        }

        let channels = self.channels();
        let bpf = self.format.bytes_per_frame();
        let total_frames = out.len() / channels;
        let block_frames = self.scratch.len() / bpf;
        let gain = shared.gain();
        let encoding = self.format.encoding();

        let mut done = 0usize;
        let mut contended = false;
        let mut interrupted = false;
        while done < total_frames {
            if shared.is_detached() || !shared.state.is_playing() {
                interrupted = true;
                break;
            }
            let want = (total_frames - done).min(block_frames);
            let got = match shared.queue.try_pull_into(&mut self.scratch[..want * bpf]) {
                Some(frames) => frames,
                None => {
                    contended = true;
                    0
                }
            };
            decode_into(
                encoding,
                &self.scratch[..got * bpf],
                &mut out[done * channels..(done + got) * channels],
                gain,
            );
            done += got;
            if got < want {
                break;
            }
            #[cfg(test)]
            if let Some(hook) = self.between_blocks.as_mut() {
                hook();
            }
        }

        out[done * channels..].fill(0.0);
        let counters = &shared.counters;
        if done > 0 {
            counters
                .played_frames
                .fetch_add(done as u64, Ordering::Relaxed);
        }
        if contended {
            counters.contended_callbacks.fetch_add(1, Ordering::Relaxed);
        } else if done < total_frames && !interrupted {
            counters.underrun_events.fetch_add(1, Ordering::Relaxed);
            counters
                .underrun_frames
                .fetch_add((total_frames - done) as u64, Ordering::Relaxed);
        }
        done
    }
}

/// Decode little-endian samples from `src` into `dst`, scaled by `gain`.
///
/// `dst.len()` must equal the number of samples in `src`.
fn decode_into(encoding: SampleEncoding, src: &[u8], dst: &mut [f32], gain: f32) {
    match encoding {
        SampleEncoding::Int8 => {
            for (d, &b) in dst.iter_mut().zip(src) {
                *d = (b as i8) as f32 / 128.0 * gain;
            }
        }
        SampleEncoding::Int16 => {
            for (d, b) in dst.iter_mut().zip(src.chunks_exact(2)) {
                *d = i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0 * gain;
            }
        }
        SampleEncoding::Float32 => {
            for (d, b) in dst.iter_mut().zip(src.chunks_exact(4)) {
                let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                *d = if v.is_finite() { v * gain } else { 0.0 };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateMachine;
    use pcm_player_types::PlayState;

    fn driver(
        encoding: SampleEncoding,
        channels: u16,
        block: usize,
    ) -> (RenderDriver, Arc<BufferQueue>, StateMachine) {
        let format = SampleFormat::new(48_000, channels, encoding).unwrap();
        let queue = Arc::new(BufferQueue::new(format.bytes_per_frame(), 8, 0));
        let mut sm = StateMachine::new();
        sm.commit(PlayState::Stopped);
        let shared = Arc::new(RenderShared::new(queue.clone(), sm.cell(), 1.0));
        (RenderDriver::new(shared, format, block), queue, sm)
    }

    fn i16_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn silent_and_no_pull_unless_playing() {
        let (mut drv, queue, mut sm) = driver(SampleEncoding::Int16, 2, 64);
        queue.push(i16_bytes(&[1000, 1000])).unwrap();
        let reads = queue.read_count();

        for state in [PlayState::Stopped, PlayState::Paused] {
            sm.commit(state);
            let mut out = [1.0f32; 4];
            assert_eq!(drv.render(&mut out), 0);
            assert_eq!(out, [0.0; 4]);
        }
        assert_eq!(queue.read_count(), reads);
        assert_eq!(queue.len_frames(), 1);
    }

    #[test]
    fn underrun_fills_remainder_with_silence() {
        let (mut drv, queue, mut sm) = driver(SampleEncoding::Int16, 2, 64);
        sm.commit(PlayState::Playing);
        queue.push(i16_bytes(&[16384, -16384])).unwrap();

        let mut out = [9.0f32; 6];
        assert_eq!(drv.render(&mut out), 1);
        assert_eq!(out, [0.5, -0.5, 0.0, 0.0, 0.0, 0.0]);

        let counters = drv.shared().counters();
        assert_eq!(counters.played_frames.load(Ordering::Relaxed), 1);
        assert_eq!(counters.underrun_frames.load(Ordering::Relaxed), 2);
        assert_eq!(counters.underrun_events.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn large_requests_are_rendered_in_blocks() {
        let (mut drv, queue, mut sm) = driver(SampleEncoding::Int8, 1, 3);
        sm.commit(PlayState::Playing);
        queue.push(vec![64u8; 10]).unwrap();

        let mut out = [0.0f32; 10];
        assert_eq!(drv.render(&mut out), 10);
        assert!(out.iter().all(|&v| v == 0.5));
        assert_eq!(drv.shared().counters().underrun_events.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn pause_between_blocks_keeps_the_rest_queued() {
        let (mut drv, queue, mut sm) = driver(SampleEncoding::Int8, 1, 2);
        sm.commit(PlayState::Playing);
        queue.push(vec![64u8; 6]).unwrap();
        drv.between_blocks = Some(Box::new(move || sm.commit(PlayState::Paused)));

        let mut out = [1.0f32; 6];
        assert_eq!(drv.render(&mut out), 2);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(queue.len_frames(), 4);
        assert_eq!(drv.shared().counters().underrun_events.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn gain_is_applied_per_sample() {
        let (mut drv, queue, mut sm) = driver(SampleEncoding::Float32, 1, 16);
        sm.commit(PlayState::Playing);
        let bytes: Vec<u8> = [0.5f32, -1.0, f32::NAN]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        queue.push(bytes).unwrap();
        drv.shared().set_gain(0.5);

        let mut out = [0.0f32; 3];
        drv.render(&mut out);
        assert_eq!(out, [0.25, -0.5, 0.0]);
    }

    #[test]
    fn zero_gain_renders_silence() {
        let (mut drv, queue, mut sm) = driver(SampleEncoding::Int16, 2, 16);
        sm.commit(PlayState::Playing);
        drv.shared().set_gain(0.0);
        queue.push(i16_bytes(&[32767, -32768, 1200, -5])).unwrap();

        let mut out = [1.0f32; 4];
        assert_eq!(drv.render(&mut out), 2);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn detached_driver_never_reads_the_queue() {
        let (mut drv, queue, mut sm) = driver(SampleEncoding::Int16, 1, 16);
        sm.commit(PlayState::Playing);
        queue.push(i16_bytes(&[100, 200])).unwrap();
        assert!(drv.shared().detach(Duration::from_millis(10)));

        let reads = queue.read_count();
        let mut out = [1.0f32; 2];
        assert_eq!(drv.render(&mut out), 0);
        assert_eq!(out, [0.0, 0.0]);
        assert_eq!(queue.read_count(), reads);
    }

    #[test]
    fn detach_times_out_while_callback_in_flight() {
        let (drv, _queue, _sm) = driver(SampleEncoding::Int16, 1, 16);
        let shared = drv.shared().clone();
        let _guard = CallbackGuard::enter(&shared.in_callback);
        assert!(!shared.detach(Duration::from_millis(5)));
    }

    #[test]
    fn decode_int8_and_int16_ranges() {
        let mut out = [0.0f32; 3];
        decode_into(SampleEncoding::Int8, &[0x80, 0x00, 0x7f], &mut out, 1.0);
        assert_eq!(out[0], -1.0);
        assert_eq!(out[1], 0.0);
        assert!((out[2] - 127.0 / 128.0).abs() < f32::EPSILON);

        let mut out = [0.0f32; 2];
        decode_into(SampleEncoding::Int16, &i16_bytes(&[i16::MIN, 0]), &mut out, 1.0);
        assert_eq!(out, [-1.0, 0.0]);
    }
}
