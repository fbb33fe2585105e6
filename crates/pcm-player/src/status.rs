use std::sync::atomic::Ordering;

use pcm_player_types::{PlayState, PlayerStatus};

use crate::format::SampleFormat;
use crate::queue::BufferQueue;
use crate::render::RenderShared;

/// Snapshot type returned to dispatch layers.
pub type StatusSnapshot = PlayerStatus;

/// Build a status snapshot from the live pieces of a player.
pub(crate) fn snapshot(
    state: PlayState,
    format: &SampleFormat,
    queue: &BufferQueue,
    render: &RenderShared,
) -> StatusSnapshot {
    let counters = render.counters();
    let played_frames = counters.played_frames.load(Ordering::Relaxed);
    PlayerStatus {
        state,
        sample_rate: format.sample_rate(),
        channels: format.channels(),
        encoding: format.encoding(),
        volume: render.gain(),
        queued_frames: queue.len_frames() as u64,
        played_frames,
        elapsed_ms: format.frames_to_ms(played_frames),
        underrun_frames: counters.underrun_frames.load(Ordering::Relaxed),
        underrun_events: counters.underrun_events.load(Ordering::Relaxed),
        contended_callbacks: counters.contended_callbacks.load(Ordering::Relaxed),
        sink_errors: counters.sink_errors.load(Ordering::Relaxed),
        dropped_spent_chunks: queue.dropped_spent(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pcm_player_types::SampleEncoding;

    use crate::state::StateMachine;

    #[test]
    fn snapshot_reports_elapsed_and_buffer_counters() {
        let format = SampleFormat::new(48_000, 2, SampleEncoding::Int16).unwrap();
        let queue = Arc::new(BufferQueue::new(format.bytes_per_frame(), 4, 0));
        queue.push(vec![0; 4 * 512]).unwrap();
        let render = RenderShared::new(queue.clone(), StateMachine::new().cell(), 0.75);
        render
            .counters()
            .played_frames
            .store(96_000, Ordering::Relaxed);
        render
            .counters()
            .underrun_events
            .store(3, Ordering::Relaxed);
        render
            .counters()
            .contended_callbacks
            .store(2, Ordering::Relaxed);
        render.counters().sink_errors.store(1, Ordering::Relaxed);

        let snap = snapshot(PlayState::Paused, &format, &queue, &render);
        assert_eq!(snap.state, PlayState::Paused);
        assert_eq!(snap.elapsed_ms, 2000);
        assert_eq!(snap.queued_frames, 512);
        assert_eq!(snap.volume, 0.75);
        assert_eq!(snap.underrun_events, 3);
        assert_eq!(snap.encoding, SampleEncoding::Int16);
        assert_eq!(snap.contended_callbacks, 2);
        assert_eq!(snap.sink_errors, 1);
        assert_eq!(snap.dropped_spent_chunks, 0);
    }
}
