//! Player registry: live players addressed by generation-checked handles.
//!
//! Slots are reused after release, but each reuse bumps the slot generation, so a handle to a
//! released player can never reach the player that later takes its slot.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pcm_player_types::{PlayState, SampleEncoding};

use crate::config::EngineConfig;
use crate::error::{PlayerError, Result};
use crate::format::SampleFormat;
use crate::sink::SinkBackend;
use crate::status::StatusSnapshot;
use crate::worker::{Completion, PlayerWorker};

/// Opaque reference to one live player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlayerHandle {
    index: u32,
    generation: u32,
}

impl PlayerHandle {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into a single integer for dispatchers that only carry numbers.
    pub fn to_raw(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl fmt::Display for PlayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot {
    generation: u32,
    worker: Option<PlayerWorker>,
}

#[derive(Default)]
struct Slots {
    entries: Vec<Slot>,
    free: Vec<u32>,
}

impl Slots {
    fn get(&self, handle: PlayerHandle) -> Option<&PlayerWorker> {
        let slot = self.entries.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.worker.as_ref()
    }

    fn insert(&mut self, worker: PlayerWorker) -> PlayerHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.entries[index as usize];
            slot.worker = Some(worker);
            return PlayerHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.entries.len() as u32;
        self.entries.push(Slot {
            generation: 0,
            worker: Some(worker),
        });
        PlayerHandle {
            index,
            generation: 0,
        }
    }

    /// Error for a handle with no live player: `InvalidState` if it names a player this
    /// slot already released, `NotFound` if it was never handed out.
    fn missing(&self, handle: PlayerHandle, op: &'static str) -> PlayerError {
        match self.entries.get(handle.index as usize) {
            Some(slot) if handle.generation < slot.generation => {
                PlayerError::invalid_state(op, PlayState::Released)
            }
            _ => PlayerError::NotFound(handle.to_string()),
        }
    }

    fn remove(&mut self, handle: PlayerHandle) -> Option<PlayerWorker> {
        let slot = self.entries.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let worker = slot.worker.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(worker)
    }
}

/// Holds zero or more players and dispatches operations by handle.
pub struct PlayerRegistry {
    backend: Arc<dyn SinkBackend>,
    config: EngineConfig,
    slots: Mutex<Slots>,
}

impl PlayerRegistry {
    pub fn new(backend: Arc<dyn SinkBackend>, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open a new player; the handle is returned once its sink is open.
    pub fn initialize(
        &self,
        sample_rate: u32,
        channels: u16,
        encoding: SampleEncoding,
    ) -> Result<PlayerHandle> {
        let format = SampleFormat::new(sample_rate, channels, encoding)?;
        self.initialize_format(format)
    }

    pub fn initialize_format(&self, format: SampleFormat) -> Result<PlayerHandle> {
        let worker = PlayerWorker::spawn(self.backend.clone(), format, self.config.clone())?;
        let worker_id = worker.id();
        let handle = self.lock().insert(worker);
        tracing::info!(handle = %handle, worker = worker_id, "player registered");
        Ok(handle)
    }

    pub fn feed(&self, handle: PlayerHandle, bytes: Vec<u8>) -> Completion<PlayState> {
        self.dispatch(handle, "feed", |w| w.feed(bytes))
    }

    pub fn play(&self, handle: PlayerHandle) -> Completion<PlayState> {
        self.dispatch(handle, "play", PlayerWorker::play)
    }

    pub fn pause(&self, handle: PlayerHandle) -> Completion<PlayState> {
        self.dispatch(handle, "pause", PlayerWorker::pause)
    }

    pub fn resume(&self, handle: PlayerHandle) -> Completion<PlayState> {
        self.dispatch(handle, "resume", PlayerWorker::resume)
    }

    pub fn stop(&self, handle: PlayerHandle) -> Completion<PlayState> {
        self.dispatch(handle, "stop", PlayerWorker::stop)
    }

    pub fn set_volume(&self, handle: PlayerHandle, gain: f32) -> Completion<PlayState> {
        self.dispatch(handle, "set volume", |w| w.set_volume(gain))
    }

    pub fn status(&self, handle: PlayerHandle) -> Completion<StatusSnapshot> {
        self.dispatch(handle, "status", PlayerWorker::status)
    }

    /// Release a player and free its slot.
    ///
    /// Returns after the render path has stopped and the sink is closed. Using the handle
    /// afterwards, including a second release, fails with `InvalidState`.
    pub fn release(&self, handle: PlayerHandle) -> Result<PlayerHandle> {
        let mut worker = {
            let mut slots = self.lock();
            match slots.remove(handle) {
                Some(worker) => worker,
                None => return Err(slots.missing(handle, "release")),
            }
        };
        worker.release()?;
        tracing::info!(handle = %handle, "player unregistered");
        Ok(handle)
    }

    /// Release every live player. Returns how many were released.
    pub fn release_all(&self) -> usize {
        let workers: Vec<(PlayerHandle, PlayerWorker)> = {
            let mut slots = self.lock();
            let handles: Vec<PlayerHandle> = slots
                .entries
                .iter()
                .enumerate()
                .filter(|(_, s)| s.worker.is_some())
                .map(|(i, s)| PlayerHandle {
                    index: i as u32,
                    generation: s.generation,
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|h| slots.remove(h).map(|w| (h, w)))
                .collect()
        };
        let count = workers.len();
        for (handle, mut worker) in workers {
            if let Err(e) = worker.release() {
                tracing::warn!(handle = %handle, "release during shutdown failed: {e}");
            }
        }
        count
    }

    /// Number of live players.
    pub fn len(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|s| s.worker.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, handle: PlayerHandle) -> bool {
        self.lock().get(handle).is_some()
    }

    fn dispatch<T>(
        &self,
        handle: PlayerHandle,
        op: &'static str,
        f: impl FnOnce(&PlayerWorker) -> Completion<T>,
    ) -> Completion<T> {
        let slots = self.lock();
        match slots.get(handle) {
            Some(worker) => f(worker),
            None => Completion::ready(op, Err(slots.missing(handle, op))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PlayerRegistry {
    fn drop(&mut self) {
        let released = self.release_all();
        if released > 0 {
            tracing::debug!(count = released, "registry dropped with live players");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sink::ManualBackend;

    fn registry() -> (PlayerRegistry, ManualBackend) {
        let backend = ManualBackend::new();
        let reg = PlayerRegistry::new(Arc::new(backend.clone()), EngineConfig::default());
        (reg, backend)
    }

    #[test]
    fn handles_round_trip_through_raw() {
        let h = PlayerHandle {
            index: 7,
            generation: 3,
        };
        assert_eq!(PlayerHandle::from_raw(h.to_raw()), h);
        assert_eq!(h.to_string(), "7v3");
    }

    #[test]
    fn released_handle_does_not_alias_reused_slot() {
        let (reg, _backend) = registry();
        let first = reg.initialize(44_100, 2, SampleEncoding::Int16).unwrap();
        assert_eq!(reg.release(first).unwrap(), first);

        let second = reg.initialize(44_100, 2, SampleEncoding::Int16).unwrap();
        assert_eq!(second.index(), first.index());
        assert_ne!(second, first);

        let err = reg.play(first).wait().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(reg.play(second).wait().unwrap(), PlayState::Playing);
    }

    #[test]
    fn release_twice_is_invalid_state() {
        let (reg, backend) = registry();
        let h = reg.initialize(8_000, 1, SampleEncoding::Int8).unwrap();
        reg.release(h).unwrap();
        assert_eq!(reg.release(h).unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(backend.open_streams(), 0);
        assert!(reg.is_empty());
    }

    #[test]
    fn released_handle_rejects_every_operation() {
        let (reg, _backend) = registry();
        let h = reg.initialize(44_100, 2, SampleEncoding::Int16).unwrap();
        reg.play(h).wait().unwrap();
        reg.release(h).unwrap();

        let errs = [
            reg.play(h).wait().unwrap_err(),
            reg.pause(h).wait().unwrap_err(),
            reg.resume(h).wait().unwrap_err(),
            reg.stop(h).wait().unwrap_err(),
            reg.feed(h, vec![0; 4]).wait().unwrap_err(),
            reg.set_volume(h, 0.5).wait().unwrap_err(),
        ];
        for err in errs {
            assert_eq!(err.kind(), ErrorKind::InvalidState, "{err}");
        }
        assert_eq!(
            reg.status(h).wait().unwrap_err(),
            PlayerError::invalid_state("status", PlayState::Released)
        );
    }

    #[test]
    fn unknown_handles_are_not_found() {
        let (reg, _backend) = registry();
        let h = reg.initialize(44_100, 2, SampleEncoding::Int16).unwrap();

        let never_allocated = PlayerHandle::from_raw(42);
        assert_eq!(
            reg.play(never_allocated).wait().unwrap_err().kind(),
            ErrorKind::NotFound
        );
        let future = PlayerHandle {
            index: h.index(),
            generation: h.generation() + 1,
        };
        assert_eq!(reg.release(future).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(reg.contains(h));
    }

    #[test]
    fn initialize_failures_do_not_register() {
        let (reg, backend) = registry();
        assert_eq!(
            reg.initialize(0, 2, SampleEncoding::Int16).unwrap_err().kind(),
            ErrorKind::InvalidFormat
        );
        backend.fail_open(true);
        assert_eq!(
            reg.initialize(44_100, 2, SampleEncoding::Int16)
                .unwrap_err()
                .kind(),
            ErrorKind::SinkUnavailable
        );
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn players_are_independent() {
        let (reg, _backend) = registry();
        let a = reg.initialize(44_100, 2, SampleEncoding::Int16).unwrap();
        let b = reg.initialize(48_000, 1, SampleEncoding::Float32).unwrap();
        reg.feed(a, vec![0; 8]).wait().unwrap();
        reg.play(b).wait().unwrap();

        assert_eq!(reg.status(a).wait().unwrap().queued_frames, 2);
        assert_eq!(reg.status(a).wait().unwrap().state, PlayState::Stopped);
        assert_eq!(reg.status(b).wait().unwrap().state, PlayState::Playing);
        assert_eq!(reg.len(), 2);
        assert!(reg.contains(a));
    }

    #[test]
    fn release_all_closes_every_sink() {
        let (reg, backend) = registry();
        for _ in 0..3 {
            reg.initialize(44_100, 2, SampleEncoding::Int16).unwrap();
        }
        assert_eq!(backend.open_streams(), 3);
        assert_eq!(reg.release_all(), 3);
        assert_eq!(backend.open_streams(), 0);
        assert!(reg.is_empty());
    }
}
