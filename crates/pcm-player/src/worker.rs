//! Player worker thread.
//!
//! Each player lives on its own thread and receives commands over a channel, so control calls
//! from any caller thread are serialized and the platform stream never leaves the thread that
//! opened it. Every command answers through a [`Completion`]; `feed` completes as soon as the
//! chunk is queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use pcm_player_types::PlayState;

use crate::config::EngineConfig;
use crate::error::{PlayerError, Result};
use crate::format::SampleFormat;
use crate::player::Player;
use crate::sink::SinkBackend;
use crate::status::StatusSnapshot;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Pending result of a player command.
#[must_use = "a completion carries the operation result"]
pub struct Completion<T> {
    rx: Receiver<Result<T>>,
    op: &'static str,
}

impl<T> Completion<T> {
    fn pending(op: &'static str) -> (Sender<Result<T>>, Self) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (tx, Self { rx, op })
    }

    /// A completion that already holds `value`.
    pub fn ready(op: &'static str, value: Result<T>) -> Self {
        let (tx, done) = Self::pending(op);
        let _ = tx.send(value);
        done
    }

    /// Block until the worker answers.
    pub fn wait(self) -> Result<T> {
        self.rx
            .recv()
            .unwrap_or_else(|_| Err(PlayerError::invalid_state(self.op, PlayState::Released)))
    }

    /// Block for at most `timeout`; `None` if the worker has not answered yet.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(v) => Some(v),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(Err(PlayerError::invalid_state(self.op, PlayState::Released)))
            }
        }
    }

    /// Non-blocking poll.
    pub fn try_get(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(v) => Some(v),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(Err(PlayerError::invalid_state(self.op, PlayState::Released)))
            }
        }
    }
}

/// Commands accepted by the player worker thread.
enum PlayerCommand {
    Feed {
        bytes: Vec<u8>,
        reply: Sender<Result<PlayState>>,
    },
    Play(Sender<Result<PlayState>>),
    Pause(Sender<Result<PlayState>>),
    Resume(Sender<Result<PlayState>>),
    Stop(Sender<Result<PlayState>>),
    SetVolume {
        gain: f32,
        reply: Sender<Result<PlayState>>,
    },
    Status(Sender<Result<StatusSnapshot>>),
    Release(Sender<Result<PlayState>>),
}

/// Handle for sending commands to one player's worker thread.
pub struct PlayerWorker {
    id: u64,
    cmd_tx: Sender<PlayerCommand>,
    join: Option<JoinHandle<()>>,
}

impl PlayerWorker {
    /// Spawn a worker and initialize its player on that thread.
    ///
    /// Returns once the sink has been opened, or with the initialization error.
    pub fn spawn(
        backend: Arc<dyn SinkBackend>,
        format: SampleFormat,
        config: EngineConfig,
    ) -> Result<Self> {
        let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (init_tx, init_rx) = crossbeam_channel::bounded(1);

        let join = std::thread::Builder::new()
            .name(format!("pcm-player-{id}"))
            .spawn(move || {
                let player = match Player::initialize(backend.as_ref(), format, &config) {
                    Ok(p) => {
                        let _ = init_tx.send(Ok(()));
                        p
                    }
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                player_thread_main(id, player, cmd_rx);
            })
            .map_err(|e| PlayerError::SinkUnavailable(format!("spawn player thread: {e}")))?;

        let init = init_rx.recv().unwrap_or_else(|_| {
            Err(PlayerError::SinkUnavailable(
                "player thread exited during initialization".into(),
            ))
        });
        if let Err(e) = init {
            let _ = join.join();
            return Err(e);
        }

        Ok(Self {
            id,
            cmd_tx,
            join: Some(join),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue `bytes`; completes on queue-accept with the state at that moment.
    pub fn feed(&self, bytes: Vec<u8>) -> Completion<PlayState> {
        self.send("feed", |reply| PlayerCommand::Feed { bytes, reply })
    }

    pub fn play(&self) -> Completion<PlayState> {
        self.send("play", PlayerCommand::Play)
    }

    pub fn pause(&self) -> Completion<PlayState> {
        self.send("pause", PlayerCommand::Pause)
    }

    pub fn resume(&self) -> Completion<PlayState> {
        self.send("resume", PlayerCommand::Resume)
    }

    pub fn stop(&self) -> Completion<PlayState> {
        self.send("stop", PlayerCommand::Stop)
    }

    pub fn set_volume(&self, gain: f32) -> Completion<PlayState> {
        self.send("set volume", |reply| PlayerCommand::SetVolume { gain, reply })
    }

    pub fn status(&self) -> Completion<StatusSnapshot> {
        self.send("status", PlayerCommand::Status)
    }

    /// Release the player and wait for its thread to exit.
    ///
    /// The sink is closed and the render path detached before this returns.
    pub fn release(&mut self) -> Result<PlayState> {
        let result = self.send("release", PlayerCommand::Release).wait();
        if result.is_ok() {
            self.join_thread();
        }
        result
    }

    fn send<T>(
        &self,
        op: &'static str,
        make: impl FnOnce(Sender<Result<T>>) -> PlayerCommand,
    ) -> Completion<T> {
        let (reply, done) = Completion::pending(op);
        if self.cmd_tx.send(make(reply)).is_err() {
            return Completion::ready(op, Err(PlayerError::invalid_state(op, PlayState::Released)));
        }
        done
    }

    fn join_thread(&mut self) {
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::warn!(worker = self.id, "player thread panicked");
            }
        }
    }
}

impl Drop for PlayerWorker {
    fn drop(&mut self) {
        if self.join.is_some() {
            let (reply, _done) = Completion::<PlayState>::pending("release");
            let _ = self.cmd_tx.send(PlayerCommand::Release(reply));
            self.join_thread();
        }
    }
}

/// Main loop for the player worker. Exits after a successful release or when every handle
/// is gone; dropping the player releases it.
fn player_thread_main(id: u64, mut player: Player, cmd_rx: Receiver<PlayerCommand>) {
    tracing::debug!(worker = id, "player worker started");
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            PlayerCommand::Feed { bytes, reply } => {
                let _ = reply.send(player.feed(bytes));
            }
            PlayerCommand::Play(reply) => {
                let _ = reply.send(player.play());
            }
            PlayerCommand::Pause(reply) => {
                let _ = reply.send(player.pause());
            }
            PlayerCommand::Resume(reply) => {
                let _ = reply.send(player.resume());
            }
            PlayerCommand::Stop(reply) => {
                let _ = reply.send(player.stop());
            }
            PlayerCommand::SetVolume { gain, reply } => {
                let _ = reply.send(player.set_volume(gain));
            }
            PlayerCommand::Status(reply) => {
                let _ = reply.send(Ok(player.status()));
            }
            PlayerCommand::Release(reply) => {
                let result = player.release();
                let released = result.is_ok();
                let _ = reply.send(result);
                if released {
                    break;
                }
            }
        }
    }
    tracing::debug!(worker = id, "player worker exiting");
}
