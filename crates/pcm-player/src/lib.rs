//! PCM streaming playback engine.
//!
//! Callers open a player for a fixed sample format, push raw PCM chunks into it, and drive it
//! through play/pause/resume/stop/release while an output callback pulls the queued audio.
//!
//! ## Layout
//! - **Control path**: [`PlayerRegistry`] hands out [`PlayerHandle`]s; each player lives on a
//!   worker thread ([`worker`]) that serializes its commands and answers through [`Completion`]s.
//! - **Render path**: the sink callback calls [`render::RenderDriver::render`], which never blocks:
//!   it reads the state and gain from atomics and only `try_lock`s the [`queue::BufferQueue`].
//! - **Sinks**: [`CpalBackend`] plays through a real device; [`ManualBackend`] is driven by hand.

pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod playback;
pub mod player;
pub mod queue;
pub mod registry;
pub mod render;
pub mod sink;
pub mod state;
pub mod status;
pub mod worker;

pub use config::EngineConfig;
pub use error::{ErrorKind, PlayerError, Result};
pub use format::SampleFormat;
pub use playback::CpalBackend;
pub use player::Player;
pub use registry::{PlayerHandle, PlayerRegistry};
pub use sink::{AudioSink, ManualBackend, ManualSinkProbe, SinkBackend, SinkError};
pub use status::StatusSnapshot;
pub use worker::Completion;

pub use pcm_player_types::{PlayState, PlayerStatus, SampleEncoding};
