//! Audio sink abstraction.
//!
//! A [`SinkBackend`] opens a platform output stream for a [`SampleFormat`] and takes
//! ownership of the player's [`RenderDriver`]; its periodic callback calls
//! `RenderDriver::render` with the buffer the platform wants filled. The returned
//! [`AudioSink`] only starts, stops and closes that stream.
//!
//! [`ManualBackend`] is a headless backend whose callbacks are driven by the host, used for
//! offline rendering and for exercising players without hardware.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::format::SampleFormat;
use crate::render::RenderDriver;

/// Failure reported by a sink backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("output device: {0}")]
    Device(String),
    #[error("unsupported stream config: {0}")]
    UnsupportedConfig(String),
    #[error("stream: {0}")]
    Stream(String),
}

/// Opens output streams. Shared between player threads.
pub trait SinkBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Open a stream for `format`, in the stopped state, rendering through `driver`.
    fn open(
        &self,
        format: &SampleFormat,
        driver: RenderDriver,
    ) -> Result<Box<dyn AudioSink>, SinkError>;
}

/// An open output stream.
///
/// Sinks are used only from the thread that opened them.
pub trait AudioSink {
    fn start(&mut self) -> Result<(), SinkError>;

    fn stop(&mut self) -> Result<(), SinkError>;

    /// Stop the stream if needed and free the platform resource.
    fn close(self: Box<Self>) -> Result<(), SinkError>;
}

/// Headless backend; every opened stream is exposed through a [`ManualSinkProbe`].
#[derive(Clone, Default)]
pub struct ManualBackend {
    inner: Arc<ManualBackendInner>,
}

#[derive(Default)]
struct ManualBackendInner {
    fail_open: AtomicBool,
    fail_start: Arc<AtomicBool>,
    probes: Mutex<Vec<ManualSinkProbe>>,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `open` calls fail.
    pub fn fail_open(&self, fail: bool) {
        self.inner.fail_open.store(fail, Ordering::Relaxed);
    }

    /// Make `start` fail on every stream of this backend, including ones already open.
    pub fn fail_start(&self, fail: bool) {
        self.inner.fail_start.store(fail, Ordering::Relaxed);
    }

    /// Probes for every stream opened so far, oldest first.
    pub fn probes(&self) -> Vec<ManualSinkProbe> {
        self.inner
            .probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_probe(&self) -> Option<ManualSinkProbe> {
        self.probes().pop()
    }

    /// Streams opened and not yet closed.
    pub fn open_streams(&self) -> usize {
        self.probes().iter().filter(|p| !p.is_closed()).count()
    }
}

impl SinkBackend for ManualBackend {
    fn name(&self) -> &str {
        "manual"
    }

    fn open(
        &self,
        format: &SampleFormat,
        driver: RenderDriver,
    ) -> Result<Box<dyn AudioSink>, SinkError> {
        if self.inner.fail_open.load(Ordering::Relaxed) {
            return Err(SinkError::UnsupportedConfig(format!(
                "{} Hz / {} ch rejected",
                format.sample_rate(),
                format.channels()
            )));
        }
        let shared = Arc::new(ManualSinkShared {
            format: *format,
            driver: Mutex::new(driver),
            fail_start: self.inner.fail_start.clone(),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            starts: AtomicU32::new(0),
            stops: AtomicU32::new(0),
        });
        self.inner
            .probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ManualSinkProbe {
                shared: shared.clone(),
            });
        Ok(Box::new(ManualSink { shared }))
    }
}

struct ManualSinkShared {
    format: SampleFormat,
    driver: Mutex<RenderDriver>,
    fail_start: Arc<AtomicBool>,
    running: AtomicBool,
    closed: AtomicBool,
    starts: AtomicU32,
    stops: AtomicU32,
}

struct ManualSink {
    shared: Arc<ManualSinkShared>,
}

impl AudioSink for ManualSink {
    fn start(&mut self) -> Result<(), SinkError> {
        if self.shared.fail_start.load(Ordering::Relaxed) {
            return Err(SinkError::Stream("start rejected".into()));
        }
        self.shared.starts.fetch_add(1, Ordering::Relaxed);
        self.shared.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.shared.stops.fetch_add(1, Ordering::Relaxed);
        self.shared.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), SinkError> {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Host-side view of a manual stream: drives callbacks and reports lifecycle calls.
#[derive(Clone)]
pub struct ManualSinkProbe {
    shared: Arc<ManualSinkShared>,
}

impl ManualSinkProbe {
    pub fn format(&self) -> SampleFormat {
        self.shared.format
    }

    /// Run one callback for `frames` frames if the stream is running.
    ///
    /// A stopped or closed stream produces silence without invoking the driver.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        if !self.is_running() {
            return vec![0.0; frames * self.shared.format.channels() as usize];
        }
        self.render_unchecked(frames)
    }

    /// Invoke the driver regardless of the stream state, like a callback racing `stop`.
    pub fn render_unchecked(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.shared.format.channels() as usize];
        self.shared
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .render(&mut out);
        out
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> u32 {
        self.shared.starts.load(Ordering::Relaxed)
    }

    pub fn stops(&self) -> u32 {
        self.shared.stops.load(Ordering::Relaxed)
    }
}
