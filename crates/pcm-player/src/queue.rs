//! FIFO queue of fed PCM chunks shared between the control path and the render path.
//!
//! - control path → `push` (validated, never waits on playback)
//! - render callback → `try_pull_into` (never blocks, never allocates)
//!
//! The queue is unbounded. Pushing more than `high_watermark_bytes` logs a rate-limited
//! warning so callers can see they are feeding faster than playback consumes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, Sender};

use crate::error::{PlayerError, Result};

/// Ordered queue of byte chunks holding whole interleaved frames.
///
/// ## Design
/// - **Single producer / single consumer**: the control path pushes, the render path pulls.
/// - Chunks and the read offset into the head chunk live under one [`Mutex`]. The render path
///   only ever uses `try_lock`, so a busy lock turns into one callback of silence instead of
///   a blocked audio thread.
/// - Fully consumed chunks are handed back over a bounded channel and dropped by the next
///   `push`/`clear`/`reclaim_spent`, keeping deallocation off the render thread. When the
///   channel is full the render thread frees the chunk itself; that is counted in
///   `dropped_spent` and costs at most one chunk free per consumed chunk.
/// - `queued_bytes` mirrors the locked byte count for lock-free snapshots.
pub struct BufferQueue {
    bytes_per_frame: usize,
    inner: Mutex<QueueInner>,
    queued_bytes: AtomicU64,
    reads: AtomicU64,
    spent_tx: Sender<Vec<u8>>,
    spent_rx: Receiver<Vec<u8>>,
    dropped_spent: AtomicU64,
    high_watermark_bytes: u64,
    high_watermark_ms: AtomicU64,
}

struct QueueInner {
    chunks: VecDeque<Vec<u8>>,
    head_offset: usize,
    queued_bytes: usize,
}

impl BufferQueue {
    /// Create an empty queue for frames of `bytes_per_frame` bytes.
    ///
    /// `spent_slots` sizes the channel returning consumed chunks to the control path;
    /// `high_watermark_bytes == 0` disables the backlog warning.
    pub fn new(bytes_per_frame: usize, spent_slots: usize, high_watermark_bytes: u64) -> Self {
        let (spent_tx, spent_rx) = crossbeam_channel::bounded(spent_slots.max(1));
        Self {
            bytes_per_frame: bytes_per_frame.max(1),
            inner: Mutex::new(QueueInner {
                chunks: VecDeque::new(),
                head_offset: 0,
                queued_bytes: 0,
            }),
            queued_bytes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            spent_tx,
            spent_rx,
            dropped_spent: AtomicU64::new(0),
            high_watermark_bytes,
            high_watermark_ms: AtomicU64::new(0),
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    /// Append a chunk at the tail.
    ///
    /// Fails with `InvalidFormat` (queue unchanged) when `chunk` is not a whole number of
    /// frames. Empty chunks are accepted and ignored.
    pub fn push(&self, chunk: Vec<u8>) -> Result<()> {
        if chunk.len() % self.bytes_per_frame != 0 {
            return Err(PlayerError::invalid_format(format!(
                "buffer of {} bytes is not a multiple of the {}-byte frame",
                chunk.len(),
                self.bytes_per_frame
            )));
        }
        self.reclaim_spent();
        if chunk.is_empty() {
            return Ok(());
        }

        let queued = {
            let mut g = self.lock();
            g.queued_bytes += chunk.len();
            g.chunks.push_back(chunk);
            self.queued_bytes.store(g.queued_bytes as u64, Ordering::Release);
            g.queued_bytes
        };
        self.log_high_watermark(queued as u64);
        Ok(())
    }

    /// Drain up to `dst.len() / bytes_per_frame` frames into `dst`, waiting for the lock.
    ///
    /// Returns the number of frames written; fewer than requested (possibly zero) means the
    /// queue ran dry. Use [`BufferQueue::try_pull_into`] from the render path.
    pub fn pull_into(&self, dst: &mut [u8]) -> usize {
        let mut g = self.lock();
        self.drain_locked(&mut g, dst)
    }

    /// Real-time variant of [`BufferQueue::pull_into`].
    ///
    /// Returns `None` without touching the queue when the control path holds the lock.
    pub fn try_pull_into(&self, dst: &mut [u8]) -> Option<usize> {
        let mut g = match self.inner.try_lock() {
            Ok(g) => g,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(self.drain_locked(&mut g, dst))
    }

    /// Remove and return up to `max_frames` frames as a new buffer.
    ///
    /// Allocates; intended for offline consumers and tests rather than audio callbacks.
    pub fn pull(&self, max_frames: usize) -> Vec<u8> {
        let want = max_frames.saturating_mul(self.bytes_per_frame).min(self.len_bytes());
        let mut out = vec![0u8; want];
        let frames = self.pull_into(&mut out);
        out.truncate(frames * self.bytes_per_frame);
        out
    }

    fn drain_locked(&self, g: &mut QueueInner, dst: &mut [u8]) -> usize {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let want = dst.len() - dst.len() % self.bytes_per_frame;
        let mut written = 0usize;

        while written < want {
            let Some(head) = g.chunks.front() else {
                break;
            };
            let available = head.len() - g.head_offset;
            let take = available.min(want - written);
            dst[written..written + take]
                .copy_from_slice(&head[g.head_offset..g.head_offset + take]);
            written += take;
            g.head_offset += take;

            if g.head_offset == head.len() {
                g.head_offset = 0;
                if let Some(spent) = g.chunks.pop_front() {
                    if self.spent_tx.try_send(spent).is_err() {
                        self.dropped_spent.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }

        g.queued_bytes -= written;
        self.queued_bytes
            .store(g.queued_bytes as u64, Ordering::Release);
        written / self.bytes_per_frame
    }

    /// Discard everything queued. Returns the number of bytes dropped.
    pub fn clear(&self) -> usize {
        let (dropped_bytes, dropped_chunks) = {
            let mut g = self.lock();
            let dropped_bytes = g.queued_bytes;
            g.head_offset = 0;
            g.queued_bytes = 0;
            self.queued_bytes.store(0, Ordering::Release);
            (dropped_bytes, std::mem::take(&mut g.chunks))
        };
        drop(dropped_chunks);
        self.reclaim_spent();
        tracing::trace!(bytes = dropped_bytes, "buffer queue cleared");
        dropped_bytes
    }

    /// Whether nothing is left to render.
    pub fn is_empty(&self) -> bool {
        self.len_bytes() == 0
    }

    /// Queued bytes (lock-free snapshot).
    pub fn len_bytes(&self) -> usize {
        self.queued_bytes.load(Ordering::Acquire) as usize
    }

    /// Queued whole frames (lock-free snapshot).
    pub fn len_frames(&self) -> usize {
        self.len_bytes() / self.bytes_per_frame
    }

    /// Number of pulls that reached the queue contents.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Consumed chunks the render path had to free itself because the return channel was full.
    pub fn dropped_spent(&self) -> u64 {
        self.dropped_spent.load(Ordering::Relaxed)
    }

    /// Free chunks the render path finished with.
    pub fn reclaim_spent(&self) -> usize {
        self.spent_rx.try_iter().count()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_high_watermark(&self, queued: u64) {
        if self.high_watermark_bytes == 0 || queued <= self.high_watermark_bytes {
            return;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_millis(0))
            .as_millis() as u64;
        let last = self.high_watermark_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) > 1000 {
            self.high_watermark_ms.store(now, Ordering::Relaxed);
            tracing::warn!(
                queued_bytes = queued,
                threshold_bytes = self.high_watermark_bytes,
                "buffer queue high watermark; feed is outpacing playback"
            );
        }
    }
}
