//! Playback scheduler for synthesized audio.
//!
//! Decoded buffers are scheduled back-to-back against a monotonic offset
//! anchored at scheduler creation: each buffer starts at
//! `max(next_start, now)` and advances the anchor by its own duration, so
//! buffers that arrive faster than they play neither gap nor overlap.
//! In-flight buffers live in an arena of abortable handles keyed by a
//! monotonically increasing id; `interrupt` is the barge-in contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as TokioMutex;
use tokio::task::AbortHandle;
use tracing::{debug, info, trace};

/// Receives samples the moment their scheduled start arrives. `stop_all`
/// must silence anything the sink is still rendering.
pub trait OutputSink: Send + Sync {
    fn play(&self, samples: &[i16], sample_rate: u32);
    fn stop_all(&self);
}

/// One decoded unit of synthesized audio awaiting scheduled playback.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.samples.len() as u64 * 1_000_000_000 / self.sample_rate as u64)
    }
}

struct SchedulerInner {
    next_start: Duration,
    next_id: u64,
    in_flight: HashMap<u64, AbortHandle>,
}

pub struct PlaybackScheduler {
    epoch: tokio::time::Instant,
    sink: Arc<dyn OutputSink>,
    inner: Arc<TokioMutex<SchedulerInner>>,
}

impl PlaybackScheduler {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self {
            epoch: tokio::time::Instant::now(),
            sink,
            inner: Arc::new(TokioMutex::new(SchedulerInner {
                next_start: Duration::ZERO,
                next_id: 0,
                in_flight: HashMap::new(),
            })),
        }
    }

    /// Offset of the output clock since scheduler creation.
    pub fn now_offset(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Schedules a buffer for gapless playback and returns its start offset.
    /// The buffer's handle stays in the in-flight arena until it finishes
    /// playing, then removes itself.
    pub async fn enqueue(&self, buffer: PlaybackBuffer) -> Duration {
        let duration = buffer.duration();
        let now = self.now_offset();

        let mut inner = self.inner.lock().await;
        let start = inner.next_start.max(now);
        inner.next_start = start + duration;
        let id = inner.next_id;
        inner.next_id += 1;

        let sink = Arc::clone(&self.sink);
        let arena = Arc::clone(&self.inner);
        let deadline = self.epoch + start;
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            sink.play(&buffer.samples, buffer.sample_rate);
            tokio::time::sleep(duration).await;
            arena.lock().await.in_flight.remove(&id);
            trace!("[Playback] Buffer {} completed.", id);
        });
        inner.in_flight.insert(id, task.abort_handle());

        debug!(
            "[Playback] Buffer {} scheduled at {:?} for {:?}.",
            id, start, duration
        );
        start
    }

    /// Barge-in: stops every in-flight buffer, clears the arena and resets
    /// the schedule so the next enqueue anchors fresh to the current time.
    pub async fn interrupt(&self) {
        let mut inner = self.inner.lock().await;
        let stopped = inner.in_flight.len();
        for (_, handle) in inner.in_flight.drain() {
            handle.abort();
        }
        inner.next_start = Duration::ZERO;
        drop(inner);
        self.sink.stop_all();
        if stopped > 0 {
            info!("[Playback] Interrupted: {} in-flight buffers stopped.", stopped);
        }
    }

    pub async fn in_flight_len(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }

    pub async fn next_start_offset(&self) -> Duration {
        self.inner.lock().await.next_start
    }
}
