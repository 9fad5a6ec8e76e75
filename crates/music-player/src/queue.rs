//! Bounded sample queue between an output line's writer and its CPAL callback.
//!
//! Flow:
//! - `AudioLine::write` pushes converted samples (blocking when full)
//! - optional resampler thread moves them to a second queue at the device rate
//! - the CPAL callback drains the last queue without blocking
//!
//! `close()` ends the stream: pushes stop, pops return what is left and then `None`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Thread-safe bounded queue of interleaved `f32` samples.
///
/// The `done` flag lives under the same mutex as the samples, and a single [`Condvar`]
/// signals any state change.
pub struct SampleQueue {
    channels: usize,
    inner: Mutex<QueueInner>,
    cv: Condvar,
    max_buffered_samples: usize,
}

struct QueueInner {
    samples: VecDeque<f32>,
    done: bool,
}

/// How [`SampleQueue::pop`] waits for data.
pub enum PopStrategy {
    /// Block until exactly `frames` are queued; `None` if closed first.
    BlockingExact { frames: usize },
    /// Block until at least one frame is queued, then take up to `max_frames`.
    BlockingUpTo { max_frames: usize },
    /// Take up to `max_frames` now, or `None` if empty.
    NonBlocking { max_frames: usize },
}

/// Queue capacity in samples for `buffer_seconds` of audio.
///
/// Non-finite or non-positive durations fall back to half a second.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        0.5
    };

    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.max(1).saturating_mul(channels)
}

impl SampleQueue {
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(QueueInner {
                samples: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Buffered frames (snapshot).
    pub fn len_frames(&self) -> usize {
        self.lock().samples.len() / self.channels
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Mark the queue finished and wake all waiters. Idempotent.
    pub fn close(&self) {
        self.lock().done = true;
        self.cv.notify_all();
    }

    /// Push samples, blocking while the queue is full.
    ///
    /// Returns `false` if the queue was closed before every sample was accepted.
    pub fn push_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;

        while offset < samples.len() {
            let mut g = self.lock();
            while g.samples.len() >= self.max_buffered_samples && !g.done {
                g = self.cv.wait(g).unwrap_or_else(|p| p.into_inner());
            }
            if g.done {
                return false;
            }

            let room = self.max_buffered_samples - g.samples.len();
            let take = room.min(samples.len() - offset);
            g.samples.extend(&samples[offset..offset + take]);
            offset += take;

            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Pop interleaved frames. `None` when closed and the request cannot be met.
    pub fn pop(&self, strategy: PopStrategy) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let take_samples = match strategy {
            PopStrategy::BlockingExact { frames } => {
                let want = frames * self.channels;
                while g.samples.len() < want && !g.done {
                    g = self.cv.wait(g).unwrap_or_else(|p| p.into_inner());
                }
                if g.samples.len() < want {
                    return None;
                }
                want
            }
            PopStrategy::BlockingUpTo { max_frames } => {
                while g.samples.len() < self.channels && !g.done {
                    g = self.cv.wait(g).unwrap_or_else(|p| p.into_inner());
                }
                (g.samples.len() / self.channels).min(max_frames) * self.channels
            }
            PopStrategy::NonBlocking { max_frames } => {
                (g.samples.len() / self.channels).min(max_frames) * self.channels
            }
        };

        if take_samples == 0 {
            return None;
        }
        let out: Vec<f32> = g.samples.drain(..take_samples).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Discard queued samples and close. Wakes a blocked writer.
    pub fn abort(&self) {
        let mut g = self.lock();
        g.samples.clear();
        g.done = true;
        drop(g);
        self.cv.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Block until `q` is closed and empty, or `cancel` becomes true.
///
/// Returns `true` if the queue drained normally, `false` if cancelled.
pub fn wait_until_done_and_empty_or_cancel(q: &SampleQueue, cancel: &AtomicBool) -> bool {
    let mut g = q.lock();
    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        // A trailing partial frame is never handed to the callback.
        if g.done && g.samples.len() < q.channels {
            return true;
        }
        let (ng, _timeout) = q
            .cv
            .wait_timeout(g, Duration::from_millis(50))
            .unwrap_or_else(|p| p.into_inner());
        g = ng;
    }
}
