//! Players: one implementation per way of producing sound.
//!
//! A [`Player`] handles one or more [`SourceKind`]s. `play` blocks until the source finishes
//! or a stop is requested and returns `true` only in the latter case. `stop` may be called
//! from any thread at any time.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::Result;
use crate::source::{MusicSource, SourceKind};

mod process;
mod stream;

pub use process::{CommandBuilder, LaunchCommand, OsFamily, ProcessPlayer};
pub use stream::StreamPlayer;

pub trait Player: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn supports(&self, kind: SourceKind) -> bool;

    /// Whether a `false` return from `play` means the audio actually finished.
    ///
    /// Launch-only players return as soon as the command was issued.
    fn reports_completion(&self) -> bool {
        true
    }

    /// Play `source` at `volume_db`. Returns `true` when stopped externally.
    fn play(&self, source: &MusicSource, volume_db: f32) -> Result<bool>;

    /// Request the in-flight `play` to end. No effect when nothing is playing.
    fn stop(&self);
}

const IDLE: u8 = 0;
const ARMED: u8 = 1;
const STOP: u8 = 2;

/// External stop request for a player.
///
/// Requests only land while a call is armed, so a stop issued between calls never leaks
/// into the next one.
#[derive(Debug, Default)]
pub struct StopFlag {
    state: AtomicU8,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a call as in flight. The returned guard resets the flag when dropped.
    pub fn arm(&self) -> StopGuard<'_> {
        self.state.store(ARMED, Ordering::SeqCst);
        StopGuard { flag: self }
    }

    /// Request a stop. Returns `false` if no call was armed.
    pub fn request(&self) -> bool {
        self.state
            .compare_exchange(ARMED, STOP, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_requested(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STOP
    }
}

/// Resets its [`StopFlag`] to idle on drop.
#[must_use]
pub struct StopGuard<'a> {
    flag: &'a StopFlag,
}

impl StopGuard<'_> {
    pub fn is_requested(&self) -> bool {
        self.flag.is_requested()
    }
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.flag.state.store(IDLE, Ordering::SeqCst);
    }
}
