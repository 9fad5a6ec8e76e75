//! Player registry: one active player at a time.
//!
//! The registry owns the players, maps each [`SourceKind`] to the first player that supports
//! it (cached on first use) and serializes every `play` call through a single gate.
//! [`PlayerRegistry::stop_active_player`] signals the active player and then waits for the
//! gate to become free, so when it returns the device or process has been released.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::events::{EventSink, PlaybackEvent};
use crate::line::LineProvider;
use crate::player::{Player, ProcessPlayer, StreamPlayer};
use crate::source::{MusicSource, ResourceBundle, SourceKind};

#[derive(Default)]
struct GateState {
    busy: bool,
    last_active: Option<Arc<dyn Player>>,
}

/// Mutual exclusion for `play` calls plus the last dispatched player.
#[derive(Default)]
struct PlayGate {
    state: Mutex<GateState>,
    cv: Condvar,
}

struct GateGuard<'a> {
    gate: &'a PlayGate,
}

impl PlayGate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Block until the gate is free, take it and record `player` as active until the guard
    /// drops.
    fn acquire(&self, player: Arc<dyn Player>) -> GateGuard<'_> {
        let mut g = self.lock();
        while g.busy {
            g = self.cv.wait(g).unwrap_or_else(|p| p.into_inner());
        }
        g.busy = true;
        g.last_active = Some(player);
        GateGuard { gate: self }
    }

    /// Wait up to `timeout` for the gate to be free. Returns `true` if it is.
    fn wait_idle(&self, timeout: Duration) -> bool {
        let g = self.lock();
        let (g, _timeout) = self
            .cv
            .wait_timeout_while(g, timeout, |s| s.busy)
            .unwrap_or_else(|p| p.into_inner());
        !g.busy
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        {
            let mut g = self.gate.lock();
            g.busy = false;
            g.last_active = None;
        }
        self.gate.cv.notify_all();
    }
}

/// Dispatches sources to players, one call at a time.
pub struct PlayerRegistry {
    players: Vec<Arc<dyn Player>>,
    resolved: RwLock<HashMap<SourceKind, Arc<dyn Player>>>,
    gate: PlayGate,
    stop_lock: Mutex<()>,
    events: Arc<dyn EventSink>,
    stop_poll: Duration,
}

impl PlayerRegistry {
    /// Registry over `players`. For each kind the first supporting player wins.
    pub fn new(players: Vec<Arc<dyn Player>>, events: Arc<dyn EventSink>) -> Self {
        Self {
            players,
            resolved: RwLock::new(HashMap::new()),
            gate: PlayGate::default(),
            stop_lock: Mutex::new(()),
            events,
            stop_poll: Duration::from_millis(50),
        }
    }

    /// Stream player on `lines` plus the launch-command player for this OS.
    pub fn with_defaults(
        lines: Arc<dyn LineProvider>,
        resources: Arc<ResourceBundle>,
        playback: &PlaybackConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let stream = StreamPlayer::new(lines, resources)
            .with_block_bytes(playback.block_bytes)
            .with_http_config(playback.http_stream());
        let process =
            ProcessPlayer::new(events.clone()).with_poll_interval(playback.process_poll());
        let players: Vec<Arc<dyn Player>> = vec![Arc::new(stream), Arc::new(process)];
        Self::new(players, events).with_stop_poll(playback.process_poll())
    }

    /// How often `stop_active_player` re-signals while waiting.
    pub fn with_stop_poll(mut self, poll: Duration) -> Self {
        self.stop_poll = poll.max(Duration::from_millis(1));
        self
    }

    /// Play `source` with the registered player for its kind.
    ///
    /// Blocks while another call is in flight. Returns `true` if the call was stopped
    /// externally.
    pub fn play(&self, source: &MusicSource, default_volume_db: f32) -> Result<bool> {
        let player = self.resolve(source.kind())?;
        let _gate = self.gate.acquire(player.clone());

        self.events.emit(PlaybackEvent::NowPlaying {
            source: source.to_string(),
        });
        let volume_db = source.effective_volume_db(default_volume_db);
        tracing::debug!(player = player.name(), volume_db, "dispatching");
        player.play(source, volume_db)
    }

    /// Stop the active player and block until its `play` call has returned.
    pub fn stop_active_player(&self) {
        let _serial = self.stop_lock.lock().unwrap_or_else(|p| p.into_inner());

        loop {
            // Re-signal on every poll: a call that had not armed its stop flag yet would
            // otherwise miss the first request.
            let active = self.gate.lock().last_active.clone();
            if let Some(player) = active {
                player.stop();
            }
            if self.gate.wait_idle(self.stop_poll) {
                break;
            }
        }
    }

    /// Whether a `play` call is in flight.
    pub fn is_playing(&self) -> bool {
        self.gate.lock().busy
    }

    /// Whether the player for `kind` can tell a finished source from a launched one.
    pub fn reports_completion(&self, kind: SourceKind) -> Result<bool> {
        Ok(self.resolve(kind)?.reports_completion())
    }

    fn resolve(&self, kind: SourceKind) -> Result<Arc<dyn Player>> {
        if let Some(player) = self
            .resolved
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&kind)
        {
            return Ok(player.clone());
        }

        let player = self
            .players
            .iter()
            .find(|p| p.supports(kind))
            .cloned()
            .ok_or(PlaybackError::Configuration(kind))?;
        tracing::debug!(kind = %kind, player = player.name(), "player resolved");

        let mut cache = self.resolved.write().unwrap_or_else(|p| p.into_inner());
        Ok(cache.entry(kind).or_insert(player).clone())
    }
}
