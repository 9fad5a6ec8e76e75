//! Playback sessions: a list of sources played on a dedicated thread.
//!
//! A session replaces whatever was playing before, optionally shuffles its list and, in
//! background mode, repeats it until stopped. Errors end the session with a warning; they
//! never propagate into the host.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;

use crate::config::DEFAULT_VOLUME_DB;
use crate::registry::PlayerRegistry;
use crate::source::MusicSource;

/// How a session plays its list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionOptions {
    pub shuffle: bool,
    /// Replay the list until stopped. Ignored for foreground sessions.
    pub repeat: bool,
    /// Return immediately with a [`SessionHandle`] instead of blocking.
    pub background: bool,
    pub default_volume_db: f32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            shuffle: false,
            repeat: true,
            background: true,
            default_volume_db: DEFAULT_VOLUME_DB,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every source played to the end (or was launched).
    Finished,
    /// A stop request ended the session.
    Stopped,
    /// A playback error ended the session.
    Failed(String),
}

/// Result of [`run_session`].
#[derive(Debug)]
pub enum SessionRun {
    /// Nothing to play.
    Skipped,
    /// Foreground session that has already ended.
    Completed(SessionOutcome),
    /// Background session still running.
    Background(SessionHandle),
}

/// Handle to a background session thread.
pub struct SessionHandle {
    name: String,
    cancel: Arc<AtomicBool>,
    registry: Arc<PlayerRegistry>,
    join: JoinHandle<SessionOutcome>,
    poll: Duration,
}

impl SessionHandle {
    /// Thread name, `music-player-<n>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop playback and wait for the session thread to exit.
    pub fn stop(self) -> SessionOutcome {
        self.cancel.store(true, Ordering::SeqCst);
        // A source may start between the cancel check and the stop; keep stopping until the
        // thread is gone.
        while !self.join.is_finished() {
            self.registry.stop_active_player();
            if !self.join.is_finished() {
                thread::sleep(self.poll);
            }
        }
        self.join()
    }

    /// Wait for the session to end on its own.
    pub fn join(self) -> SessionOutcome {
        self.join
            .join()
            .unwrap_or_else(|_| SessionOutcome::Failed("session thread panicked".to_string()))
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn next_thread_name() -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(1);
    format!("music-player-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Play `sources` through `registry` on a new thread.
///
/// Foreground sessions (`background == false`) never repeat and are joined before this
/// returns.
pub fn run_session(
    registry: Arc<PlayerRegistry>,
    sources: Vec<MusicSource>,
    options: SessionOptions,
) -> Result<SessionRun> {
    if sources.is_empty() {
        tracing::info!("no music sources configured");
        return Ok(SessionRun::Skipped);
    }

    let options = SessionOptions {
        repeat: options.repeat && options.background,
        ..options
    };
    let name = next_thread_name();
    let cancel = Arc::new(AtomicBool::new(false));

    let registry_thread = registry.clone();
    let cancel_thread = cancel.clone();
    let join = thread::Builder::new()
        .name(name.clone())
        .spawn(move || run_sequence(&registry_thread, sources, options, &cancel_thread))
        .with_context(|| format!("spawn {name}"))?;
    tracing::debug!(thread = %name, ?options, "session started");

    let handle = SessionHandle {
        name,
        cancel,
        registry,
        join,
        poll: Duration::from_millis(20),
    };
    if options.background {
        Ok(SessionRun::Background(handle))
    } else {
        Ok(SessionRun::Completed(handle.join()))
    }
}

/// Session body. Runs on the session thread.
fn run_sequence(
    registry: &PlayerRegistry,
    mut sources: Vec<MusicSource>,
    options: SessionOptions,
    cancel: &AtomicBool,
) -> SessionOutcome {
    registry.stop_active_player();

    if options.shuffle {
        sources.shuffle(&mut rand::thread_rng());
    }

    loop {
        let mut completed_naturally = false;
        for source in &sources {
            if cancel.load(Ordering::SeqCst) {
                return SessionOutcome::Stopped;
            }
            match registry.play(source, options.default_volume_db) {
                Ok(true) => return SessionOutcome::Stopped,
                Ok(false) => {
                    if registry.reports_completion(source.kind()).unwrap_or(false) {
                        completed_naturally = true;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to play stream: {e}");
                    return SessionOutcome::Failed(e.to_string());
                }
            }
        }

        if cancel.load(Ordering::SeqCst) {
            return SessionOutcome::Stopped;
        }
        if !options.repeat {
            return SessionOutcome::Finished;
        }
        if !completed_naturally {
            tracing::info!("sources only launch external playback; not repeating");
            return SessionOutcome::Finished;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as PlayResult;
    use crate::events::TracingSink;
    use crate::player::Player;
    use crate::source::SourceKind;
    use std::sync::Mutex;

    /// Records played sources; returns immediately.
    struct Recorder {
        kind: SourceKind,
        completes: bool,
        played: Mutex<Vec<String>>,
        stop: AtomicBool,
        delay: Duration,
    }

    impl Recorder {
        fn new(kind: SourceKind, completes: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                kind,
                completes,
                played: Mutex::new(Vec::new()),
                stop: AtomicBool::new(false),
                delay,
            })
        }

        fn played(&self) -> Vec<String> {
            self.played.lock().unwrap().clone()
        }
    }

    impl Player for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn supports(&self, kind: SourceKind) -> bool {
            kind == self.kind
        }

        fn reports_completion(&self) -> bool {
            self.completes
        }

        fn play(&self, source: &MusicSource, _volume_db: f32) -> PlayResult<bool> {
            self.played.lock().unwrap().push(source.to_string());
            let deadline = std::time::Instant::now() + self.delay;
            while std::time::Instant::now() < deadline {
                if self.stop.swap(false, Ordering::SeqCst) {
                    return Ok(true);
                }
                thread::sleep(Duration::from_millis(2));
            }
            Ok(false)
        }

        fn stop(&self) {
            self.stop.store(true, Ordering::SeqCst);
        }
    }

    fn registry(player: Arc<Recorder>) -> Arc<PlayerRegistry> {
        Arc::new(
            PlayerRegistry::new(vec![player as Arc<dyn Player>], Arc::new(TracingSink))
                .with_stop_poll(Duration::from_millis(5)),
        )
    }

    fn files(names: &[&str]) -> Vec<MusicSource> {
        names.iter().map(|n| MusicSource::file(*n)).collect()
    }

    #[test]
    fn empty_list_is_skipped() {
        let reg = registry(Recorder::new(SourceKind::File, true, Duration::ZERO));
        let run = run_session(reg, Vec::new(), SessionOptions::default()).unwrap();
        assert!(matches!(run, SessionRun::Skipped));
    }

    #[test]
    fn foreground_plays_once_in_order_even_with_repeat() {
        let player = Recorder::new(SourceKind::File, true, Duration::ZERO);
        let reg = registry(player.clone());
        let opts = SessionOptions {
            background: false,
            repeat: true,
            ..Default::default()
        };
        let run = run_session(reg, files(&["a.ogg", "b.ogg"]), opts).unwrap();
        assert!(matches!(run, SessionRun::Completed(SessionOutcome::Finished)));
        assert_eq!(player.played(), vec!["[file]:a.ogg", "[file]:b.ogg"]);
    }

    #[test]
    fn shuffle_keeps_every_source() {
        let player = Recorder::new(SourceKind::File, true, Duration::ZERO);
        let reg = registry(player.clone());
        let opts = SessionOptions {
            background: false,
            shuffle: true,
            ..Default::default()
        };
        let names = ["a.ogg", "b.ogg", "c.ogg", "d.ogg", "e.ogg"];
        run_session(reg, files(&names), opts).unwrap();
        let mut played = player.played();
        played.sort();
        let expected: Vec<String> = names.iter().map(|n| format!("[file]:{n}")).collect();
        assert_eq!(played, expected);
    }

    #[test]
    fn background_repeat_runs_until_stopped() {
        let player = Recorder::new(SourceKind::File, true, Duration::from_millis(5));
        let reg = registry(player.clone());
        let run = run_session(reg, files(&["a.ogg"]), SessionOptions::default()).unwrap();
        let SessionRun::Background(handle) = run else {
            panic!("expected background session");
        };
        assert!(handle.name().starts_with("music-player-"));

        while player.played().len() < 3 {
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(handle.stop(), SessionOutcome::Stopped);
    }

    #[test]
    fn launch_only_lists_do_not_repeat() {
        let player = Recorder::new(SourceKind::Service, false, Duration::ZERO);
        let reg = registry(player.clone());
        let sources = vec![MusicSource::service("spotify:track:abc").unwrap()];
        let run = run_session(reg, sources, SessionOptions::default()).unwrap();
        let SessionRun::Background(handle) = run else {
            panic!("expected background session");
        };
        assert_eq!(handle.join(), SessionOutcome::Finished);
        assert_eq!(player.played().len(), 1);
    }

    #[test]
    fn unsupported_source_fails_the_session() {
        let player = Recorder::new(SourceKind::File, true, Duration::ZERO);
        let reg = registry(player.clone());
        let sources = vec![
            MusicSource::network("http://h/a.mp3").unwrap(),
            MusicSource::file("b.ogg"),
        ];
        let opts = SessionOptions {
            background: false,
            ..Default::default()
        };
        match run_session(reg, sources, opts).unwrap() {
            SessionRun::Completed(SessionOutcome::Failed(msg)) => {
                assert!(msg.contains("network"), "{msg}")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(player.played().is_empty());
    }

    #[test]
    fn new_session_replaces_the_previous_one() {
        let player = Recorder::new(SourceKind::File, true, Duration::from_secs(10));
        let reg = registry(player.clone());
        let first = run_session(reg.clone(), files(&["a.ogg"]), SessionOptions::default()).unwrap();
        while !reg.is_playing() {
            thread::sleep(Duration::from_millis(1));
        }

        let opts = SessionOptions {
            background: true,
            repeat: false,
            ..Default::default()
        };
        let second = run_session(reg, files(&["b.ogg"]), opts).unwrap();

        let SessionRun::Background(first) = first else {
            panic!("expected background session");
        };
        assert_eq!(first.join(), SessionOutcome::Stopped);
        let SessionRun::Background(second) = second else {
            panic!("expected background session");
        };
        assert_eq!(second.stop(), SessionOutcome::Stopped);
    }
}
