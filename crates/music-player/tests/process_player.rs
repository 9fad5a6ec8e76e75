#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use music_player::player::{CommandBuilder, LaunchCommand, ProcessPlayer, StreamPlayer};
use music_player::{
    ChannelSink, MusicSource, PlaybackError, PlaybackEvent, Player, PlayerRegistry, ResourceBundle,
    SessionOptions, SessionOutcome, SessionRun, run_session,
};

use common::{MockLines, write_wav};

const URI: &str = "spotify:track:4cOdK2wGLETKBW3PvgPWqT";

fn shell(script: &'static str) -> CommandBuilder {
    Arc::new(move |_uri: &str| Some(LaunchCommand::new("sh", ["-c", script])))
}

fn service() -> MusicSource {
    MusicSource::service(URI).unwrap()
}

#[test]
fn successful_command_returns_false_quietly() {
    let (sink, rx) = ChannelSink::new();
    let player = ProcessPlayer::with_command_builder(shell("echo launched"), Arc::new(sink));

    assert!(!player.play(&service(), -20.0).unwrap());
    assert!(rx.try_recv().is_err());
    assert!(!player.reports_completion());
}

#[test]
fn launch_target_is_the_normalized_uri() {
    let (sink, _rx) = ChannelSink::new();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_builder = seen.clone();
    let builder: CommandBuilder = Arc::new(move |uri: &str| {
        seen_builder.lock().unwrap().push(uri.to_string());
        Some(LaunchCommand::new("true", Vec::<String>::new()))
    });
    let player = ProcessPlayer::with_command_builder(builder, Arc::new(sink));

    let source =
        MusicSource::service("https://open.spotify.com/track/4cOdK2wGLETKBW3PvgPWqT?si=abc")
            .unwrap();
    player.play(&source, 0.0).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![URI.to_string()]);
}

#[test]
fn non_zero_exit_is_reported_not_raised() {
    let (sink, rx) = ChannelSink::new();
    let player = ProcessPlayer::with_command_builder(
        shell("echo partial; echo 'no bus' >&2; exit 3"),
        Arc::new(sink),
    );

    assert!(!player.play(&service(), -20.0).unwrap());

    assert_eq!(
        rx.try_recv().unwrap(),
        PlaybackEvent::CommandFailed {
            message: format!(
                "Failed to play Spotify URI '{URI}'. Exit code: 3. Error: no bus Output: partial"
            )
        }
    );
}

#[test]
fn stop_kills_the_running_process() {
    let (sink, rx) = ChannelSink::new();
    let player = Arc::new(
        ProcessPlayer::with_command_builder(shell("sleep 5"), Arc::new(sink))
            .with_poll_interval(Duration::from_millis(5)),
    );

    let started = Instant::now();
    let play = {
        let player = player.clone();
        thread::spawn(move || player.play(&service(), 0.0))
    };
    thread::sleep(Duration::from_millis(100));
    player.stop();

    assert!(play.join().unwrap().unwrap());
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(rx.try_recv().is_err(), "a killed command is not a failure");
}

#[test]
fn registry_stop_waits_for_the_killed_process() {
    let (sink, _rx) = ChannelSink::new();
    let sink = Arc::new(sink);
    let process = ProcessPlayer::with_command_builder(shell("sleep 5"), sink.clone())
        .with_poll_interval(Duration::from_millis(5));
    let players: Vec<Arc<dyn Player>> = vec![Arc::new(process)];
    let registry =
        Arc::new(PlayerRegistry::new(players, sink).with_stop_poll(Duration::from_millis(5)));

    let play = {
        let registry = registry.clone();
        thread::spawn(move || registry.play(&service(), 0.0))
    };
    while !registry.is_playing() {
        thread::sleep(Duration::from_millis(1));
    }
    registry.stop_active_player();

    assert!(!registry.is_playing());
    assert!(play.join().unwrap().unwrap());
}

#[test]
fn missing_program_is_a_process_error() {
    let (sink, _rx) = ChannelSink::new();
    let builder: CommandBuilder = Arc::new(|_uri: &str| {
        Some(LaunchCommand::new(
            "definitely-not-a-real-binary-xyz",
            Vec::<String>::new(),
        ))
    });
    let player = ProcessPlayer::with_command_builder(builder, Arc::new(sink));

    let err = player.play(&service(), 0.0).unwrap_err();
    assert!(matches!(err, PlaybackError::Process { .. }));
}

#[test]
fn session_continues_after_a_failed_launch() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "after.wav", 8_000, 1, 800);
    let lines = Arc::new(MockLines::new());

    let (sink, rx) = ChannelSink::new();
    let sink = Arc::new(sink);
    let stream = StreamPlayer::new(lines.clone(), Arc::new(ResourceBundle::new()));
    let process = ProcessPlayer::with_command_builder(shell("exit 1"), sink.clone());
    let players: Vec<Arc<dyn Player>> = vec![Arc::new(stream), Arc::new(process)];
    let registry = Arc::new(PlayerRegistry::new(players, sink));

    let sources = vec![service(), MusicSource::file(&path)];
    let options = SessionOptions {
        background: false,
        ..Default::default()
    };
    let run = run_session(registry, sources, options).unwrap();
    assert!(matches!(run, SessionRun::Completed(SessionOutcome::Finished)));

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(events.len(), 3, "{events:?}");
    assert!(matches!(events[0], PlaybackEvent::NowPlaying { .. }));
    assert!(matches!(events[1], PlaybackEvent::CommandFailed { .. }));
    assert_eq!(
        events[2],
        PlaybackEvent::NowPlaying {
            source: format!("[file]:{}", path.display())
        }
    );
    lines.snapshot(|log| assert_eq!(log.bytes_written, 1_600));
}
