mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use music_player::player::{ProcessPlayer, StreamPlayer};
use music_player::{
    ChannelSink, MusicSource, PlaybackError, PlaybackEvent, Player, PlayerRegistry, ResourceBundle,
    SourceKind,
};

use common::{MockLines, write_wav};

type Events = crossbeam_channel::Receiver<PlaybackEvent>;

fn stream_registry(lines: &Arc<MockLines>) -> (Arc<PlayerRegistry>, Events) {
    let (sink, rx) = ChannelSink::new();
    let stream = StreamPlayer::new(lines.clone(), Arc::new(ResourceBundle::new()));
    let players: Vec<Arc<dyn Player>> = vec![Arc::new(stream)];
    let registry =
        PlayerRegistry::new(players, Arc::new(sink)).with_stop_poll(Duration::from_millis(5));
    (Arc::new(registry), rx)
}

#[test]
fn concurrent_plays_never_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let lines = Arc::new(MockLines::new().with_write_delay(Duration::from_millis(2)));
    let (registry, _rx) = stream_registry(&lines);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let path = write_wav(dir.path(), &format!("t{i}.wav"), 8_000, 1, 8_000);
            let registry = registry.clone();
            thread::spawn(move || registry.play(&MusicSource::file(path), -20.0))
        })
        .collect();

    for handle in handles {
        assert!(!handle.join().unwrap().unwrap());
    }
    assert_eq!(lines.max_active(), 1);
    lines.snapshot(|log| {
        assert_eq!(log.formats.len(), 4);
        assert_eq!(log.released, 4);
    });
}

#[test]
fn stop_active_player_returns_after_play_has_returned() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "long.wav", 8_000, 1, 8_000 * 60);
    let lines = Arc::new(MockLines::new().with_write_delay(Duration::from_millis(10)));
    let (registry, _rx) = stream_registry(&lines);

    let play = {
        let registry = registry.clone();
        thread::spawn(move || registry.play(&MusicSource::file(path), 0.0))
    };
    while lines.snapshot(|log| log.writes) == 0 {
        thread::sleep(Duration::from_millis(2));
    }

    registry.stop_active_player();

    // The line is released inside `play`, before the gate opens.
    assert_eq!(lines.active(), 0);
    lines.snapshot(|log| {
        assert_eq!(log.drained, 1);
        assert_eq!(log.released, 1);
    });
    assert!(!registry.is_playing());
    assert!(play.join().unwrap().unwrap());
}

#[test]
fn stop_right_after_dispatch_is_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "long.wav", 8_000, 1, 8_000 * 60);
    let lines = Arc::new(MockLines::new().with_write_delay(Duration::from_millis(10)));
    let (registry, _rx) = stream_registry(&lines);

    let play = {
        let registry = registry.clone();
        thread::spawn(move || registry.play(&MusicSource::file(path), 0.0))
    };
    while !registry.is_playing() {
        thread::yield_now();
    }

    let started = Instant::now();
    registry.stop_active_player();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(play.join().unwrap().unwrap());
}

#[test]
fn volume_override_beats_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "a.wav", 8_000, 1, 100);
    let lines = Arc::new(MockLines::new());
    let (registry, _rx) = stream_registry(&lines);

    registry.play(&MusicSource::file(&path), -20.0).unwrap();
    registry
        .play(&MusicSource::file(&path).with_volume_db(Some(-3.0)), -20.0)
        .unwrap();

    lines.snapshot(|log| assert_eq!(log.gains, vec![-20.0, -3.0]));
}

#[test]
fn unregistered_kind_raises_configuration_error() {
    let lines = Arc::new(MockLines::new());
    let (registry, rx) = stream_registry(&lines);

    let source = MusicSource::service("spotify:track:4cOdK2wGLETKBW3PvgPWqT").unwrap();
    let err = registry.play(&source, -20.0).unwrap_err();

    assert!(matches!(err, PlaybackError::Configuration(SourceKind::Service)));
    assert!(rx.try_recv().is_err());
}

#[test]
fn failed_play_releases_the_gate() {
    let lines = Arc::new(MockLines::new());
    let (registry, _rx) = stream_registry(&lines);

    assert!(registry.play(&MusicSource::file("/missing.ogg"), 0.0).is_err());
    assert!(!registry.is_playing());
    registry.stop_active_player();
}

#[test]
fn unsupported_os_process_player_is_a_soft_no_op() {
    let (sink, rx) = ChannelSink::new();
    let sink = Arc::new(sink);
    let process = ProcessPlayer::for_family(None, sink.clone());
    let players: Vec<Arc<dyn Player>> = vec![Arc::new(process)];
    let registry = PlayerRegistry::new(players, sink);

    let source = MusicSource::service("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M").unwrap();
    assert!(!registry.play(&source, -20.0).unwrap());

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![PlaybackEvent::NowPlaying {
            source: "[spotify]: uri=spotify:playlist:37i9dQZF1DXcBWIGoYBM5M, \
                     resolvedUri=spotify:playlist:37i9dQZF1DXcBWIGoYBM5M"
                .to_string()
        }]
    );
}
