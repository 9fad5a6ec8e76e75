//! Notifications emitted by the registry and players.
//!
//! The engine never decides where these go; callers plug in an [`EventSink`].

use crossbeam_channel::{Receiver, Sender, unbounded};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A source is about to be handed to its player.
    NowPlaying { source: String },
    /// An external launch command exited non-zero without being stopped.
    CommandFailed { message: String },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: PlaybackEvent);
}

/// Forwards events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::NowPlaying { source } => tracing::info!("Now playing: {source}"),
            PlaybackEvent::CommandFailed { message } => tracing::warn!("{message}"),
        }
    }
}

/// Sends events over a channel.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: Sender<PlaybackEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<PlaybackEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: PlaybackEvent) {
        // Receiver gone: nobody is listening.
        let _ = self.tx.send(event);
    }
}
