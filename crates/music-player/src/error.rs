//! Error types for source resolution and playback.
//!
//! A non-zero exit of an external launch command is not an error: it is reported through
//! [`PlaybackEvent::CommandFailed`](crate::events::PlaybackEvent::CommandFailed) and the call
//! returns normally.

use std::io;

use thiserror::Error;

use crate::source::SourceKind;

/// Errors raised while constructing or opening a music source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A resource name or file path does not exist.
    #[error("failed to find {0}")]
    NotFound(String),

    /// A network URI failed the format check.
    #[error("malformed reference {reference:?}: {reason}")]
    MalformedReference { reference: String, reason: String },

    /// A service identifier is neither a native URI nor an equivalent web URL.
    #[error(
        "invalid Spotify URI or URL format: {0}; use a 'spotify:<type>:<id>' URI \
         (e.g., spotify:track:xxxx) or a 'https://open.spotify.com/<type>/<id>' URL \
         (e.g., https://open.spotify.com/track/xxxx)"
    )]
    MalformedIdentifier(String),

    /// No variant field was populated.
    #[error("no source configured; set one of resource, file, uri or service")]
    Unconfigured,

    /// More than one variant field was populated.
    #[error("ambiguous source; only one of {0} may be set")]
    Ambiguous(String),

    /// The source exists but could not be opened.
    #[error("failed to open {what}")]
    Io {
        what: String,
        #[source]
        source: io::Error,
    },
}

/// Fatal errors for a single playback call.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// No registered player handles this kind of source.
    #[error("no registered player supports {0} sources")]
    Configuration(SourceKind),

    /// The source could not be resolved or opened.
    #[error(transparent)]
    SourceUnavailable(#[from] SourceError),

    /// Decoding failed or the output line could not be acquired or written.
    #[error("audio device error: {0:#}")]
    Device(anyhow::Error),

    /// The launch command could not be spawned or waited on.
    #[error("failed to run `{command}`")]
    Process {
        command: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T, E = PlaybackError> = std::result::Result<T, E>;
