//! Background music playback engine.
//!
//! Sources are decoded and streamed to an output device, or handed to the Spotify desktop
//! app. A [`PlayerRegistry`] keeps at most one player active; sessions run a source list on
//! a dedicated thread.

pub mod companion;
pub mod config;
pub mod decode;
pub mod device;
pub mod error;
pub mod events;
pub mod http_stream;
pub mod line;
mod playback;
pub mod player;
pub mod queue;
pub mod registry;
pub mod resample;
pub mod session;
pub mod source;

pub use config::{MusicConfig, PlaybackConfig};
pub use error::{PlaybackError, SourceError};
pub use events::{ChannelSink, EventSink, PlaybackEvent, TracingSink};
pub use line::{AudioLine, CpalLineProvider, GainRange, LineProvider};
pub use player::Player;
pub use registry::PlayerRegistry;
pub use session::{SessionHandle, SessionOptions, SessionOutcome, SessionRun, run_session};
pub use source::{MusicSource, ResourceBundle, SourceKind};
