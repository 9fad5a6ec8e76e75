//! Configuration loading and parsing.
//!
//! Defines the TOML schema for a music session and converts it into validated sources and
//! session options.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::SourceError;
use crate::http_stream::HttpStreamConfig;
use crate::session::SessionOptions;
use crate::source::{MusicSource, ResourceBundle, SourceOrigin};

/// Default gain applied to sources without their own `volume_db`.
pub const DEFAULT_VOLUME_DB: f32 = -20.0;

/// Playback tuning shared by the stream player and the output line.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Bytes read from the decoder and written to the line per loop iteration.
    pub block_bytes: usize,
    /// Target buffering of the output queue in seconds.
    pub buffer_seconds: f32,
    /// Resampler chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Poll interval for external processes and stop waits, in milliseconds.
    pub process_poll_ms: u64,
    /// Connect timeout for network sources, in milliseconds.
    pub http_connect_timeout_ms: u64,
    /// Time allowed for a network source's response head, in milliseconds.
    pub http_response_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            block_bytes: 4096,
            buffer_seconds: 0.5,
            chunk_frames: 1024,
            refill_max_frames: 4096,
            process_poll_ms: 50,
            http_connect_timeout_ms: 10_000,
            http_response_timeout_ms: 10_000,
        }
    }
}

impl PlaybackConfig {
    pub fn process_poll(&self) -> Duration {
        Duration::from_millis(self.process_poll_ms.max(1))
    }

    pub fn http_stream(&self) -> HttpStreamConfig {
        HttpStreamConfig {
            connect_timeout: Duration::from_millis(self.http_connect_timeout_ms.max(1)),
            response_timeout: Duration::from_millis(self.http_response_timeout_ms.max(1)),
        }
    }
}

/// One `[[sources]]` entry. Exactly one of the location fields must be set.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Name of an embedded resource.
    pub resource: Option<String>,
    /// Local file path.
    pub file: Option<PathBuf>,
    /// `http`, `https` or `file` URL.
    pub uri: Option<String>,
    /// Spotify URI or open.spotify.com URL.
    pub service: Option<String>,
    /// Per-source gain override in dB.
    pub volume_db: Option<f32>,
}

impl SourceConfig {
    /// Validate the entry and build its source.
    pub fn to_source(&self) -> Result<MusicSource, SourceError> {
        let mut set = Vec::new();
        if self.resource.is_some() {
            set.push("resource");
        }
        if self.file.is_some() {
            set.push("file");
        }
        if self.uri.is_some() {
            set.push("uri");
        }
        if self.service.is_some() {
            set.push("service");
        }
        if set.len() > 1 {
            return Err(SourceError::Ambiguous(set.join(", ")));
        }

        let source = if let Some(name) = &self.resource {
            MusicSource::from_origin(SourceOrigin::Resource(name.clone()))
        } else if let Some(path) = &self.file {
            MusicSource::file(path.clone())
        } else if let Some(uri) = &self.uri {
            MusicSource::network(uri)?
        } else if let Some(service) = &self.service {
            MusicSource::service(service)?
        } else {
            return Err(SourceError::Unconfigured);
        };
        Ok(source.with_volume_db(self.volume_db))
    }
}

/// Top-level music configuration loaded from TOML.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct MusicConfig {
    /// Disable music entirely.
    pub skip: bool,
    /// Sources in play order.
    pub sources: Vec<SourceConfig>,
    /// Shuffle the list before each session.
    pub shuffle: bool,
    /// Replay the list until stopped (background sessions only).
    pub repeat: bool,
    /// Play on a background thread while the host keeps working. Hosts with their own mode
    /// switch (the runner's `play`/`run`) override it.
    pub background: bool,
    /// Gain for sources without their own `volume_db`.
    pub default_volume_db: f32,
    /// Output device name substring.
    pub device: Option<String>,
    /// Audio files loaded into the resource bundle, keyed by resource name. Relative paths
    /// are resolved against the config file's directory.
    pub resources: BTreeMap<String, PathBuf>,
    pub playback: PlaybackConfig,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            skip: false,
            sources: Vec::new(),
            shuffle: false,
            repeat: true,
            background: true,
            default_volume_db: DEFAULT_VOLUME_DB,
            device: None,
            resources: BTreeMap::new(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl MusicConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let mut cfg = Self::parse(&raw).with_context(|| format!("parse config {:?}", path))?;
        if let Some(dir) = path.parent() {
            for file in cfg.resources.values_mut() {
                if file.is_relative() {
                    *file = dir.join(&*file);
                }
            }
        }
        Ok(cfg)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<MusicConfig>(raw)?)
    }

    /// Build every configured source, failing on the first invalid entry.
    pub fn sources(&self) -> Result<Vec<MusicSource>> {
        self.sources
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                entry
                    .to_source()
                    .with_context(|| format!("invalid source #{}", i + 1))
            })
            .collect()
    }

    /// Read every `[resources]` file into a bundle.
    pub fn resource_bundle(&self) -> Result<ResourceBundle> {
        let mut bundle = ResourceBundle::new();
        for (name, path) in &self.resources {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read resource {name:?} from {:?}", path))?;
            bundle.insert(name, bytes);
        }
        Ok(bundle)
    }

    /// Build the sources and check that every resource source names a loaded resource.
    pub fn sources_with_bundle(&self, bundle: &ResourceBundle) -> Result<Vec<MusicSource>> {
        let sources = self.sources()?;
        check_resources(&sources, bundle)?;
        Ok(sources)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            shuffle: self.shuffle,
            repeat: self.repeat,
            background: self.background,
            default_volume_db: self.default_volume_db,
        }
    }
}

/// Fail with `NotFound` for the first resource source missing from `bundle`.
pub fn check_resources(sources: &[MusicSource], bundle: &ResourceBundle) -> Result<()> {
    for source in sources {
        if let SourceOrigin::Resource(name) = source.origin() {
            if bundle.get(name).is_none() {
                return Err(SourceError::NotFound(name.clone()))
                    .context("resource sources must be listed under [resources]");
            }
        }
    }
    Ok(())
}
