//! Music sources.
//!
//! A [`MusicSource`] says *where* audio comes from:
//! - an embedded resource registered in a [`ResourceBundle`]
//! - a local file
//! - a network URI (`http`, `https` or `file`)
//! - a Spotify URI, handed to the desktop application instead of being decoded
//!
//! Identifiers are validated when the source is built, so configuration mistakes surface
//! before any playback starts.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;
use url::Url;

use crate::error::SourceError;
use crate::http_stream::{HttpStreamConfig, HttpStreamSource};

/// Closed set of source variants, used to pick a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Resource,
    File,
    Network,
    Service,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Resource => "resource",
            SourceKind::File => "file",
            SourceKind::Network => "network",
            SourceKind::Service => "service",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the audio of a [`MusicSource`] comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceOrigin {
    Resource(String),
    File(PathBuf),
    Network(NetworkUri),
    Service(ServiceUri),
}

/// A playable source plus its optional volume override in dB.
#[derive(Clone, Debug, PartialEq)]
pub struct MusicSource {
    origin: SourceOrigin,
    volume_db: Option<f32>,
}

/// Result of resolving a source: bytes to decode, or a target for an external launcher.
pub enum Resolved {
    Stream(OpenedStream),
    Launch(String),
}

/// An opened byte stream with a container hint for the prober.
pub struct OpenedStream {
    pub media: Box<dyn MediaSource>,
    pub hint: Hint,
}

impl MusicSource {
    pub fn resource(name: impl Into<String>) -> Self {
        Self::from_origin(SourceOrigin::Resource(name.into()))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::from_origin(SourceOrigin::File(path.into()))
    }

    /// Build a network source; fails with `MalformedReference` on a bad URI.
    pub fn network(uri: &str) -> Result<Self, SourceError> {
        Ok(Self::from_origin(SourceOrigin::Network(NetworkUri::parse(uri)?)))
    }

    /// Build a Spotify source; fails with `MalformedIdentifier` on a bad URI or URL.
    pub fn service(uri: &str) -> Result<Self, SourceError> {
        Ok(Self::from_origin(SourceOrigin::Service(ServiceUri::parse(uri)?)))
    }

    pub fn from_origin(origin: SourceOrigin) -> Self {
        Self {
            origin,
            volume_db: None,
        }
    }

    pub fn with_volume_db(mut self, volume_db: Option<f32>) -> Self {
        self.volume_db = volume_db;
        self
    }

    pub fn origin(&self) -> &SourceOrigin {
        &self.origin
    }

    pub fn kind(&self) -> SourceKind {
        match self.origin {
            SourceOrigin::Resource(_) => SourceKind::Resource,
            SourceOrigin::File(_) => SourceKind::File,
            SourceOrigin::Network(_) => SourceKind::Network,
            SourceOrigin::Service(_) => SourceKind::Service,
        }
    }

    pub fn volume_db(&self) -> Option<f32> {
        self.volume_db
    }

    /// Per-source override, or `default_db` when none is set.
    pub fn effective_volume_db(&self, default_db: f32) -> f32 {
        self.volume_db.unwrap_or(default_db)
    }

    /// Launch target for service sources.
    pub fn launch_target(&self) -> Option<&str> {
        match &self.origin {
            SourceOrigin::Service(uri) => Some(uri.resolved()),
            _ => None,
        }
    }

    /// Open the byte stream, or return the launch target for service sources.
    pub fn resolve(
        &self,
        resources: &ResourceBundle,
        http: &HttpStreamConfig,
    ) -> Result<Resolved, SourceError> {
        match &self.origin {
            SourceOrigin::Resource(name) => {
                let bytes = resources
                    .get(name)
                    .ok_or_else(|| SourceError::NotFound(format!("resource {name}")))?;
                Ok(Resolved::Stream(OpenedStream {
                    media: Box::new(Cursor::new(bytes)),
                    hint: hint_for(infer_ext(name)),
                }))
            }
            SourceOrigin::File(path) => open_file(path).map(Resolved::Stream),
            SourceOrigin::Network(uri) => uri.open(http).map(Resolved::Stream),
            SourceOrigin::Service(uri) => Ok(Resolved::Launch(uri.resolved().to_string())),
        }
    }
}

impl fmt::Display for MusicSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            SourceOrigin::Resource(name) => write!(f, "[resource]:{name}"),
            SourceOrigin::File(path) => write!(f, "[file]:{}", path.display()),
            SourceOrigin::Network(uri) => write!(f, "[uri]: {}", uri.as_str()),
            SourceOrigin::Service(uri) => write!(
                f,
                "[spotify]: uri={}, resolvedUri={}",
                uri.input(),
                uri.resolved()
            ),
        }
    }
}

fn open_file(path: &Path) -> Result<OpenedStream, SourceError> {
    let file = File::open(path).map_err(|e| {
        let shown = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        if e.kind() == io::ErrorKind::NotFound {
            SourceError::NotFound(shown.display().to_string())
        } else {
            SourceError::Io {
                what: shown.display().to_string(),
                source: e,
            }
        }
    })?;
    Ok(OpenedStream {
        media: Box::new(file),
        hint: hint_for(path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase)),
    })
}

fn hint_for(ext: Option<String>) -> Hint {
    let mut hint = Hint::new();
    if let Some(ext) = ext {
        hint.with_extension(&ext);
    }
    hint
}

/// Infer a file extension from the last path segment, ignoring any query string.
pub(crate) fn infer_ext(reference: &str) -> Option<String> {
    let tail = reference.split(['?', '#']).next().unwrap_or(reference);
    let file = tail.rsplit('/').next().unwrap_or(tail);
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// A validated `http`, `https` or `file` URL.
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkUri {
    url: Url,
}

impl NetworkUri {
    pub fn parse(input: &str) -> Result<Self, SourceError> {
        let trimmed = input.trim();
        let url = Url::parse(trimmed).map_err(|e| SourceError::MalformedReference {
            reference: input.to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(Self { url }),
            "file" => Ok(Self { url }),
            "http" | "https" => Err(SourceError::MalformedReference {
                reference: input.to_string(),
                reason: "missing host".to_string(),
            }),
            other => Err(SourceError::MalformedReference {
                reference: input.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    fn open(&self, http: &HttpStreamConfig) -> Result<OpenedStream, SourceError> {
        if self.url.scheme() == "file" {
            let path = self
                .url
                .to_file_path()
                .map_err(|()| SourceError::MalformedReference {
                    reference: self.as_str().to_string(),
                    reason: "not a local path".to_string(),
                })?;
            return open_file(&path);
        }

        let source = HttpStreamSource::open(self.as_str(), http).map_err(|e| SourceError::Io {
            what: self.as_str().to_string(),
            source: e,
        })?;
        let mut hint = hint_for(infer_ext(self.url.path()));
        if let Some(mime) = source.content_type() {
            hint.mime_type(mime);
        }
        Ok(OpenedStream {
            media: Box::new(source),
            hint,
        })
    }
}

/// Item types a Spotify URI may address.
pub const SERVICE_ITEM_TYPES: [&str; 6] = ["track", "playlist", "album", "artist", "episode", "show"];

/// A Spotify identifier, normalized to `spotify:<type>:<id>` at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceUri {
    input: String,
    resolved: String,
}

fn native_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^spotify:(track|playlist|album|artist|episode|show):([a-zA-Z0-9]+)$")
            .expect("static pattern")
    })
}

fn web_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^https://open\.spotify\.com/(track|playlist|album|artist|episode|show)/([a-zA-Z0-9]+)(?:\?.*)?$",
        )
        .expect("static pattern")
    })
}

impl ServiceUri {
    /// Accepts `spotify:<type>:<id>` or `https://open.spotify.com/<type>/<id>[?...]`.
    pub fn parse(input: &str) -> Result<Self, SourceError> {
        let trimmed = input.trim();
        let resolved = if native_pattern().is_match(trimmed) {
            trimmed.to_string()
        } else if let Some(caps) = web_pattern().captures(trimmed) {
            format!("spotify:{}:{}", &caps[1], &caps[2])
        } else {
            return Err(SourceError::MalformedIdentifier(input.to_string()));
        };
        Ok(Self {
            input: input.to_string(),
            resolved,
        })
    }

    /// The identifier as configured.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// The normalized `spotify:<type>:<id>` form.
    pub fn resolved(&self) -> &str {
        &self.resolved
    }
}

/// Named in-memory audio blobs addressable by resource sources.
#[derive(Clone, Debug, Default)]
pub struct ResourceBundle {
    entries: HashMap<String, Arc<[u8]>>,
}

impl ResourceBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under `name`; a leading `/` is ignored.
    pub fn with(mut self, name: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn insert(&mut self, name: &str, bytes: impl Into<Arc<[u8]>>) {
        self.entries.insert(resource_key(name).to_string(), bytes.into());
    }

    pub fn get(&self, name: &str) -> Option<Arc<[u8]>> {
        self.entries.get(resource_key(name)).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn resource_key(name: &str) -> &str {
    name.trim().trim_start_matches('/')
}
