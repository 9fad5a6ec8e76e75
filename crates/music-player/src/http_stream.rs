//! HTTP reader used for network sources.
//!
//! Streams the response body straight into the decoder. Only the connect and response-head
//! phases are time limited, so long-running radio streams are never cut off.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use symphonia::core::io::MediaSource;

/// Timeouts for opening an HTTP stream.
#[derive(Clone, Debug)]
pub struct HttpStreamConfig {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Time allowed until the response head arrives.
    pub response_timeout: Duration,
}

impl Default for HttpStreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(10),
        }
    }
}

/// A forward-only media source over an HTTP response body.
pub struct HttpStreamSource {
    // Mutex only to make the body reader `Sync` for `MediaSource`.
    body: Mutex<Box<dyn Read + Send>>,
    len: Option<u64>,
    pos: u64,
    content_type: Option<String>,
}

impl HttpStreamSource {
    /// Issue a GET for `url` and keep the body open for reading.
    pub fn open(url: &str, config: &HttpStreamConfig) -> io::Result<Self> {
        let started = Instant::now();
        let resp = ureq::get(url)
            .config()
            .timeout_connect(Some(config.connect_timeout))
            .timeout_recv_response(Some(config.response_timeout))
            .build()
            .call()
            .map_err(|e| io::Error::other(format!("http request failed: {e}")))?;

        let len = resp
            .headers()
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        let content_type = resp
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .and_then(normalize_content_type);

        tracing::debug!(
            url,
            took_ms = started.elapsed().as_millis() as u64,
            len = ?len,
            content_type = content_type.as_deref().unwrap_or(""),
            "http stream opened"
        );

        let (_, body) = resp.into_parts();
        Ok(Self {
            body: Mutex::new(Box::new(body.into_reader())),
            len,
            pos: 0,
            content_type,
        })
    }

    /// Media type reported by the server, without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

impl Read for HttpStreamSource {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let body = self
            .body
            .get_mut()
            .map_err(|_| io::Error::other("http body reader poisoned"))?;
        let n = body.read(out)?;
        self.pos = self.pos.saturating_add(n as u64);
        Ok(n)
    }
}

impl Seek for HttpStreamSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.pos),
            SeekFrom::Start(target) if target == self.pos => Ok(self.pos),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "http stream is not seekable",
            )),
        }
    }
}

impl MediaSource for HttpStreamSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}

/// Strip parameters (`; charset=...`) and lowercase a Content-Type value.
fn normalize_content_type(raw: &str) -> Option<String> {
    let media = raw.split(';').next()?.trim();
    if media.is_empty() {
        None
    } else {
        Some(media.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = HttpStreamConfig::default();
        assert_eq!(cfg.connect_timeout, Duration::from_secs(10));
        assert_eq!(cfg.response_timeout, Duration::from_secs(10));
    }

    #[test]
    fn normalize_content_type_drops_parameters() {
        assert_eq!(
            normalize_content_type("Audio/MPEG; charset=binary"),
            Some("audio/mpeg".to_string())
        );
        assert_eq!(normalize_content_type("audio/ogg"), Some("audio/ogg".to_string()));
    }

    #[test]
    fn normalize_content_type_rejects_empty() {
        assert_eq!(normalize_content_type(""), None);
        assert_eq!(normalize_content_type(" ; x=y"), None);
    }

    #[test]
    fn open_fails_for_unreachable_host() {
        let cfg = HttpStreamConfig {
            connect_timeout: Duration::from_millis(200),
            response_timeout: Duration::from_millis(200),
        };
        assert!(HttpStreamSource::open("http://127.0.0.1:9/stream.mp3", &cfg).is_err());
    }
}
