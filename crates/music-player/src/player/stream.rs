//! Decode-and-stream player for resource, file and network sources.

use std::sync::Arc;

use anyhow::anyhow;

use crate::decode::{self, PcmStream};
use crate::error::{PlaybackError, Result};
use crate::http_stream::HttpStreamConfig;
use crate::line::{AudioLine, LineProvider};
use crate::player::{Player, StopFlag};
use crate::source::{MusicSource, Resolved, ResourceBundle, SourceKind};

/// Decodes a byte-stream source and pumps fixed-size PCM blocks into an output line.
///
/// The stop flag is checked once per block; the line is always drained and released before
/// `play` returns.
pub struct StreamPlayer {
    lines: Arc<dyn LineProvider>,
    resources: Arc<ResourceBundle>,
    http: HttpStreamConfig,
    block_bytes: usize,
    stop: StopFlag,
}

impl StreamPlayer {
    pub fn new(lines: Arc<dyn LineProvider>, resources: Arc<ResourceBundle>) -> Self {
        Self {
            lines,
            resources,
            http: HttpStreamConfig::default(),
            block_bytes: 4096,
            stop: StopFlag::new(),
        }
    }

    pub fn with_block_bytes(mut self, block_bytes: usize) -> Self {
        self.block_bytes = block_bytes.max(1);
        self
    }

    pub fn with_http_config(mut self, http: HttpStreamConfig) -> Self {
        self.http = http;
        self
    }

    fn open_stream(&self, source: &MusicSource) -> Result<PcmStream> {
        match source.resolve(&self.resources, &self.http)? {
            Resolved::Stream(opened) => {
                decode::open_pcm_stream(opened.media, opened.hint).map_err(PlaybackError::Device)
            }
            Resolved::Launch(_) => Err(PlaybackError::Configuration(source.kind())),
        }
    }

    /// Block loop. Returns when the stream ends or a stop was observed.
    fn pump(&self, pcm: &mut PcmStream, line: &mut dyn AudioLine) -> Result<()> {
        let frame_bytes = pcm.format().frame_bytes().max(1);
        let block_len = (self.block_bytes / frame_bytes).max(1) * frame_bytes;
        let mut block = vec![0u8; block_len];

        loop {
            if self.stop.is_requested() {
                return Ok(());
            }
            let n = decode::read_block(pcm, &mut block).map_err(|e| {
                PlaybackError::Device(anyhow::Error::new(e).context("decode failed"))
            })?;
            if n == 0 {
                return Ok(());
            }
            if self.stop.is_requested() {
                return Ok(());
            }
            let mut written = 0;
            while written < n {
                let accepted = line
                    .write(&block[written..n])
                    .map_err(PlaybackError::Device)?;
                if accepted == 0 {
                    return Err(PlaybackError::Device(anyhow!("output line accepted no data")));
                }
                written += accepted;
            }
        }
    }
}

impl Player for StreamPlayer {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn supports(&self, kind: SourceKind) -> bool {
        matches!(
            kind,
            SourceKind::Resource | SourceKind::File | SourceKind::Network
        )
    }

    fn play(&self, source: &MusicSource, volume_db: f32) -> Result<bool> {
        let guard = self.stop.arm();

        let mut pcm = self.open_stream(source)?;
        let format = *pcm.format();
        tracing::debug!(
            source = %source,
            rate_hz = format.sample_rate,
            channels = format.channels,
            codec = pcm.source_info().codec.as_deref().unwrap_or("unknown"),
            duration_ms = ?pcm.source_info().duration_ms,
            "decoder ready"
        );

        let mut line = self
            .lines
            .open_line(&format)
            .map_err(PlaybackError::Device)?;
        let applied_db = line.gain_range().clamp(volume_db);
        if applied_db != volume_db {
            tracing::debug!(requested_db = volume_db, applied_db, "gain clamped");
        }
        line.set_gain_db(applied_db);
        line.start().map_err(PlaybackError::Device)?;

        let pumped = self.pump(&mut pcm, line.as_mut());
        line.drain();
        drop(line);
        pumped?;

        Ok(guard.is_requested())
    }

    fn stop(&self) {
        self.stop.request();
    }
}
