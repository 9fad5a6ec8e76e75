//! Decode stage for the stream player.
//!
//! Uses Symphonia to:
//! - probe the input container/codec
//! - decode packets of the default track
//! - convert them to interleaved signed 16-bit little-endian PCM
//!
//! [`PcmStream`] exposes the converted audio through [`std::io::Read`], so the player can pull
//! fixed-size byte blocks from it.

use std::io::{self, Read};

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Linear PCM format written to an output line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub little_endian: bool,
}

impl PcmFormat {
    /// Signed 16-bit little-endian PCM at the given rate and channel count.
    pub fn signed_16_le(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
            little_endian: true,
        }
    }

    /// Output format for a decoded signal: only the bit depth changes.
    pub fn for_signal(spec: &SignalSpec) -> Self {
        Self::signed_16_le(spec.rate, spec.channels.count() as u16)
    }

    /// Bytes per interleaved frame.
    pub fn frame_bytes(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bits_per_sample / 8)
    }
}

/// Metadata captured while probing the source.
#[derive(Clone, Debug, Default)]
pub struct SourceInfo {
    /// Codec name (best-effort).
    pub codec: Option<String>,
    /// Source bit depth (best-effort).
    pub bit_depth: Option<u16>,
    /// Total duration in milliseconds when the container reports it.
    pub duration_ms: Option<u64>,
}

/// Decoded audio of one source, readable as signed 16-bit little-endian bytes.
pub struct PcmStream {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: PcmFormat,
    info: SourceInfo,
    pending: Vec<u8>,
    pos: usize,
    finished: bool,
}

/// Probe `media` and prepare a decoder for its default audio track.
pub fn open_pcm_stream(media: Box<dyn MediaSource>, hint: Hint) -> Result<PcmStream> {
    let mss = MediaSourceStream::new(media, Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("unsupported or unrecognized audio container")?;
    let reader = probed.format;

    let track = reader
        .default_track()
        .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .or_else(|| {
            reader
                .tracks()
                .iter()
                .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        })
        .ok_or_else(|| anyhow!("No audio track"))?;

    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?;
    let rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;

    let track_id = track.id;
    let codec_params: CodecParameters = track.codec_params.clone();
    let format = PcmFormat::for_signal(&SignalSpec::new(rate, channels));
    let info = SourceInfo {
        codec: codec_name_from_params(&codec_params),
        bit_depth: codec_params
            .bits_per_sample
            .or(codec_params.bits_per_coded_sample)
            .and_then(|v| u16::try_from(v).ok()),
        duration_ms: duration_ms_from_codec_params(&codec_params),
    };

    let decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .context("no decoder for codec")?;

    Ok(PcmStream {
        reader,
        decoder,
        track_id,
        format,
        info,
        pending: Vec::new(),
        pos: 0,
        finished: false,
    })
}

impl PcmStream {
    /// Format of the bytes produced by [`Read::read`].
    pub fn format(&self) -> &PcmFormat {
        &self.format
    }

    pub fn source_info(&self) -> &SourceInfo {
        &self.info
    }

    /// Decode the next packet into `pending`. Returns `false` at end of stream.
    fn refill(&mut self) -> io::Result<bool> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(io::Error::other(e)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(msg)) => {
                    tracing::debug!("skipping undecodable packet: {msg}");
                    continue;
                }
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(e) => return Err(io::Error::other(e)),
            };
            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            if spec.channels.count() != usize::from(self.format.channels) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "channel layout changed mid-stream",
                ));
            }

            let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            samples.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending.reserve(samples.samples().len() * 2);
            for s in samples.samples() {
                self.pending.extend_from_slice(&s.to_le_bytes());
            }
            self.pos = 0;
            return Ok(true);
        }
    }
}

impl Read for PcmStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.pending.len() {
            if self.finished || !self.refill()? {
                self.finished = true;
                return Ok(0);
            }
        }
        let n = (self.pending.len() - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Fill `buf` as far as the stream allows. Returns the number of bytes read; `0` means EOF.
pub fn read_block(stream: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Best-effort duration in milliseconds from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample rate.
fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

/// Best-effort codec label for log output.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
