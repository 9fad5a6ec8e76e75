//! Output lines: a blocking PCM sink with gain control.
//!
//! [`LineProvider`] acquires lines for a [`PcmFormat`]; [`AudioLine`] is the handle a player
//! writes decoded blocks into. Releasing a line is dropping it.
//!
//! [`CpalLineProvider`] backs lines with a CPAL output stream fed through a bounded
//! [`SampleQueue`]. When the device cannot run at the source rate, a resampler thread sits
//! between the writer and the callback.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::StreamTrait;

use crate::config::PlaybackConfig;
use crate::decode::PcmFormat;
use crate::device;
use crate::playback::{self, CallbackShared};
use crate::queue::{self, SampleQueue, calc_max_buffered_samples};
use crate::resample::{self, ResampleConfig};

/// Gain range a line accepts, in decibels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainRange {
    pub min_db: f32,
    pub max_db: f32,
}

impl GainRange {
    /// Range of the software gain stage: full attenuation up to +6 dB (amplitude ×2).
    pub const SOFTWARE: GainRange = GainRange {
        min_db: -80.0,
        max_db: 6.0206,
    };

    /// Clamp `db` into the range. NaN maps to the minimum.
    pub fn clamp(&self, db: f32) -> f32 {
        if db.is_nan() {
            return self.min_db;
        }
        db.clamp(self.min_db, self.max_db)
    }
}

/// An acquired output line.
///
/// `write` blocks until the whole block is accepted. The line is released on drop.
pub trait AudioLine {
    fn format(&self) -> &PcmFormat;
    fn gain_range(&self) -> GainRange;
    fn set_gain_db(&mut self, db: f32);
    fn start(&mut self) -> Result<()>;
    /// Queue `block` for output; returns the number of bytes accepted.
    fn write(&mut self, block: &[u8]) -> Result<usize>;
    /// Block until everything written so far has been played.
    fn drain(&mut self);
}

/// Source of output lines.
pub trait LineProvider: Send + Sync {
    fn open_line(&self, format: &PcmFormat) -> Result<Box<dyn AudioLine>>;
}

/// Convert decibels to a linear amplitude factor.
pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Lines on a CPAL output device.
#[derive(Clone, Debug, Default)]
pub struct CpalLineProvider {
    device: Option<String>,
    playback: PlaybackConfig,
}

impl CpalLineProvider {
    /// `device` is a case-insensitive name substring; `None` picks the host default.
    pub fn new(device: Option<String>, playback: PlaybackConfig) -> Self {
        Self { device, playback }
    }
}

impl LineProvider for CpalLineProvider {
    fn open_line(&self, format: &PcmFormat) -> Result<Box<dyn AudioLine>> {
        if format.bits_per_sample != 16 || !format.little_endian {
            return Err(anyhow!("unsupported line format {format:?}"));
        }

        let host = cpal::default_host();
        let device = device::pick_device(&host, self.device.as_deref())?;
        let config = device::pick_output_config(&device, format.sample_rate, format.channels)?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(buf) = device::pick_buffer_size(&config) {
            stream_config.buffer_size = buf;
        }

        let channels = usize::from(format.channels);
        let srcq = Arc::new(SampleQueue::new(
            channels,
            calc_max_buffered_samples(format.sample_rate, channels, self.playback.buffer_seconds),
        ));

        let dst_rate = stream_config.sample_rate;
        let dstq = if dst_rate == format.sample_rate {
            srcq.clone()
        } else {
            tracing::info!(
                from_hz = format.sample_rate,
                to_hz = dst_rate,
                "resampling"
            );
            resample::start_resampler(
                srcq.clone(),
                format.sample_rate,
                dst_rate,
                ResampleConfig {
                    chunk_frames: self.playback.chunk_frames,
                    buffer_seconds: self.playback.buffer_seconds,
                },
            )?
        };

        let shared = Arc::new(CallbackShared::new());
        let stream = playback::build_output_stream(
            &device,
            &stream_config,
            config.sample_format(),
            &dstq,
            &shared,
            self.playback.refill_max_frames,
        )
        .context("open output line")?;

        tracing::debug!(
            rate_hz = format.sample_rate,
            channels = format.channels,
            device_rate_hz = dst_rate,
            device_channels = stream_config.channels,
            buffer_size = ?stream_config.buffer_size,
            "output line opened"
        );

        Ok(Box::new(CpalLine {
            format: *format,
            stream,
            srcq,
            dstq,
            shared,
            scratch: Vec::new(),
        }))
    }
}

/// A CPAL output stream plus its feeding queues.
struct CpalLine {
    format: PcmFormat,
    stream: cpal::Stream,
    srcq: Arc<SampleQueue>,
    dstq: Arc<SampleQueue>,
    shared: Arc<CallbackShared>,
    scratch: Vec<f32>,
}

impl AudioLine for CpalLine {
    fn format(&self) -> &PcmFormat {
        &self.format
    }

    fn gain_range(&self) -> GainRange {
        GainRange::SOFTWARE
    }

    fn set_gain_db(&mut self, db: f32) {
        let db = GainRange::SOFTWARE.clamp(db);
        self.shared.set_gain(db_to_linear(db));
    }

    fn start(&mut self) -> Result<()> {
        self.stream.play().context("start output line")?;
        Ok(())
    }

    fn write(&mut self, block: &[u8]) -> Result<usize> {
        if self.shared.failed.load(Ordering::Relaxed) {
            return Err(anyhow!("output line failed"));
        }
        if self.srcq.is_done() {
            return Err(anyhow!("output line closed"));
        }
        let usable = block.len() - block.len() % 2;
        self.scratch.clear();
        self.scratch.extend(
            block[..usable]
                .chunks_exact(2)
                .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0),
        );
        if !self.srcq.push_blocking(&self.scratch) {
            return Err(anyhow!("output line closed"));
        }
        Ok(usable)
    }

    fn drain(&mut self) {
        tracing::debug!(
            buffered_frames = self.srcq.len_frames() + self.dstq.len_frames(),
            "draining output line"
        );
        self.srcq.close();
        if queue::wait_until_done_and_empty_or_cancel(&self.dstq, &self.shared.failed) {
            // The device still holds one callback buffer.
            thread::sleep(Duration::from_millis(100));
        }
    }
}

impl Drop for CpalLine {
    fn drop(&mut self) {
        self.srcq.abort();
        self.dstq.abort();
        if let Err(e) = self.stream.pause() {
            tracing::debug!("pause on release failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_range_tops_out_at_double_amplitude() {
        let max = db_to_linear(GainRange::SOFTWARE.max_db);
        assert!((max - 2.0).abs() < 1e-3);
    }

    #[test]
    fn clamp_limits_requested_gain() {
        let range = GainRange {
            min_db: -60.0,
            max_db: 6.0,
        };
        assert_eq!(range.clamp(20.0), 6.0);
        assert_eq!(range.clamp(-100.0), -60.0);
        assert_eq!(range.clamp(-20.0), -20.0);
        assert_eq!(range.clamp(f32::NAN), -60.0);
    }

    #[test]
    fn db_to_linear_reference_points() {
        assert_eq!(db_to_linear(0.0), 1.0);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 1e-6);
    }
}
