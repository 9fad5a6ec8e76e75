//! CPAL output stream for an [`AudioLine`](crate::line::AudioLine).
//!
//! The callback:
//! - refills a small local buffer from the shared queue without blocking
//! - applies the line gain
//! - maps channels (mono↔stereo, best-effort otherwise)
//! - converts `f32` samples to the device sample format

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::queue::{PopStrategy, SampleQueue};

/// State shared between a line and its output callback.
pub(crate) struct CallbackShared {
    /// Linear gain as `f32` bits.
    pub gain: AtomicU32,
    /// Set by the stream error callback.
    pub failed: AtomicBool,
}

impl CallbackShared {
    pub fn new() -> Self {
        Self {
            gain: AtomicU32::new(1.0f32.to_bits()),
            failed: AtomicBool::new(false),
        }
    }

    pub fn set_gain(&self, linear: f32) {
        self.gain.store(linear.to_bits(), Ordering::Relaxed);
    }

    fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }
}

/// Build a CPAL output stream that plays `queue`.
///
/// `queue` must already hold samples at the stream's sample rate. A stream error marks
/// `shared.failed` and aborts `queue` so a blocked writer wakes up.
pub(crate) fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SampleQueue>,
    shared: &Arc<CallbackShared>,
    refill_max_frames: usize,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(device, config, queue, shared, refill_max_frames)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(device, config, queue, shared, refill_max_frames)
        }
        cpal::SampleFormat::I32 => {
            build_stream::<i32>(device, config, queue, shared, refill_max_frames)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(device, config, queue, shared, refill_max_frames)
        }
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    shared: &Arc<CallbackShared>,
    refill_max_frames: usize,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = usize::from(config.channels).max(1);
    let refill_max_frames = refill_max_frames.max(1);
    let mut state = CallbackState {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
    };

    let queue_cb = queue.clone();
    let shared_cb = shared.clone();
    let queue_err = queue.clone();
    let shared_err = shared.clone();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let gain = shared_cb.gain();
            let frames = data.len() / channels_out;

            for frame in 0..frames {
                if state.pos >= state.src.len() {
                    state.pos = 0;
                    state.src.clear();
                    match queue_cb.pop(PopStrategy::NonBlocking {
                        max_frames: refill_max_frames,
                    }) {
                        Some(v) => state.src = v,
                        None => {
                            let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
                            data[frame * channels_out..].fill(silence);
                            return;
                        }
                    }
                }
                for ch in 0..channels_out {
                    let sample = next_sample_mapped(&mut state, channels_out, ch) * gain;
                    data[frame * channels_out + ch] =
                        <T as cpal::Sample>::from_sample::<f32>(sample.clamp(-1.0, 1.0));
                }
            }
        },
        move |err| {
            tracing::warn!("stream error: {err}");
            shared_err.failed.store(true, Ordering::Relaxed);
            queue_err.abort();
        },
        None,
    )?;

    Ok(stream)
}

/// Local buffer owned by the callback closure.
struct CallbackState {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

/// Read one output sample for `dst_ch`, mapping the source layout onto `dst_channels`.
///
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - other layouts: clamp to the available channels
///
/// `st.pos` advances once per destination frame (after the last channel).
fn next_sample_mapped(st: &mut CallbackState, dst_channels: usize, dst_ch: usize) -> f32 {
    if st.pos >= st.src.len() {
        return 0.0;
    }

    let frame_start = st.pos;
    let get_src = |ch: usize, st: &CallbackState| -> f32 {
        if ch < st.src_channels && frame_start + ch < st.src.len() {
            st.src[frame_start + ch]
        } else {
            0.0
        }
    };

    let out = match (st.src_channels, dst_channels) {
        (2, 1) => 0.5 * (get_src(0, st) + get_src(1, st)),
        (1, _) => get_src(0, st),
        _ => get_src(dst_ch.min(st.src_channels.saturating_sub(1)), st),
    };

    if dst_ch + 1 == dst_channels {
        st.pos += st.src_channels;
    }
    out
}
