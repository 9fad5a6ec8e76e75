//! Streaming resample stage.
//!
//! Uses Rubato to convert line samples from the source rate to the device rate when the
//! device cannot open the source rate directly. Runs in a background thread between two
//! [`SampleQueue`]s.

use std::sync::Arc;
use std::thread;

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::queue::{PopStrategy, SampleQueue, calc_max_buffered_samples};

/// Configuration for the streaming resampler stage.
#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input chunk size in frames for the steady-state loop.
    pub chunk_frames: usize,
    /// Target buffering (seconds) for the output queue.
    pub buffer_seconds: f32,
}

/// Start a resampler thread reading `srcq` at `src_rate` and writing a new queue at `dst_rate`.
///
/// The output queue is closed once `srcq` closes and its tail has been flushed.
pub fn start_resampler(
    srcq: Arc<SampleQueue>,
    src_rate: u32,
    dst_rate: u32,
    cfg: ResampleConfig,
) -> Result<Arc<SampleQueue>> {
    if src_rate == 0 || dst_rate == 0 {
        return Err(anyhow!("invalid resample rates {src_rate} -> {dst_rate}"));
    }
    let channels = srcq.channels();

    let max_buffered_samples = calc_max_buffered_samples(dst_rate, channels, cfg.buffer_seconds);
    let dstq = Arc::new(SampleQueue::new(channels, max_buffered_samples));

    let f_ratio = dst_rate as f64 / src_rate as f64;

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };

    let chunk_in_frames = cfg.chunk_frames.max(1);
    let mut resampler: Box<dyn Resampler<f32>> = Box::new(Async::<f32>::new_sinc(
        f_ratio,
        1.1,
        &params,
        chunk_in_frames,
        channels,
        FixedAsync::Input,
    )?);

    let dstq_thread = dstq.clone();
    thread::Builder::new()
        .name("line-resampler".to_string())
        .spawn(move || {
            let mut out = vec![0.0f32; channels * chunk_in_frames * 3];
            let mut indexing = Indexing {
                input_offset: 0,
                output_offset: 0,
                active_channels_mask: None,
                partial_len: None,
            };

            while let Some(chunk) = srcq.pop(PopStrategy::BlockingExact {
                frames: chunk_in_frames,
            }) {
                indexing.partial_len = None;
                match process(&mut *resampler, &chunk, channels, &mut out, &indexing) {
                    Ok(n) => {
                        if !dstq_thread.push_blocking(&out[..n]) {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::error!("resampler process error: {e:#}");
                        dstq_thread.close();
                        return;
                    }
                }
            }

            while let Some(tail) = srcq.pop(PopStrategy::BlockingUpTo {
                max_frames: chunk_in_frames,
            }) {
                indexing.partial_len = Some(tail.len() / channels);
                match process(&mut *resampler, &tail, channels, &mut out, &indexing) {
                    Ok(n) if n > 0 => {
                        if !dstq_thread.push_blocking(&out[..n]) {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("resampler tail process error: {e:#}");
                        break;
                    }
                }
            }

            dstq_thread.close();
        })?;

    Ok(dstq)
}

/// Run one chunk through `resampler`; returns the number of output samples written to `out`.
fn process(
    resampler: &mut dyn Resampler<f32>,
    input: &[f32],
    channels: usize,
    out: &mut [f32],
    indexing: &Indexing,
) -> Result<usize> {
    let in_frames = input.len() / channels;
    let input_adapter = InterleavedSlice::new(input, channels, in_frames)
        .map_err(|e| anyhow!("interleaved slice (input) error: {e}"))?;
    let out_frames = out.len() / channels;
    let mut output_adapter = InterleavedSlice::new_mut(out, channels, out_frames)
        .map_err(|e| anyhow!("interleaved slice (output) error: {e}"))?;

    let (_nbr_in, nbr_out) =
        resampler.process_into_buffer(&input_adapter, &mut output_adapter, Some(indexing))?;
    Ok(nbr_out * channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_rates() {
        let srcq = Arc::new(SampleQueue::new(2, 64));
        let cfg = ResampleConfig {
            chunk_frames: 64,
            buffer_seconds: 0.1,
        };
        assert!(start_resampler(srcq.clone(), 0, 48_000, cfg).is_err());
        assert!(start_resampler(srcq, 44_100, 0, cfg).is_err());
    }

    #[test]
    fn upsamples_and_closes_output() {
        let srcq = Arc::new(SampleQueue::new(1, 48_000));
        let cfg = ResampleConfig {
            chunk_frames: 256,
            buffer_seconds: 1.0,
        };
        let dstq = start_resampler(srcq.clone(), 22_050, 44_100, cfg).unwrap();

        let input: Vec<f32> = (0..4_410).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        assert!(srcq.push_blocking(&input));
        srcq.close();

        let mut produced = 0usize;
        while let Some(v) = dstq.pop(PopStrategy::BlockingUpTo { max_frames: 1024 }) {
            produced += v.len();
        }
        assert!(dstq.is_done());
        // Roughly twice the input, minus filter delay at the tail.
        assert!(produced > 6_000, "produced {produced}");
        assert!(produced < 10_000, "produced {produced}");
    }
}
