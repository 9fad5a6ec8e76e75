#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use music_player::decode::PcmFormat;
use music_player::{AudioLine, GainRange, LineProvider};

/// What happened to the lines handed out by [`MockLines`].
#[derive(Debug, Default)]
pub struct LineLog {
    pub formats: Vec<PcmFormat>,
    pub gains: Vec<f32>,
    pub bytes_written: usize,
    pub writes: usize,
    pub started: usize,
    pub drained: usize,
    pub released: usize,
}

/// Line provider that records calls instead of touching a device.
pub struct MockLines {
    pub log: Arc<Mutex<LineLog>>,
    range: GainRange,
    write_delay: Duration,
    fail_after_writes: Option<usize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl MockLines {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(LineLog::default())),
            range: GainRange::SOFTWARE,
            write_delay: Duration::ZERO,
            fail_after_writes: None,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_range(mut self, min_db: f32, max_db: f32) -> Self {
        self.range = GainRange { min_db, max_db };
        self
    }

    /// Sleep this long per write, standing in for device pacing.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub fn failing_after(mut self, writes: usize) -> Self {
        self.fail_after_writes = Some(writes);
        self
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn snapshot<T>(&self, f: impl FnOnce(&LineLog) -> T) -> T {
        f(&self.log.lock().unwrap())
    }
}

impl LineProvider for MockLines {
    fn open_line(&self, format: &PcmFormat) -> Result<Box<dyn AudioLine>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.log.lock().unwrap().formats.push(*format);
        Ok(Box::new(MockLine {
            format: *format,
            range: self.range,
            write_delay: self.write_delay,
            fail_after_writes: self.fail_after_writes,
            writes: 0,
            log: self.log.clone(),
            active: self.active.clone(),
        }))
    }
}

struct MockLine {
    format: PcmFormat,
    range: GainRange,
    write_delay: Duration,
    fail_after_writes: Option<usize>,
    writes: usize,
    log: Arc<Mutex<LineLog>>,
    active: Arc<AtomicUsize>,
}

impl AudioLine for MockLine {
    fn format(&self) -> &PcmFormat {
        &self.format
    }

    fn gain_range(&self) -> GainRange {
        self.range
    }

    fn set_gain_db(&mut self, db: f32) {
        self.log.lock().unwrap().gains.push(db);
    }

    fn start(&mut self) -> Result<()> {
        self.log.lock().unwrap().started += 1;
        Ok(())
    }

    fn write(&mut self, block: &[u8]) -> Result<usize> {
        if self.fail_after_writes.is_some_and(|n| self.writes >= n) {
            return Err(anyhow!("device unplugged"));
        }
        self.writes += 1;
        if !self.write_delay.is_zero() {
            thread::sleep(self.write_delay);
        }
        let mut log = self.log.lock().unwrap();
        log.writes += 1;
        log.bytes_written += block.len();
        Ok(block.len())
    }

    fn drain(&mut self) {
        self.log.lock().unwrap().drained += 1;
    }
}

impl Drop for MockLine {
    fn drop(&mut self) {
        self.log.lock().unwrap().released += 1;
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Write a 16-bit PCM WAV of `frames` frames and return its path.
pub fn write_wav(dir: &Path, name: &str, rate: u32, channels: u16, frames: u32) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, wav_bytes(rate, channels, frames)).unwrap();
    path
}

/// In-memory 16-bit PCM WAV with a quiet saw wave.
pub fn wav_bytes(rate: u32, channels: u16, frames: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut out = Vec::new();
    {
        let mut writer = hound::WavWriter::new(std::io::Cursor::new(&mut out), spec).unwrap();
        for i in 0..frames {
            for _ in 0..channels {
                writer.write_sample(((i % 200) as i16 - 100) * 50).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    out
}
