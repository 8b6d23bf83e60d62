use anyhow::{Context, Result};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::source::SampleSource;
use super::stream::{BitFormat, SharedAudio, StreamFormat};

/// Frames read per chunk
const CHUNK_FRAMES: usize = 512;

/// Raw interleaved little-endian PCM from a FIFO, file, or stdin (`-`).
///
/// The stream carries no header, so rate, format, and channel count come from
/// configuration. Reads block; a writer that stalls also stalls shutdown until
/// its next write or close. Regular files are played at real-time pace, pipes
/// are paced by their writer.
pub struct PcmSource {
    path: PathBuf,
    format: StreamFormat,
}

impl PcmSource {
    pub fn new(path: &Path, format: StreamFormat) -> Self {
        Self {
            path: path.to_path_buf(),
            format,
        }
    }

    fn open(&self) -> Result<Box<dyn Read + Send>> {
        if self.path.as_os_str() == "-" {
            return Ok(Box::new(std::io::stdin()));
        }
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open PCM input: {}", self.path.display()))?;
        Ok(Box::new(file))
    }

    fn is_regular_file(&self) -> bool {
        self.path.as_os_str() != "-"
            && std::fs::metadata(&self.path).map(|m| m.is_file()).unwrap_or(false)
    }
}

impl SampleSource for PcmSource {
    fn describe(&self) -> String {
        format!(
            "raw PCM {} ({}Hz, {:?}, {} ch)",
            self.path.display(),
            self.format.sample_rate,
            self.format.bit_format,
            self.format.channels
        )
    }

    fn run(self: Box<Self>, shared: &SharedAudio) -> Result<()> {
        // The format is configured, so report it before a FIFO open blocks
        // waiting for a writer
        shared.publish_format(self.format);
        let mut reader = self.open()?;

        let sample_bytes = self.format.bit_format.bytes_per_sample();
        let frame_bytes = sample_bytes * usize::from(self.format.channels.max(1));
        let mut bytes = vec![0u8; frame_bytes * CHUNK_FRAMES];
        let mut filled = 0;
        let mut samples = Vec::with_capacity(bytes.len() / sample_bytes);
        let pace = self.is_regular_file();
        let started = Instant::now();
        let mut frames_read: u64 = 0;

        while !shared.should_terminate() {
            let n = match reader.read(&mut bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("Failed to read PCM input"),
            };
            filled += n;

            // Only whole frames; carry the remainder over
            let usable = filled - filled % frame_bytes;
            if usable == 0 {
                continue;
            }
            samples.clear();
            decode_samples(&bytes[..usable], self.format.bit_format, &mut samples);
            shared.write_interleaved(&samples, self.format.channels);

            bytes.copy_within(usable..filled, 0);
            filled -= usable;

            frames_read += (usable / frame_bytes) as u64;
            if pace {
                let due = Duration::from_secs_f64(frames_read as f64 / f64::from(self.format.sample_rate.max(1)));
                if let Some(ahead) = due.checked_sub(started.elapsed()) {
                    std::thread::sleep(ahead);
                }
            }
        }

        Ok(())
    }
}

/// Decode packed little-endian samples into normalized floats.
pub fn decode_samples(bytes: &[u8], format: BitFormat, out: &mut Vec<f32>) {
    let width = format.bytes_per_sample();
    for raw in bytes.chunks_exact(width) {
        let sample = match format {
            BitFormat::S16 => i16::from_le_bytes([raw[0], raw[1]]) as f32 / 32768.0,
            BitFormat::S24 => {
                // Sign-extend by placing the 24 bits in the top of an i32
                let v = i32::from_le_bytes([0, raw[0], raw[1], raw[2]]) >> 8;
                v as f32 / 8_388_608.0
            }
            BitFormat::S32 => {
                i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f32 / 2_147_483_648.0
            }
            BitFormat::F32 => f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
        };
        out.push(sample);
    }
}
