use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::source::SampleSource;
use super::stream::{BitFormat, SharedAudio, StreamFormat};

/// Plays an audio file into the shared buffers at real-time pace.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl SampleSource for FileSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn run(self: Box<Self>, shared: &SharedAudio) -> Result<()> {
        let path = &self.path;
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .context("Failed to probe audio format")?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
            .context("No audio tracks found")?;

        let track_id = track.id;
        let channels = track.codec_params.channels.map_or(1, |c| c.count()) as u16;
        let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;
        let bit_format = track
            .codec_params
            .bits_per_sample
            .and_then(BitFormat::from_bits)
            .unwrap_or(BitFormat::F32);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .context("Failed to create audio decoder")?;

        shared.publish_format(StreamFormat {
            sample_rate,
            bit_format,
            channels,
        });
        log::info!(
            "Streaming {}: {}Hz, {} channel(s), {:?}",
            path.display(),
            sample_rate,
            channels,
            bit_format
        );

        let started = Instant::now();
        let mut frames_written: u64 = 0;

        while !shared.should_terminate() {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            let num_frames = decoded.frames();

            let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            shared.write_interleaved(sample_buf.samples(), channels);
            frames_written += num_frames as u64;

            // Hold the stream to wall-clock time
            let due = Duration::from_secs_f64(frames_written as f64 / sample_rate as f64);
            if let Some(ahead) = due.checked_sub(started.elapsed()) {
                std::thread::sleep(ahead);
            }
        }

        log::info!(
            "Finished streaming {} ({:.1}s)",
            path.display(),
            frames_written as f64 / sample_rate as f64
        );
        Ok(())
    }
}
