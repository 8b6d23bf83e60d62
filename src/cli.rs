use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::{ChannelLayout, Config, InputMethod};
use crate::render::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "barscope", about = "Real-time audio spectrum bars for scripts and status bars")]
pub struct Cli {
    /// Audio source: a file to decode, or with --pcm a FIFO/raw file ("-" for stdin)
    pub input: Option<PathBuf>,

    /// Config file (default: ./barscope.toml, then ~/.config/barscope/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Read headerless PCM instead of decoding a file
    #[arg(long)]
    pub pcm: bool,

    /// PCM sample rate
    #[arg(long)]
    pub rate: Option<u32>,

    /// PCM sample bits (16, 24, 32)
    #[arg(long)]
    pub bits: Option<u32>,

    /// PCM channel count
    #[arg(long)]
    pub source_channels: Option<u16>,

    /// Analyze and output one or two channels
    #[arg(long, value_enum)]
    pub channels: Option<ChannelLayout>,

    /// Number of bars (0 = fit the width)
    #[arg(short, long)]
    pub bars: Option<usize>,

    #[arg(long)]
    pub framerate: Option<u32>,

    /// Sensitivity in percent
    #[arg(long)]
    pub sensitivity: Option<f64>,

    /// Disable automatic sensitivity
    #[arg(long)]
    pub no_autosens: bool,

    /// Full-scale bar value
    #[arg(long)]
    pub height: Option<u32>,

    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Reverse bar order
    #[arg(long)]
    pub reverse: bool,

    /// Stop after this many frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Exit with an error unless the last frame matches
    #[arg(long, value_enum, requires = "frames")]
    pub expect: Option<Expectation>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Expectation {
    Zero,
    NonZero,
}

impl Cli {
    /// Command-line values win over the config file.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(ref input) = self.input {
            config.input.source = Some(input.clone());
        }
        if self.pcm {
            config.input.method = InputMethod::Pcm;
        }
        if let Some(rate) = self.rate {
            config.input.sample_rate = rate;
        }
        if let Some(bits) = self.bits {
            config.input.sample_bits = bits;
        }
        if let Some(channels) = self.source_channels {
            config.input.channels = channels;
        }
        if let Some(layout) = self.channels {
            config.output.channels = layout;
        }
        if let Some(bars) = self.bars {
            config.general.bars = bars;
        }
        if let Some(framerate) = self.framerate {
            config.general.framerate = framerate;
        }
        if let Some(sensitivity) = self.sensitivity {
            config.general.sensitivity = sensitivity;
        }
        if self.no_autosens {
            config.general.autosens = false;
        }
        if let Some(height) = self.height {
            config.general.height = height;
        }
        if let Some(format) = self.output {
            config.output.format = format;
        }
        if self.reverse {
            config.output.reverse = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "barscope",
            "/tmp/fifo",
            "--pcm",
            "--bits",
            "24",
            "--channels",
            "mono",
            "--bars",
            "12",
            "--no-autosens",
            "-o",
            "binary",
            "--frames",
            "100",
            "--expect",
            "non-zero",
        ]);
        let mut config = Config::default();
        cli.apply_to(&mut config);

        assert_eq!(config.input.method, InputMethod::Pcm);
        assert_eq!(config.input.source, Some(PathBuf::from("/tmp/fifo")));
        assert_eq!(config.input.sample_bits, 24);
        assert_eq!(config.output.channels, ChannelLayout::Mono);
        assert_eq!(config.general.bars, 12);
        assert!(!config.general.autosens);
        assert_eq!(config.output.format, OutputFormat::Binary);
        assert_eq!(cli.expect, Some(Expectation::NonZero));
    }

    #[test]
    fn absent_flags_keep_config() {
        let cli = Cli::parse_from(["barscope"]);
        let mut config = Config::default();
        config.general.framerate = 30;
        cli.apply_to(&mut config);
        assert_eq!(config.general.framerate, 30);
        assert!(config.general.autosens);
        assert_eq!(config.input.source, None);
    }

    #[test]
    fn expect_requires_frames() {
        assert!(Cli::try_parse_from(["barscope", "--expect", "zero"]).is_err());
    }
}
