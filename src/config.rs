use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use crate::analysis::monstercat::Monstercat;
use crate::analysis::pipeline::PipelineSettings;
use crate::analysis::{BandSizes, MAX_BARS};
use crate::audio::stream::{BitFormat, ChannelMerge};
use crate::render::{OutputFormat, RawOptions};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    #[serde(default)]
    pub eq: EqConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    /// Fixed bar count; 0 derives it from the width
    #[serde(default)]
    pub bars: usize,
    #[serde(default = "default_bar_width")]
    pub bar_width: u32,
    #[serde(default = "default_bar_spacing")]
    pub bar_spacing: u32,
    /// Display width in cells, used for automatic bar counts
    #[serde(default = "default_width")]
    pub width: u32,
    /// Full-scale bar value
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_framerate")]
    pub framerate: u32,
    /// Percent
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,
    #[serde(default = "default_true")]
    pub autosens: bool,
    /// Seconds of silence before sleeping, 0 disables
    #[serde(default)]
    pub sleep_timer: u32,
    #[serde(default = "default_lower_cutoff")]
    pub lower_cutoff_freq: f64,
    #[serde(default = "default_upper_cutoff")]
    pub upper_cutoff_freq: f64,
    #[serde(default = "default_bass_cutoff")]
    pub bass_cutoff_freq: f64,
    #[serde(default = "default_treble_cutoff")]
    pub treble_cutoff_freq: f64,
    /// Treble transform length; bass and mid use 4x and 2x
    #[serde(default = "default_treble_size")]
    pub treble_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMethod {
    /// Decoded audio file
    File,
    /// Headerless PCM from a FIFO, file, or stdin
    Pcm,
}

#[derive(Debug, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_method")]
    pub method: InputMethod,
    #[serde(default)]
    pub source: Option<PathBuf>,
    /// PCM only; files report their own format
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_sample_bits")]
    pub sample_bits: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// Seconds to wait for the source to report its format
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonoOption {
    Average,
    Left,
    Right,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_format")]
    pub format: OutputFormat,
    #[serde(default = "default_layout")]
    pub channels: ChannelLayout,
    #[serde(default = "default_mono_option")]
    pub mono_option: MonoOption,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default = "default_ascii_max")]
    pub ascii_max_range: u32,
    #[serde(default = "default_bar_delimiter")]
    pub bar_delimiter: u8,
    #[serde(default = "default_frame_delimiter")]
    pub frame_delimiter: u8,
    #[serde(default = "default_bit_depth")]
    pub bit_depth: u32,
}

#[derive(Debug, Deserialize)]
pub struct SmoothingConfig {
    /// Monstercat strength; the spread decays by 1.5x this per bar
    #[serde(default)]
    pub monstercat: f64,
    /// Non-zero switches monstercat to wave spreading
    #[serde(default)]
    pub waves: u32,
    /// Percent
    #[serde(default = "default_gravity")]
    pub gravity: f64,
    /// Percent
    #[serde(default = "default_integral")]
    pub integral: f64,
    /// Bars at or below this value are dropped to zero
    #[serde(default)]
    pub noise_floor: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct EqConfig {
    /// Gain per key, spread evenly across the bars from low to high
    #[serde(default)]
    pub gains: Vec<f64>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bars: 0,
            bar_width: default_bar_width(),
            bar_spacing: default_bar_spacing(),
            width: default_width(),
            height: default_height(),
            framerate: default_framerate(),
            sensitivity: default_sensitivity(),
            autosens: true,
            sleep_timer: 0,
            lower_cutoff_freq: default_lower_cutoff(),
            upper_cutoff_freq: default_upper_cutoff(),
            bass_cutoff_freq: default_bass_cutoff(),
            treble_cutoff_freq: default_treble_cutoff(),
            treble_size: default_treble_size(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            source: None,
            sample_rate: default_sample_rate(),
            sample_bits: default_sample_bits(),
            channels: default_channels(),
            startup_timeout: default_startup_timeout(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            channels: default_layout(),
            mono_option: default_mono_option(),
            reverse: false,
            ascii_max_range: default_ascii_max(),
            bar_delimiter: default_bar_delimiter(),
            frame_delimiter: default_frame_delimiter(),
            bit_depth: default_bit_depth(),
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            monstercat: 0.0,
            waves: 0,
            gravity: default_gravity(),
            integral: default_integral(),
            noise_floor: 0.0,
        }
    }
}

fn default_bar_width() -> u32 { 2 }
fn default_bar_spacing() -> u32 { 1 }
fn default_width() -> u32 { 192 }
fn default_height() -> u32 { 1000 }
fn default_framerate() -> u32 { 60 }
fn default_sensitivity() -> f64 { 100.0 }
fn default_true() -> bool { true }
fn default_lower_cutoff() -> f64 { 50.0 }
fn default_upper_cutoff() -> f64 { 10000.0 }
fn default_bass_cutoff() -> f64 { 150.0 }
fn default_treble_cutoff() -> f64 { 2500.0 }
fn default_treble_size() -> usize { 1024 }
fn default_method() -> InputMethod { InputMethod::File }
fn default_sample_rate() -> u32 { 44100 }
fn default_sample_bits() -> u32 { 16 }
fn default_channels() -> u16 { 2 }
fn default_startup_timeout() -> u64 { 5 }
fn default_format() -> OutputFormat { OutputFormat::Ascii }
fn default_layout() -> ChannelLayout { ChannelLayout::Stereo }
fn default_mono_option() -> MonoOption { MonoOption::Average }
fn default_ascii_max() -> u32 { 1000 }
fn default_bar_delimiter() -> u8 { b';' }
fn default_frame_delimiter() -> u8 { b'\n' }
fn default_bit_depth() -> u32 { 16 }
fn default_gravity() -> f64 { 100.0 }
fn default_integral() -> f64 { 77.0 }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// Notices rewrites of the config file by its modification time.
pub struct ConfigWatch {
    path: PathBuf,
    modified: Option<SystemTime>,
    interval: Duration,
    last_check: Instant,
}

impl ConfigWatch {
    pub fn new(path: PathBuf, interval: Duration) -> Self {
        let modified = modified_time(&path);
        Self {
            path,
            modified,
            interval,
            last_check: Instant::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once per change, checking the file at most once per interval.
    /// A file that disappears is not a change.
    pub fn poll(&mut self) -> bool {
        if self.last_check.elapsed() < self.interval {
            return false;
        }
        self.last_check = Instant::now();

        let current = modified_time(&self.path);
        if current.is_none() || current == self.modified {
            return false;
        }
        self.modified = current;
        true
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Explicit path, then `barscope.toml` in the working directory, then the
/// per-user locations.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("barscope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("barscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("barscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

impl Config {
    pub fn channel_merge(&self) -> ChannelMerge {
        match (self.output.channels, self.output.mono_option) {
            (ChannelLayout::Stereo, _) => ChannelMerge::Independent,
            (ChannelLayout::Mono, MonoOption::Average) => ChannelMerge::Average,
            (ChannelLayout::Mono, MonoOption::Left) => ChannelMerge::Left,
            (ChannelLayout::Mono, MonoOption::Right) => ChannelMerge::Right,
        }
    }

    pub fn pcm_bit_format(&self) -> Result<BitFormat> {
        BitFormat::from_bits(self.input.sample_bits).with_context(|| {
            format!(
                "Unsupported sample bits {} (expected 16, 24 or 32)",
                self.input.sample_bits
            )
        })
    }

    pub fn raw_options(&self) -> RawOptions {
        let bit_depth = match self.output.bit_depth {
            8 | 16 => self.output.bit_depth,
            other => {
                log::warn!("Bit depth {} not supported, using 16", other);
                16
            }
        };
        RawOptions {
            ascii_max: self.output.ascii_max_range.max(1),
            bar_delimiter: self.output.bar_delimiter,
            frame_delimiter: self.output.frame_delimiter,
            bit_depth,
        }
    }

    /// Output bar count after the width fallback, the hard cap and stereo parity.
    pub fn bar_count(&self) -> usize {
        let g = &self.general;
        let stereo = self.output.channels == ChannelLayout::Stereo;
        let cell = (g.bar_width + g.bar_spacing).max(1) as usize;
        let fitting = (g.width + g.bar_spacing) as usize / cell;

        let mut bars = if g.bars == 0 {
            fitting
        } else if g.bars > fitting {
            log::warn!("{} bars do not fit a width of {}, using {}", g.bars, g.width, fitting);
            fitting
        } else {
            g.bars
        };

        if bars > MAX_BARS {
            log::warn!("Bar count {} above maximum, using {}", bars, MAX_BARS);
            bars = MAX_BARS;
        }
        if bars < 1 {
            log::warn!("Bar count must be at least 1");
            bars = 1;
        }
        if stereo && bars % 2 != 0 {
            bars = if bars == 1 { 2 } else { bars - 1 };
            log::warn!("Stereo needs an even bar count, using {}", bars);
        }
        bars
    }

    pub fn monstercat(&self) -> Monstercat {
        let s = &self.smoothing;
        if s.monstercat <= 0.0 {
            return Monstercat::Off;
        }
        if s.waves > 0 {
            return Monstercat::Waves;
        }
        let decay = s.monstercat * 1.5;
        if decay <= 1.0 {
            log::warn!("Monstercat {} is too weak to spread, disabling", s.monstercat);
            return Monstercat::Off;
        }
        Monstercat::Decay(decay)
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let g = &self.general;
        let sizes = BandSizes::new(g.treble_size)?;

        let mut integral = self.smoothing.integral / 100.0;
        if integral >= 1.0 {
            log::warn!("Integral {}% would never decay, using 99%", self.smoothing.integral);
            integral = 0.99;
        }
        let framerate = if g.framerate == 0 {
            log::warn!("Frame rate 0 is not usable, using 1");
            1
        } else {
            g.framerate
        };

        Ok(PipelineSettings {
            bars: self.bar_count(),
            lower_cutoff: g.lower_cutoff_freq,
            upper_cutoff: g.upper_cutoff_freq,
            bass_cutoff: g.bass_cutoff_freq,
            treble_cutoff: g.treble_cutoff_freq,
            sizes,
            height: g.height.max(1),
            eq: self.eq.gains.clone(),
            sensitivity: g.sensitivity.max(0.0) / 100.0,
            autosens: g.autosens,
            noise_floor: self.smoothing.noise_floor,
            monstercat: self.monstercat(),
            gravity: self.smoothing.gravity.max(0.0) / 100.0,
            integral: integral.max(0.0),
            framerate,
            silence_timeout: g.sleep_timer,
            reverse: self.output.reverse,
            raw_output: self.output.format.is_raw(),
        })
    }
}
