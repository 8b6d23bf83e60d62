pub mod json;
pub mod raw;

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::VisResult;

/// One frame of output, bar heights relative to the display height.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderFrame {
    pub bar_count: usize,
    /// Each in [0, 1]
    pub bars: Vec<f32>,
}

impl RenderFrame {
    pub fn from_bars(bars: &[i32], height: u32) -> Self {
        let height = height.max(1) as f32;
        Self {
            bar_count: bars.len(),
            bars: bars
                .iter()
                .map(|&b| (b as f32 / height).clamp(0.0, 1.0))
                .collect(),
        }
    }
}

pub trait Renderer {
    fn render(&mut self, frame: &RenderFrame) -> VisResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Delimited integers, one frame per line
    Ascii,
    /// Little-endian unsigned integers, no framing
    Binary,
    /// One JSON object per line
    Json,
}

impl OutputFormat {
    /// Raw formats report empty bars as zero; display formats keep a one-unit floor.
    pub fn is_raw(self) -> bool {
        matches!(self, OutputFormat::Ascii | OutputFormat::Binary)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawOptions {
    pub ascii_max: u32,
    pub bar_delimiter: u8,
    pub frame_delimiter: u8,
    /// 8 or 16
    pub bit_depth: u32,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            ascii_max: 1000,
            bar_delimiter: b';',
            frame_delimiter: b'\n',
            bit_depth: 16,
        }
    }
}

pub fn create_renderer<W: Write + 'static>(
    format: OutputFormat,
    options: RawOptions,
    out: W,
) -> Box<dyn Renderer> {
    match format {
        OutputFormat::Ascii => Box::new(raw::AsciiRenderer::new(out, options)),
        OutputFormat::Binary => Box::new(raw::BinaryRenderer::new(out, options.bit_depth)),
        OutputFormat::Json => Box::new(json::JsonRenderer::new(out)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_is_normalized_and_clamped() {
        let frame = RenderFrame::from_bars(&[0, 50, 100, 250], 100);
        assert_eq!(frame.bar_count, 4);
        assert_eq!(frame.bars, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn zero_height_does_not_divide_by_zero() {
        let frame = RenderFrame::from_bars(&[3], 0);
        assert_eq!(frame.bars, vec![1.0]);
    }

    #[test]
    fn raw_formats() {
        assert!(OutputFormat::Ascii.is_raw());
        assert!(OutputFormat::Binary.is_raw());
        assert!(!OutputFormat::Json.is_raw());
    }
}
