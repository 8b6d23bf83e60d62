use std::io::Write;

use super::{RawOptions, RenderFrame, Renderer};
use crate::error::VisResult;

/// Bars scaled to `0..=ascii_max`, each followed by the bar delimiter, frames
/// ended by the frame delimiter.
pub struct AsciiRenderer<W: Write> {
    out: W,
    options: RawOptions,
    line: Vec<u8>,
}

impl<W: Write> AsciiRenderer<W> {
    pub fn new(out: W, options: RawOptions) -> Self {
        Self {
            out,
            options,
            line: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for AsciiRenderer<W> {
    fn render(&mut self, frame: &RenderFrame) -> VisResult<()> {
        self.line.clear();
        let max = self.options.ascii_max as f32;
        for &bar in &frame.bars {
            write!(self.line, "{}", (bar * max).round() as u32)?;
            self.line.push(self.options.bar_delimiter);
        }
        self.line.push(self.options.frame_delimiter);
        self.out.write_all(&self.line)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Bars as little-endian u16 (or u8 at 8-bit depth) scaled to the full range.
pub struct BinaryRenderer<W: Write> {
    out: W,
    bit_depth: u32,
    buf: Vec<u8>,
}

impl<W: Write> BinaryRenderer<W> {
    pub fn new(out: W, bit_depth: u32) -> Self {
        Self {
            out,
            bit_depth,
            buf: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for BinaryRenderer<W> {
    fn render(&mut self, frame: &RenderFrame) -> VisResult<()> {
        self.buf.clear();
        for &bar in &frame.bars {
            if self.bit_depth == 8 {
                self.buf.push((bar * f32::from(u8::MAX)).round() as u8);
            } else {
                let v = (bar * f32::from(u16::MAX)).round() as u16;
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        self.out.write_all(&self.buf)?;
        self.out.flush()?;
        Ok(())
    }
}
