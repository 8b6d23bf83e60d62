use std::io::Write;

use super::{RenderFrame, Renderer};
use crate::error::VisResult;

/// One `RenderFrame` object per line.
pub struct JsonRenderer<W: Write> {
    out: W,
}

impl<W: Write> JsonRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for JsonRenderer<W> {
    fn render(&mut self, frame: &RenderFrame) -> VisResult<()> {
        serde_json::to_writer(&mut self.out, frame).map_err(std::io::Error::from)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_object_per_line() {
        let mut r = JsonRenderer::new(Vec::new());
        r.render(&RenderFrame::from_bars(&[0, 50], 100)).unwrap();
        r.render(&RenderFrame::from_bars(&[100], 100)).unwrap();
        let text = String::from_utf8(r.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["bar_count"], 2);
        assert_eq!(lines[0]["bars"][1], 0.5);
        assert_eq!(lines[1]["bars"][0], 1.0);
    }
}
