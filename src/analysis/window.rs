use super::{Band, BandSizes};
use crate::audio::stream::RawBuffers;

/// Copies the newest samples for each band out of the shared history and
/// applies a Hann window to them.
///
/// Buffers are indexed `[band][channel][sample]` and allocated once.
pub struct BandWindower {
    sizes: BandSizes,
    windows: [Vec<f64>; 3],
    raw: [Vec<Vec<f64>>; 3],
    windowed: [Vec<Vec<f64>>; 3],
}

impl BandWindower {
    pub fn new(sizes: BandSizes, channels: usize) -> Self {
        let alloc = |band: Band| vec![vec![0.0; sizes.get(band)]; channels];
        Self {
            sizes,
            windows: Band::ALL.map(|band| hann_window(sizes.get(band))),
            raw: Band::ALL.map(alloc),
            windowed: Band::ALL.map(alloc),
        }
    }

    pub fn sizes(&self) -> BandSizes {
        self.sizes
    }

    pub fn channels(&self) -> usize {
        self.raw[0].len()
    }

    /// Copy the newest samples of every band. Call with the buffer lock held.
    pub fn copy_from(&mut self, source: &RawBuffers) {
        for band in Band::ALL {
            let size = self.sizes.get(band);
            for (channel, dest) in self.raw[band.index()].iter_mut().enumerate() {
                // Short histories leave the oldest slots at zero
                let start = size.saturating_sub(source.capacity().min(size));
                dest[..start].fill(0.0);
                for (slot, sample) in dest[start..].iter_mut().zip(source.latest(channel, size)) {
                    *slot = f64::from(sample);
                }
            }
        }
    }

    /// Silence means every raw bass sample of every channel is exactly zero.
    pub fn is_silent(&self) -> bool {
        self.raw[Band::Bass.index()]
            .iter()
            .all(|channel| channel.iter().all(|&s| s == 0.0))
    }

    /// Refresh the windowed buffers from the raw copies.
    pub fn apply(&mut self) {
        for band in Band::ALL {
            let i = band.index();
            let window = &self.windows[i];
            for (raw, out) in self.raw[i].iter().zip(self.windowed[i].iter_mut()) {
                for ((o, &s), &w) in out.iter_mut().zip(raw.iter()).zip(window.iter()) {
                    *o = s * w;
                }
            }
        }
    }

    /// Windowed input for one band, one buffer per channel. The transform may
    /// use these as scratch.
    pub fn windowed_mut(&mut self, band: Band) -> &mut [Vec<f64>] {
        &mut self.windowed[band.index()]
    }
}

/// Hann window; sizes below 2 have no defined window and get unit weights.
pub fn hann_window(size: usize) -> Vec<f64> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (size - 1) as f64).cos()))
        .collect()
}
