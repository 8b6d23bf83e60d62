//! Mapping from output bars to spectrum bins.
//!
//! Bar edges are spaced logarithmically between the lower and upper cutoff.
//! Each edge picks the band whose transform resolves it best (long transforms
//! for bass, short ones for treble) and is converted to a bin of that band's
//! spectrum. Where the log curve packs several edges into one bin, later edges
//! are pushed up so that every bar owns at least one bin of its own.

use super::{Band, BandSizes};
use crate::error::{VisError, VisResult};

/// 2^28: the raw transform output is enormous; this brings it down to bar heights
const EQ_NORMALIZATION: f64 = 268_435_456.0;

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutParams {
    /// Bars per channel
    pub bars: usize,
    pub lower_cutoff: f64,
    pub upper_cutoff: f64,
    /// Edges below this go to the bass transform
    pub bass_cutoff: f64,
    /// Edges at or above this go to the treble transform
    pub treble_cutoff: f64,
    pub sample_rate: u32,
    pub sizes: BandSizes,
    pub height: u32,
    /// Optional user gain curve, resampled onto the bars
    pub eq: Vec<f64>,
}

/// One bar's share of the spectrum.
#[derive(Clone, Debug, PartialEq)]
pub struct BarSpan {
    pub band: Band,
    pub lower_bin: usize,
    /// Inclusive
    pub upper_bin: usize,
    /// Geometric mean of the bar's edges, for axis labels
    pub center_frequency: f64,
    pub eq: f64,
}

impl BarSpan {
    pub fn width(&self) -> usize {
        self.upper_bin - self.lower_bin + 1
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BarLayout {
    pub bars: Vec<BarSpan>,
    /// The `bars + 1` edge frequencies after correction
    pub cutoffs: Vec<f64>,
}

impl BarLayout {
    pub fn compute(params: &LayoutParams) -> VisResult<Self> {
        let n = params.bars;
        if n < 1 {
            return Err(VisError::NoBars);
        }
        let (lower, upper) = (params.lower_cutoff, params.upper_cutoff);
        if !(lower > 0.0 && lower < upper) {
            return Err(VisError::InvalidCutoffs { lower, upper });
        }
        if !(params.bass_cutoff > 0.0 && params.bass_cutoff < params.treble_cutoff) {
            return Err(VisError::InvalidBandCutoffs {
                bass: params.bass_cutoff,
                treble: params.treble_cutoff,
            });
        }
        let nyquist = params.sample_rate as f64 / 2.0;
        if upper > nyquist {
            return Err(VisError::CutoffAboveNyquist { upper, nyquist });
        }

        let sizes = params.sizes;
        let classify = |f: f64| {
            if f < params.bass_cutoff {
                Band::Bass
            } else if f < params.treble_cutoff {
                Band::Mid
            } else {
                Band::Treble
            }
        };
        let to_bin = |f: f64, band: Band| (f / nyquist * (sizes.get(band) / 2) as f64).round() as usize;

        let k = (lower / upper).log10() / (1.0 / (n as f64 + 1.0) - 1.0);
        let height_scale = params.height as f64 / EQ_NORMALIZATION;
        let bass_log = (sizes.get(Band::Bass) as f64).log2();

        let mut freqs: Vec<f64> = Vec::with_capacity(n + 1);
        let mut bands = Vec::with_capacity(n + 1);
        let mut lower_bins: Vec<usize> = Vec::with_capacity(n + 1);
        let mut upper_bins = vec![0usize; n];
        let mut eq = Vec::with_capacity(n + 1);

        for i in 0..=n {
            let mut f = upper * 10f64.powf((i as f64 + 1.0) / (n as f64 + 1.0) * k - k);
            if i >= 2 && f <= freqs[i - 1] && freqs[i - 1] > params.bass_cutoff {
                f = freqs[i - 1] + (freqs[i - 1] - freqs[i - 2]);
            }

            let band = classify(f);
            let size = sizes.get(band);
            eq.push(
                f * height_scale * user_gain(&params.eq, i, n) / bass_log * (size as f64).log2(),
            );

            let mut bin = to_bin(f, band);
            if i > 0 {
                let prev_band = bands[i - 1];
                if band == prev_band {
                    if bin <= lower_bins[i - 1] {
                        bin = lower_bins[i - 1] + 1;
                        f = bin as f64 / (size / 2) as f64 * nyquist;
                    }
                    upper_bins[i - 1] = bin - 1;
                } else {
                    // Close the previous bar inside its own band's spectrum
                    let last = sizes.get(prev_band) / 2;
                    upper_bins[i - 1] = to_bin(f, prev_band).min(last).max(lower_bins[i - 1]);
                }
            }

            freqs.push(f);
            bands.push(band);
            lower_bins.push(bin);
        }

        let bars = (0..n)
            .map(|i| BarSpan {
                band: bands[i],
                lower_bin: lower_bins[i],
                upper_bin: upper_bins[i],
                center_frequency: (freqs[i] * freqs[i + 1]).sqrt(),
                eq: eq[i],
            })
            .collect::<Vec<_>>();

        for (i, bar) in bars.iter().enumerate() {
            let last = sizes.get(bar.band) / 2;
            if bar.upper_bin > last {
                return Err(VisError::LayoutOverflow {
                    bar: i,
                    band: bar.band,
                    bin: bar.upper_bin,
                    last,
                });
            }
        }

        Ok(Self {
            bars,
            cutoffs: freqs,
        })
    }

    /// Like `compute`, but lowers the bar count until the layout fits every
    /// band's spectrum. Other configuration errors are returned unchanged.
    pub fn compute_fitting(params: &LayoutParams) -> VisResult<Self> {
        let mut params = params.clone();
        loop {
            match Self::compute(&params) {
                Err(VisError::LayoutOverflow { .. }) if params.bars > 1 => params.bars -= 1,
                result => return result,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Bars in each band, bass/mid/treble order
    pub fn band_counts(&self) -> [usize; 3] {
        let mut counts = [0; 3];
        for bar in &self.bars {
            counts[bar.band.index()] += 1;
        }
        counts
    }

    pub fn log_table(&self) {
        for (i, bar) in self.bars.iter().enumerate() {
            log::debug!(
                "bar {:4}: {:?} f:{:.1}->{:.1} center {:.1}Hz bins {}..={} eq {:e}",
                i,
                bar.band,
                self.cutoffs[i],
                self.cutoffs[i + 1],
                bar.center_frequency,
                bar.lower_bin,
                bar.upper_bin,
                bar.eq
            );
        }
    }
}

/// Nearest-lower lookup of the user curve for edge `i` of `n` bars.
fn user_gain(curve: &[f64], i: usize, n: usize) -> f64 {
    if curve.is_empty() {
        return 1.0;
    }
    let idx = (i as f64 * curve.len() as f64 / n as f64).floor() as usize;
    curve[idx.min(curve.len() - 1)]
}
