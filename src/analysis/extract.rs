use super::layout::BarLayout;
use super::spectrum::Spectra;

/// Samples are normalized to [-1, 1]; the EQ constant is calibrated for 16-bit
/// PCM amplitudes, so magnitudes are brought back to that scale.
pub const PCM_FULL_SCALE: f64 = 32768.0;

/// Reduce one channel's spectra to one magnitude per bar.
///
/// Each bar averages `hypot(re, im)` over its bin range, then gets
/// `sensitivity * eq`. Values at or below `noise_floor` become zero.
pub fn extract_bars(
    layout: &BarLayout,
    spectra: &Spectra,
    channel: usize,
    sensitivity: f64,
    noise_floor: f64,
) -> Vec<i32> {
    layout
        .bars
        .iter()
        .map(|bar| {
            let bins = &spectra.bins(bar.band, channel)[bar.lower_bin..=bar.upper_bin];
            let sum: f64 = bins.iter().map(|c| c.re.hypot(c.im)).sum();
            let value = sum / bar.width() as f64 * PCM_FULL_SCALE * sensitivity * bar.eq;
            if value <= noise_floor || !value.is_finite() {
                0
            } else {
                value.min(i32::MAX as f64) as i32
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::layout::LayoutParams;
    use crate::analysis::spectrum::SpectralEngine;
    use crate::analysis::window::BandWindower;
    use crate::analysis::BandSizes;
    use crate::audio::stream::{ChannelMerge, SharedAudio};

    fn setup(samples: &[f32]) -> (BarLayout, SpectralEngine, BandWindower) {
        let sizes = BandSizes::new(1024).unwrap();
        let layout = BarLayout::compute(&LayoutParams {
            bars: 10,
            lower_cutoff: 50.0,
            upper_cutoff: 10000.0,
            bass_cutoff: 150.0,
            treble_cutoff: 2500.0,
            sample_rate: 44100,
            sizes,
            height: 100,
            eq: Vec::new(),
        })
        .unwrap();
        let shared = SharedAudio::new(ChannelMerge::Average, sizes.largest());
        shared.write_interleaved(samples, 1);
        let mut windower = BandWindower::new(sizes, 1);
        windower.copy_from(&shared.lock_buffers());
        windower.apply();
        let mut engine = SpectralEngine::new(sizes, 1).unwrap();
        engine.process(&mut windower).unwrap();
        (layout, engine, windower)
    }

    fn noise(len: usize) -> Vec<f32> {
        // Deterministic pseudo-random samples in [-1, 1]
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 23) as f32 - 1.0
            })
            .collect()
    }

    #[test]
    fn never_negative() {
        let (layout, engine, _) = setup(&noise(4096));
        for sensitivity in [0.0, 1e-3, 1.0, 1e6] {
            let bars = extract_bars(&layout, engine.spectra(), 0, sensitivity, 0.0);
            assert_eq!(bars.len(), 10);
            assert!(bars.iter().all(|&b| b >= 0));
        }
    }

    #[test]
    fn noise_floor_zeroes_quiet_bars() {
        let (layout, engine, _) = setup(&noise(4096));
        let loud = extract_bars(&layout, engine.spectra(), 0, 1.0, 0.0);
        let floor = *loud.iter().max().unwrap() as f64;
        let gated = extract_bars(&layout, engine.spectra(), 0, 1.0, floor);
        assert!(gated.iter().all(|&b| b == 0));
    }

    #[test]
    fn silence_extracts_to_zero() {
        let (layout, engine, _) = setup(&[0.0; 4096]);
        let bars = extract_bars(&layout, engine.spectra(), 0, 1.0, 0.0);
        assert_eq!(bars, vec![0; 10]);
    }

    #[test]
    fn scales_with_sensitivity() {
        let (layout, engine, _) = setup(&noise(4096));
        let one = extract_bars(&layout, engine.spectra(), 0, 1.0, 0.0);
        let ten = extract_bars(&layout, engine.spectra(), 0, 10.0, 0.0);
        for (a, b) in one.iter().zip(ten.iter()) {
            assert!(*b >= *a);
        }
        assert!(ten.iter().sum::<i32>() > one.iter().sum::<i32>());
    }
}
