use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use super::window::BandWindower;
use super::{Band, BandSizes};
use crate::error::{VisError, VisResult};

/// Per band and channel, `size / 2 + 1` complex bins from the latest frame.
pub struct Spectra {
    bins: [Vec<Vec<Complex<f64>>>; 3],
}

impl Spectra {
    pub fn bins(&self, band: Band, channel: usize) -> &[Complex<f64>] {
        &self.bins[band.index()][channel]
    }
}

/// Forward real-to-complex transforms for the three bands.
///
/// Plans and scratch space are created once; planning is far too slow to redo
/// per frame. One plan per band serves every channel.
pub struct SpectralEngine {
    plans: [Arc<dyn RealToComplex<f64>>; 3],
    scratch: [Vec<Complex<f64>>; 3],
    spectra: Spectra,
}

impl SpectralEngine {
    pub fn new(sizes: BandSizes, channels: usize) -> VisResult<Self> {
        let mut planner = RealFftPlanner::<f64>::new();
        let mut plans = Vec::with_capacity(3);
        for band in Band::ALL {
            let size = sizes.get(band);
            if size < 2 || !size.is_power_of_two() {
                return Err(VisError::InvalidTransformSize(size));
            }
            plans.push(planner.plan_fft_forward(size));
        }
        let plans: [Arc<dyn RealToComplex<f64>>; 3] = [
            Arc::clone(&plans[0]),
            Arc::clone(&plans[1]),
            Arc::clone(&plans[2]),
        ];

        let scratch = plans.clone().map(|plan| plan.make_scratch_vec());
        let bins = plans.clone().map(|plan| vec![plan.make_output_vec(); channels]);

        log::debug!(
            "Planned transforms: bass={}, mid={}, treble={}",
            sizes.get(Band::Bass),
            sizes.get(Band::Mid),
            sizes.get(Band::Treble)
        );

        Ok(Self {
            plans,
            scratch,
            spectra: Spectra { bins },
        })
    }

    /// Transform every band and channel of the windowed input. The input
    /// buffers are consumed as scratch.
    pub fn process(&mut self, input: &mut BandWindower) -> VisResult<&Spectra> {
        for band in Band::ALL {
            let i = band.index();
            let plan = &self.plans[i];
            let outputs = &mut self.spectra.bins[i];
            for (samples, output) in input.windowed_mut(band).iter_mut().zip(outputs.iter_mut()) {
                plan.process_with_scratch(samples, output, &mut self.scratch[i])
                    .map_err(|e| VisError::Transform(e.to_string()))?;
            }
        }
        Ok(&self.spectra)
    }

    pub fn spectra(&self) -> &Spectra {
        &self.spectra
    }
}
