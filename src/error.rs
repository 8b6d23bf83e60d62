//! Fatal errors surfaced by the analysis core.

use std::time::Duration;

use thiserror::Error;

use crate::analysis::Band;

#[derive(Error, Debug)]
pub enum VisError {
    /// Band transforms need a power-of-two length of at least two samples
    #[error("Invalid transform size {0}: must be a power of two and at least 2")]
    InvalidTransformSize(usize),

    #[error("Invalid cutoff frequencies: lower={lower}Hz, upper={upper}Hz (need 0 < lower < upper)")]
    InvalidCutoffs { lower: f64, upper: f64 },

    #[error("Upper cutoff frequency {upper}Hz can't be higher than sample rate / 2 ({nyquist}Hz)")]
    CutoffAboveNyquist { upper: f64, nyquist: f64 },

    #[error("Band cutoffs must satisfy 0 < bass ({bass}Hz) < treble ({treble}Hz)")]
    InvalidBandCutoffs { bass: f64, treble: f64 },

    #[error("Bar count must be at least 1")]
    NoBars,

    /// Too many bars for the resolution of one band's spectrum
    #[error("Bar {bar} needs bin {bin} but the {band:?} spectrum ends at bin {last}; lower the bar count")]
    LayoutOverflow {
        bar: usize,
        band: Band,
        bin: usize,
        last: usize,
    },

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Could not get rate and/or format within {0:?}, problems with audio thread?")]
    CaptureTimeout(Duration),

    #[error("Audio thread exited unexpectedly: {0}")]
    CaptureFailed(String),

    #[error("Failed to write frame: {0}")]
    Render(#[from] std::io::Error),

    #[error("Test mode: {0}")]
    Expectation(String),
}

pub type VisResult<T> = Result<T, VisError>;
