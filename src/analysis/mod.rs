pub mod autosens;
pub mod extract;
pub mod layout;
pub mod monstercat;
pub mod pipeline;
pub mod smoothing;
pub mod spectrum;
pub mod window;

use crate::error::{VisError, VisResult};

/// Hard cap on the number of output bars.
pub const MAX_BARS: usize = 1024;

/// One of the three frequency regions, each analyzed with its own transform length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Band {
    Bass,
    Mid,
    Treble,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::Bass, Band::Mid, Band::Treble];

    pub fn index(self) -> usize {
        match self {
            Band::Bass => 0,
            Band::Mid => 1,
            Band::Treble => 2,
        }
    }
}

/// Transform lengths for the three bands: bass = 4x treble, mid = 2x treble.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandSizes {
    treble: usize,
}

impl BandSizes {
    pub fn new(treble: usize) -> VisResult<Self> {
        if treble < 2 || !treble.is_power_of_two() {
            return Err(VisError::InvalidTransformSize(treble));
        }
        Ok(Self { treble })
    }

    pub fn get(&self, band: Band) -> usize {
        match band {
            Band::Bass => self.treble * 4,
            Band::Mid => self.treble * 2,
            Band::Treble => self.treble,
        }
    }

    /// Longest transform; the raw sample history must hold at least this many samples.
    pub fn largest(&self) -> usize {
        self.get(Band::Bass)
    }
}

impl Default for BandSizes {
    fn default() -> Self {
        Self { treble: 1024 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_sizes_scale_from_treble() {
        let sizes = BandSizes::new(1024).unwrap();
        assert_eq!(sizes.get(Band::Bass), 4096);
        assert_eq!(sizes.get(Band::Mid), 2048);
        assert_eq!(sizes.get(Band::Treble), 1024);
        assert_eq!(sizes.largest(), 4096);
    }

    #[test]
    fn rejects_bad_transform_sizes() {
        assert!(BandSizes::new(0).is_err());
        assert!(BandSizes::new(1).is_err());
        assert!(BandSizes::new(1000).is_err());
        assert!(BandSizes::new(2).is_ok());
    }
}
