/// Per-bar memory carried from frame to frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BarMemory {
    pub last: f64,
    pub peak: f64,
    /// Frames since the last rising edge
    pub fall: u32,
    pub memory: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SmoothingState {
    pub bars: Vec<BarMemory>,
}

impl SmoothingState {
    pub fn new(bars: usize) -> Self {
        Self {
            bars: vec![BarMemory::default(); bars],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothingParams {
    /// User gravity, 1.0 = normal falloff, 0 disables
    pub gravity: f64,
    /// Integral decay in [0, 1), 0 disables
    pub integral: f64,
    pub height: u32,
    pub framerate: u32,
    /// Raw output keeps zero bars at zero
    pub raw: bool,
}

/// Falloff acceleration scaled to the display height and frame rate.
pub fn gravity_constant(gravity: f64, height: u32, framerate: u32) -> f64 {
    let height = f64::from(height.max(1));
    let fps = f64::from(framerate.max(1));
    gravity * height.log10() * 0.05 * (60.0 / fps).powf(2.5)
}

pub struct TemporalSmoother {
    params: SmoothingParams,
    gravity: f64,
    state: SmoothingState,
}

impl TemporalSmoother {
    pub fn new(params: SmoothingParams, bars: usize) -> Self {
        Self {
            gravity: gravity_constant(params.gravity, params.height, params.framerate),
            params,
            state: SmoothingState::new(bars),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &SmoothingState {
        &self.state
    }

    pub fn reset(&mut self, bars: usize) {
        self.state = SmoothingState::new(bars);
    }

    /// Apply gravity, then integral smoothing, then the display floor.
    pub fn apply(&mut self, mut bars: Vec<i32>) -> Vec<i32> {
        if self.state.bars.len() != bars.len() {
            self.reset(bars.len());
        }
        let g = self.gravity;
        let c = self.params.integral;
        let height = f64::from(self.params.height);

        for (bar, mem) in bars.iter_mut().zip(self.state.bars.iter_mut()) {
            let mut v = f64::from(*bar);

            if g > 0.0 {
                if v < mem.last {
                    let fall = f64::from(mem.fall);
                    v = (mem.peak - g * fall * fall).max(0.0);
                    mem.fall += 1;
                } else {
                    mem.peak = v;
                    mem.fall = 0;
                }
                mem.last = v;
            }

            if c > 0.0 {
                v += mem.memory * c;
                let div = 1.0 / ((height - v).max(0.0) + 1.0);
                mem.memory = v * (1.0 - div / 20.0);
            }

            *bar = v.min(i32::MAX as f64) as i32;
            if !self.params.raw && *bar < 1 {
                *bar = 1;
            }
        }
        bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smoother(gravity: f64, integral: f64, raw: bool) -> TemporalSmoother {
        TemporalSmoother::new(
            SmoothingParams {
                gravity,
                integral,
                height: 100,
                framerate: 60,
                raw,
            },
            1,
        )
    }

    #[test]
    fn gravity_constant_scales_with_height_and_fps() {
        assert!((gravity_constant(1.0, 100, 60) - 0.1).abs() < 1e-12);
        assert!((gravity_constant(2.0, 100, 60) - 0.2).abs() < 1e-12);
        assert!(gravity_constant(1.0, 100, 30) > gravity_constant(1.0, 100, 60));
        assert_eq!(gravity_constant(1.0, 1, 60), 0.0);
    }

    #[test]
    fn falling_bars_decelerate_quadratically() {
        // height 100 at 60 fps gives g = 0.1; scale the user value to g = 1
        let mut s = smoother(10.0, 0.0, true);
        let out: Vec<i32> = [100, 0, 0, 0, 0]
            .into_iter()
            .map(|v| s.apply(vec![v])[0])
            .collect();
        assert_eq!(out, vec![100, 100, 99, 96, 91]);
        assert_eq!(s.state().bars[0].fall, 4);
        assert_eq!(s.state().bars[0].peak, 100.0);
    }

    #[test]
    fn rising_edge_resets_fall() {
        let mut s = smoother(10.0, 0.0, true);
        for v in [100, 0, 0, 0] {
            s.apply(vec![v]);
        }
        assert_eq!(s.apply(vec![98]), vec![98]);
        let mem = &s.state().bars[0];
        assert_eq!((mem.peak, mem.fall), (98.0, 0));
    }

    #[test]
    fn gravity_never_goes_negative() {
        let mut s = smoother(1000.0, 0.0, true);
        s.apply(vec![10]);
        for _ in 0..10 {
            assert!(s.apply(vec![0])[0] >= 0);
        }
        assert_eq!(s.apply(vec![0]), vec![0]);
    }

    #[test]
    fn integral_accumulates_below_the_geometric_limit() {
        let mut s = smoother(0.0, 0.5, true);
        assert_eq!(s.apply(vec![10]), vec![10]);
        let mut previous = 10;
        for _ in 0..50 {
            let v = s.apply(vec![10])[0];
            assert!(v >= previous);
            assert!(v <= 20);
            previous = v;
        }
        assert!(previous >= 19);
    }

    #[test]
    fn integral_memory_shrinks_near_full_height() {
        let mut s = smoother(0.0, 0.5, true);
        s.apply(vec![100]);
        // div = 1 at full height, so memory keeps 95%
        assert!((s.state().bars[0].memory - 95.0).abs() < 1e-9);
    }

    #[test]
    fn floor_applies_outside_raw_mode() {
        let mut s = smoother(0.0, 0.0, false);
        assert_eq!(s.apply(vec![0]), vec![1]);
        let mut s = smoother(0.0, 0.0, true);
        assert_eq!(s.apply(vec![0]), vec![0]);
    }

    #[test]
    fn bar_count_change_resets_state() {
        let mut s = smoother(10.0, 0.5, true);
        s.apply(vec![50]);
        s.apply(vec![40, 30]);
        assert_eq!(s.state().bars.len(), 2);
        assert_eq!(s.state().bars[0].peak, 40.0);
    }
}
