/// Sensitivity never drops below this, so repeated overshoot cannot reach zero.
pub const MIN_SENSITIVITY: f64 = 1e-6;

const LOWER: f64 = 0.98;
const RAISE: f64 = 1.001;
const STARTUP_RAISE: f64 = 1.1;

/// Keeps bars inside the display by nudging the global sensitivity.
#[derive(Clone, Debug, PartialEq)]
pub struct AutoSensController {
    enabled: bool,
    sensitivity: f64,
    /// Set until the first overshoot; grows sensitivity quickly at start-up
    startup: bool,
    lowered: bool,
}

impl AutoSensController {
    pub fn new(sensitivity: f64, enabled: bool) -> Self {
        Self {
            enabled,
            sensitivity: sensitivity.max(MIN_SENSITIVITY),
            startup: true,
            lowered: false,
        }
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    /// Whether the most recent frame overshot the display.
    pub fn lowered(&self) -> bool {
        self.lowered
    }

    pub fn update(&mut self, bars: &[i32], height: u32, silent: bool) {
        if !self.enabled || silent {
            return;
        }
        let height = i64::from(height);
        self.lowered = bars.iter().any(|&b| i64::from(b) > height);
        if self.lowered {
            self.sensitivity *= LOWER;
            self.startup = false;
        } else {
            self.sensitivity *= RAISE;
            if self.startup {
                self.sensitivity *= STARTUP_RAISE;
            }
        }
        self.sensitivity = self.sensitivity.max(MIN_SENSITIVITY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overshoot_lowers_sensitivity_towards_floor() {
        let mut auto = AutoSensController::new(1.0, true);
        let bars = vec![101; 8];
        let mut previous = auto.sensitivity();
        for _ in 0..100 {
            auto.update(&bars, 100, false);
            assert!(auto.sensitivity() < previous);
            assert!(auto.sensitivity() > 0.0);
            previous = auto.sensitivity();
        }
        for _ in 0..5000 {
            auto.update(&bars, 100, false);
        }
        assert_eq!(auto.sensitivity(), MIN_SENSITIVITY);
    }

    #[test]
    fn one_overshoot_lowers_once_per_frame() {
        let mut auto = AutoSensController::new(1.0, true);
        auto.update(&[200, 300, 400], 100, false);
        assert!((auto.sensitivity() - 0.98).abs() < 1e-12);
        assert!(auto.lowered());
    }

    #[test]
    fn startup_boost_stops_after_first_overshoot() {
        let mut auto = AutoSensController::new(1.0, true);
        auto.update(&[10], 100, false);
        assert!((auto.sensitivity() - 1.001 * 1.1).abs() < 1e-12);

        auto.update(&[101], 100, false);
        let after = auto.sensitivity();
        auto.update(&[10], 100, false);
        assert!((auto.sensitivity() - after * 1.001).abs() < 1e-12);
        assert!(!auto.lowered());
    }

    #[test]
    fn silent_or_disabled_frames_are_ignored() {
        let mut auto = AutoSensController::new(1.0, true);
        auto.update(&[500], 100, true);
        assert_eq!(auto.sensitivity(), 1.0);

        let mut off = AutoSensController::new(2.0, false);
        off.update(&[500], 100, false);
        assert_eq!(off.sensitivity(), 2.0);
    }
}
