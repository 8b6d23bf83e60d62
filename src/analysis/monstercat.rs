/// Inter-bar smoothing that lets strong bars lift their neighbours.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Monstercat {
    Off,
    /// Each bar is damped by 1.25 and spreads `value - distance^2`
    Waves,
    /// Each bar spreads `value / decay^distance`; the factor must exceed 1
    Decay(f64),
}

impl Monstercat {
    /// Spread energy across the whole frame.
    ///
    /// The outer pass runs left to right over the live array, so a bar raised
    /// by an earlier neighbour spreads its raised value in turn.
    pub fn apply(self, mut bars: Vec<i32>) -> Vec<i32> {
        let n = bars.len();
        match self {
            Monstercat::Off => {}
            Monstercat::Waves => {
                for z in 0..n {
                    bars[z] = (bars[z] as f64 / 1.25) as i32;
                    let source = bars[z] as f64;
                    for m in (0..n).filter(|&m| m != z) {
                        let d = z.abs_diff(m) as f64;
                        raise(&mut bars[m], source - d * d);
                    }
                }
            }
            Monstercat::Decay(decay) => {
                for z in 0..n {
                    let source = bars[z] as f64;
                    for m in (0..n).filter(|&m| m != z) {
                        let d = z.abs_diff(m) as i32;
                        raise(&mut bars[m], source / decay.powi(d));
                    }
                }
            }
        }
        bars
    }
}

fn raise(bar: &mut i32, candidate: f64) {
    if candidate > *bar as f64 {
        *bar = candidate as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(len: usize, at: usize, value: i32) -> Vec<i32> {
        let mut bars = vec![0; len];
        bars[at] = value;
        bars
    }

    #[test]
    fn off_is_identity() {
        let bars = vec![3, 0, 9, 1];
        assert_eq!(Monstercat::Off.apply(bars.clone()), bars);
    }

    #[test]
    fn waves_spread_quadratically() {
        let out = Monstercat::Waves.apply(single(11, 5, 100));
        // The peak is damped once, then spreads V - d^2 to the left ...
        for m in 0..=5 {
            let d = (5 - m) as i32;
            assert_eq!(out[m], 80 - d * d, "bar {}", m);
        }
        // ... and the right side is damped again when the pass reaches it
        for m in 6..11 {
            let d = (m - 5) as f64;
            assert_eq!(out[m], ((80.0 - d * d) / 1.25) as i32, "bar {}", m);
        }
    }

    #[test]
    fn waves_never_go_negative() {
        let out = Monstercat::Waves.apply(single(40, 0, 10));
        assert!(out.iter().all(|&b| b >= 0));
        assert_eq!(out[39], 0);
    }

    #[test]
    fn decay_spreads_geometrically_and_symmetrically() {
        let out = Monstercat::Decay(2.0).apply(single(5, 2, 100));
        assert_eq!(out, vec![25, 50, 100, 50, 25]);
    }

    #[test]
    fn later_bars_raise_earlier_ones() {
        let out = Monstercat::Decay(2.0).apply(vec![0, 0, 10, 100]);
        assert_eq!(out, vec![12, 25, 50, 100]);
    }
}
