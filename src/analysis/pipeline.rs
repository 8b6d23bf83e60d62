//! Per-frame sequencing of the analysis stages.
//!
//! Each tick copies the newest samples out of the shared history, decides
//! whether the input has been silent long enough to sleep, and otherwise runs
//! window, transform, extraction, monstercat, mirroring, temporal smoothing and
//! autosens in that order.

use std::sync::Arc;

use super::autosens::AutoSensController;
use super::extract::extract_bars;
use super::layout::{BarLayout, LayoutParams};
use super::monstercat::Monstercat;
use super::smoothing::{SmoothingParams, TemporalSmoother};
#[cfg(test)]
use super::smoothing::SmoothingState;
use super::spectrum::SpectralEngine;
use super::window::BandWindower;
use super::BandSizes;
use crate::audio::stream::{CaptureState, SharedAudio};
use crate::error::{VisError, VisResult};

/// Everything the pipeline needs, already validated and clamped.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    /// Output bars across all channels
    pub bars: usize,
    pub lower_cutoff: f64,
    pub upper_cutoff: f64,
    pub bass_cutoff: f64,
    pub treble_cutoff: f64,
    pub sizes: BandSizes,
    pub height: u32,
    pub eq: Vec<f64>,
    pub sensitivity: f64,
    pub autosens: bool,
    pub noise_floor: f64,
    pub monstercat: Monstercat,
    pub gravity: f64,
    pub integral: f64,
    pub framerate: u32,
    /// Seconds of silence before sleeping; 0 never sleeps
    pub silence_timeout: u32,
    pub reverse: bool,
    /// Raw output keeps empty bars at zero instead of one
    pub raw_output: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            bars: 64,
            lower_cutoff: 50.0,
            upper_cutoff: 10000.0,
            bass_cutoff: 150.0,
            treble_cutoff: 2500.0,
            sizes: BandSizes::default(),
            height: 1000,
            eq: Vec::new(),
            sensitivity: 1.0,
            autosens: true,
            noise_floor: 0.0,
            monstercat: Monstercat::Off,
            gravity: 1.0,
            integral: 0.77,
            framerate: 60,
            silence_timeout: 0,
            reverse: false,
            raw_output: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestratorState {
    Running,
    Sleeping,
    /// Layout and smoothing state are rebuilt on the next tick
    LayoutReset,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Tick {
    Frame(Vec<i32>),
    /// Input has been silent past the timeout; poll again later
    Sleeping,
    /// A finite source reached its end
    Finished,
}

pub struct FrameOrchestrator {
    shared: Arc<SharedAudio>,
    sample_rate: u32,
    settings: PipelineSettings,
    channels: usize,
    layout: BarLayout,
    windower: BandWindower,
    engine: SpectralEngine,
    smoother: TemporalSmoother,
    autosens: AutoSensController,
    state: OrchestratorState,
    silent_ticks: u64,
}

impl FrameOrchestrator {
    pub fn new(settings: PipelineSettings, shared: Arc<SharedAudio>, sample_rate: u32) -> VisResult<Self> {
        let channels = shared.merge().analysis_channels();
        let layout = build_layout(&settings, channels, sample_rate)?;
        let windower = BandWindower::new(settings.sizes, channels);
        let engine = SpectralEngine::new(settings.sizes, channels)?;
        let smoother = TemporalSmoother::new(smoothing_params(&settings), layout.len() * channels);
        let autosens = AutoSensController::new(settings.sensitivity, settings.autosens);

        log::info!(
            "Layout: {} bars x {} channel(s), bass/mid/treble = {:?}, {} Hz",
            layout.len(),
            channels,
            layout.band_counts(),
            sample_rate
        );

        Ok(Self {
            shared,
            sample_rate,
            settings,
            channels,
            layout,
            windower,
            engine,
            smoother,
            autosens,
            state: OrchestratorState::Running,
            silent_ticks: 0,
        })
    }

    #[cfg(test)]
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    #[cfg(test)]
    pub fn layout(&self) -> &BarLayout {
        &self.layout
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    #[cfg(test)]
    pub fn smoothing(&self) -> &SmoothingState {
        self.smoother.state()
    }

    #[cfg(test)]
    pub fn sensitivity(&self) -> f64 {
        self.autosens.sensitivity()
    }

    /// Rebuild the layout before the next frame, e.g. after a resize.
    pub fn request_layout_reset(&mut self) {
        self.state = OrchestratorState::LayoutReset;
    }

    /// Swap in new settings; takes effect on the next tick. Settings whose
    /// layout cannot be built are refused and the current ones stay.
    pub fn reconfigure(&mut self, settings: PipelineSettings) -> VisResult<()> {
        BarLayout::compute_fitting(&layout_params(&settings, self.channels, self.sample_rate))?;
        if settings.autosens != self.settings.autosens || settings.sensitivity != self.settings.sensitivity {
            self.autosens = AutoSensController::new(settings.sensitivity, settings.autosens);
        }
        self.settings = settings;
        self.request_layout_reset();
        Ok(())
    }

    pub fn tick(&mut self) -> VisResult<Tick> {
        match self.shared.state() {
            CaptureState::Failed(message) => return Err(VisError::CaptureFailed(message)),
            CaptureState::Finished => return Ok(Tick::Finished),
            CaptureState::Starting | CaptureState::Streaming(_) => {}
        }

        if self.state == OrchestratorState::LayoutReset {
            self.rebuild()?;
        }

        let silent = {
            let buffers = self.shared.lock_buffers();
            self.windower.copy_from(&buffers);
            self.windower.is_silent()
        };

        self.silent_ticks = if silent { self.silent_ticks + 1 } else { 0 };
        let limit = u64::from(self.settings.framerate) * u64::from(self.settings.silence_timeout);
        if self.settings.silence_timeout > 0 && self.silent_ticks > limit {
            if self.state != OrchestratorState::Sleeping {
                log::info!("No input for {}s, sleeping", self.settings.silence_timeout);
                self.state = OrchestratorState::Sleeping;
            }
            return Ok(Tick::Sleeping);
        }
        if self.state == OrchestratorState::Sleeping {
            log::info!("Input resumed");
            self.state = OrchestratorState::Running;
        }

        self.windower.apply();
        self.engine.process(&mut self.windower)?;

        let per_channel: Vec<Vec<i32>> = (0..self.channels)
            .map(|channel| {
                let bars = extract_bars(
                    &self.layout,
                    self.engine.spectra(),
                    channel,
                    self.autosens.sensitivity(),
                    self.settings.noise_floor,
                );
                self.settings.monstercat.apply(bars)
            })
            .collect();

        let bars = self.smoother.apply(arrange(per_channel, self.settings.reverse));
        self.autosens.update(&bars, self.settings.height, silent);
        if self.autosens.lowered() {
            log::trace!("Overshoot, sensitivity now {:.4}", self.autosens.sensitivity());
        }
        Ok(Tick::Frame(bars))
    }

    fn rebuild(&mut self) -> VisResult<()> {
        let settings = &self.settings;
        self.layout = build_layout(settings, self.channels, self.sample_rate)?;
        if self.windower.sizes() != settings.sizes {
            self.windower = BandWindower::new(settings.sizes, self.channels);
            self.engine = SpectralEngine::new(settings.sizes, self.channels)?;
        }
        self.smoother = TemporalSmoother::new(smoothing_params(settings), self.layout.len() * self.channels);
        self.state = OrchestratorState::Running;
        log::info!(
            "Layout rebuilt: {} bars x {} channel(s)",
            self.layout.len(),
            self.channels
        );
        Ok(())
    }
}

fn layout_params(settings: &PipelineSettings, channels: usize, sample_rate: u32) -> LayoutParams {
    LayoutParams {
        bars: settings.bars / channels,
        lower_cutoff: settings.lower_cutoff,
        upper_cutoff: settings.upper_cutoff,
        bass_cutoff: settings.bass_cutoff,
        treble_cutoff: settings.treble_cutoff,
        sample_rate,
        sizes: settings.sizes,
        height: settings.height,
        eq: settings.eq.clone(),
    }
}

fn build_layout(settings: &PipelineSettings, channels: usize, sample_rate: u32) -> VisResult<BarLayout> {
    let params = layout_params(settings, channels, sample_rate);
    let layout = BarLayout::compute_fitting(&params)?;
    if layout.len() < params.bars {
        log::warn!(
            "{} bars per channel do not fit the spectrum, using {}",
            params.bars,
            layout.len()
        );
    }
    layout.log_table();
    Ok(layout)
}

fn smoothing_params(settings: &PipelineSettings) -> SmoothingParams {
    SmoothingParams {
        gravity: settings.gravity,
        integral: settings.integral,
        height: settings.height,
        framerate: settings.framerate,
        raw: settings.raw_output,
    }
}

/// Lay channel bars out for display. Stereo puts the left channel mirrored on
/// the left half (lowest frequency in the centre) and the right channel on the
/// right half; `reverse` flips both halves. Mono with `reverse` runs high to low.
pub fn arrange(mut channels: Vec<Vec<i32>>, reverse: bool) -> Vec<i32> {
    if channels.len() == 1 {
        let mut bars = channels.remove(0);
        if reverse {
            bars.reverse();
        }
        return bars;
    }

    let mut right = channels.pop().unwrap_or_default();
    let mut left = channels.pop().unwrap_or_default();
    if reverse {
        right.reverse();
    } else {
        left.reverse();
    }
    left.extend(right);
    left
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::stream::ChannelMerge;

    const RATE: u32 = 44100;

    fn settings() -> PipelineSettings {
        PipelineSettings {
            bars: 10,
            height: 100,
            autosens: false,
            gravity: 0.0,
            integral: 0.0,
            ..PipelineSettings::default()
        }
    }

    fn sine(freq: f64, amplitude: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (amplitude * (2.0 * std::f64::consts::PI * freq * i as f64 / RATE as f64).sin()) as f32)
            .collect()
    }

    fn start(settings: PipelineSettings, merge: ChannelMerge) -> (FrameOrchestrator, Arc<SharedAudio>) {
        let shared = Arc::new(SharedAudio::new(merge, settings.sizes.largest()));
        let orchestrator = FrameOrchestrator::new(settings, Arc::clone(&shared), RATE).unwrap();
        (orchestrator, shared)
    }

    fn frame(tick: Tick) -> Vec<i32> {
        match tick {
            Tick::Frame(bars) => bars,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn sine_lights_the_bar_containing_its_frequency() {
        let raw = PipelineSettings {
            raw_output: true,
            ..settings()
        };
        let (mut orchestrator, shared) = start(raw, ChannelMerge::Average);
        shared.write_interleaved(&sine(1000.0, 0.5, 4096), 1);

        let bars = frame(orchestrator.tick().unwrap());
        assert_eq!(bars.len(), 10);
        assert!(bars[5] > 100, "{:?}", bars);
        for (i, &bar) in bars.iter().enumerate() {
            if i != 5 {
                assert_eq!(bar, 0, "bar {} not silent: {:?}", i, bars);
            }
        }
    }

    #[test]
    fn dense_bar_counts_are_lowered_to_fit() {
        let dense = PipelineSettings {
            bars: 500,
            ..settings()
        };
        let (mut orchestrator, shared) = start(dense, ChannelMerge::Average);
        assert_eq!(orchestrator.layout().len(), 386);
        shared.write_interleaved(&sine(1000.0, 0.5, 4096), 1);
        assert_eq!(frame(orchestrator.tick().unwrap()).len(), 386);

        let (orchestrator, _shared) = start(
            PipelineSettings {
                bars: 1024,
                ..settings()
            },
            ChannelMerge::Independent,
        );
        assert_eq!(orchestrator.layout().len(), 386);
    }

    #[test]
    fn silence_past_timeout_sleeps_without_touching_state() {
        let (mut orchestrator, shared) = start(
            PipelineSettings {
                framerate: 2,
                silence_timeout: 1,
                gravity: 1.0,
                integral: 0.5,
                ..settings()
            },
            ChannelMerge::Average,
        );

        // Two silent frames are within the timeout
        frame(orchestrator.tick().unwrap());
        frame(orchestrator.tick().unwrap());
        let before = orchestrator.smoothing().clone();

        assert_eq!(orchestrator.tick().unwrap(), Tick::Sleeping);
        assert_eq!(orchestrator.tick().unwrap(), Tick::Sleeping);
        assert_eq!(orchestrator.state(), OrchestratorState::Sleeping);
        assert_eq!(orchestrator.smoothing(), &before);

        shared.write_interleaved(&sine(440.0, 0.5, 4096), 1);
        frame(orchestrator.tick().unwrap());
        assert_eq!(orchestrator.state(), OrchestratorState::Running);
    }

    #[test]
    fn zero_timeout_never_sleeps() {
        let (mut orchestrator, _shared) = start(settings(), ChannelMerge::Average);
        for _ in 0..200 {
            assert_eq!(frame(orchestrator.tick().unwrap()), vec![1; 10]);
        }
    }

    #[test]
    fn layout_reset_rebuilds_and_clears_smoothing() {
        let smoothed = PipelineSettings {
            integral: 0.7,
            ..settings()
        };
        let (mut orchestrator, shared) = start(smoothed.clone(), ChannelMerge::Average);
        shared.write_interleaved(&sine(1000.0, 0.5, 4096), 1);
        for _ in 0..5 {
            orchestrator.tick().unwrap();
        }

        let wider = PipelineSettings { bars: 20, ..smoothed };
        orchestrator.reconfigure(wider.clone()).unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::LayoutReset);
        let after_reset = frame(orchestrator.tick().unwrap());
        assert_eq!(orchestrator.state(), OrchestratorState::Running);
        assert_eq!(orchestrator.layout().len(), 20);

        let (mut fresh, fresh_shared) = start(wider, ChannelMerge::Average);
        fresh_shared.write_interleaved(&sine(1000.0, 0.5, 4096), 1);
        assert_eq!(after_reset, frame(fresh.tick().unwrap()));
    }

    #[test]
    fn unusable_settings_are_refused() {
        let (mut orchestrator, _shared) = start(settings(), ChannelMerge::Average);
        let broken = PipelineSettings {
            upper_cutoff: 30000.0,
            ..settings()
        };
        assert!(matches!(
            orchestrator.reconfigure(broken),
            Err(VisError::CutoffAboveNyquist { .. })
        ));
        assert_eq!(orchestrator.state(), OrchestratorState::Running);
        assert_eq!(orchestrator.settings(), &settings());
        assert_eq!(frame(orchestrator.tick().unwrap()).len(), 10);
    }

    #[test]
    fn stereo_output_is_mirrored() {
        let (mut orchestrator, shared) = start(settings(), ChannelMerge::Independent);
        assert_eq!(orchestrator.layout().len(), 5);

        // Left channel carries a low tone, right channel is silent
        let tone = sine(60.0, 0.5, 4096);
        let interleaved: Vec<f32> = tone.iter().flat_map(|&s| [s, 0.0]).collect();
        shared.write_interleaved(&interleaved, 2);

        let bars = frame(orchestrator.tick().unwrap());
        assert_eq!(bars.len(), 10);
        // Lowest left bar sits next to the centre
        let loudest = (0..10).max_by_key(|&i| bars[i]).unwrap();
        assert_eq!(loudest, 4, "{:?}", bars);
        assert!(bars[5..].iter().all(|&b| b == 1));
    }

    #[test]
    fn arrange_mirrors_and_reverses() {
        let channels = vec![vec![1, 2, 3], vec![4, 5, 6]];
        assert_eq!(arrange(channels.clone(), false), vec![3, 2, 1, 4, 5, 6]);
        assert_eq!(arrange(channels, true), vec![1, 2, 3, 6, 5, 4]);
        assert_eq!(arrange(vec![vec![1, 2, 3]], false), vec![1, 2, 3]);
        assert_eq!(arrange(vec![vec![1, 2, 3]], true), vec![3, 2, 1]);
    }

    #[test]
    fn autosens_feeds_back_into_extraction() {
        let (mut orchestrator, shared) = start(
            PipelineSettings {
                autosens: true,
                ..settings()
            },
            ChannelMerge::Average,
        );
        shared.write_interleaved(&sine(1000.0, 0.9, 4096), 1);
        for _ in 0..400 {
            orchestrator.tick().unwrap();
        }
        let bars = frame(orchestrator.tick().unwrap());
        assert!(orchestrator.sensitivity() < 1.0);
        assert!(bars.iter().all(|&b| b <= 110), "{:?}", bars);
    }

    #[test]
    fn capture_end_and_failure() {
        let (mut orchestrator, shared) = start(settings(), ChannelMerge::Average);
        shared.finish();
        assert_eq!(orchestrator.tick().unwrap(), Tick::Finished);

        let (mut orchestrator, shared) = start(settings(), ChannelMerge::Average);
        shared.fail("device gone");
        assert!(matches!(
            orchestrator.tick(),
            Err(VisError::CaptureFailed(m)) if m == "device gone"
        ));
    }

    #[test]
    fn invalid_layout_is_rejected_up_front() {
        let shared = Arc::new(SharedAudio::new(ChannelMerge::Average, 4096));
        let result = FrameOrchestrator::new(
            PipelineSettings {
                upper_cutoff: 30000.0,
                ..settings()
            },
            shared,
            RATE,
        );
        assert!(matches!(result, Err(VisError::CutoffAboveNyquist { .. })));
    }
}
