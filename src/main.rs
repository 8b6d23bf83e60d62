mod analysis;
mod audio;
mod cli;
mod config;
mod error;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use analysis::pipeline::{FrameOrchestrator, PipelineSettings, Tick};
use audio::decode::FileSource;
use audio::pcm::PcmSource;
use audio::source::{CaptureHandle, SampleSource};
use audio::stream::{SharedAudio, StreamFormat};
use cli::{Cli, Expectation};
use config::{Config, ConfigWatch, InputMethod};
use error::{VisError, VisResult};
use render::RenderFrame;

/// Poll interval while the input is silent
const SLEEP_POLL: Duration = Duration::from_secs(1);
/// How often the config file is checked for changes
const RELOAD_POLL: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config_path = config::find_config(cli.config.as_deref());
    let mut config = match config_path {
        Some(ref path) => {
            let loaded = config::load_config(path)?;
            log::info!("Loaded config from {}", path.display());
            loaded
        }
        None => Config::default(),
    };
    cli.apply_to(&mut config);

    let settings = config.pipeline_settings().context("Invalid configuration")?;
    let source = build_source(&config)?;
    let shared = Arc::new(SharedAudio::new(config.channel_merge(), settings.sizes.largest()));
    let capture = CaptureHandle::spawn(source, Arc::clone(&shared))?;

    let watch = config_path.map(|path| ConfigWatch::new(path, RELOAD_POLL));
    let result = visualize(&cli, &config, settings, &shared, watch);

    // The capture thread is joined on every path before errors surface
    capture.shutdown();
    result
}

fn build_source(config: &Config) -> Result<Box<dyn SampleSource>> {
    let path = config
        .input
        .source
        .as_ref()
        .context("No audio source: pass an input path or set [input] source")?;

    match config.input.method {
        InputMethod::File => {
            if !path.exists() {
                anyhow::bail!("Input file not found: {}", path.display());
            }
            Ok(Box::new(FileSource::new(path)))
        }
        InputMethod::Pcm => {
            let format = StreamFormat {
                sample_rate: config.input.sample_rate,
                bit_format: config.pcm_bit_format()?,
                channels: config.input.channels.max(1),
            };
            Ok(Box::new(PcmSource::new(path, format)))
        }
    }
}

fn visualize(
    cli: &Cli,
    config: &Config,
    settings: PipelineSettings,
    shared: &Arc<SharedAudio>,
    mut watch: Option<ConfigWatch>,
) -> Result<()> {
    let timeout = Duration::from_secs(config.input.startup_timeout);
    let format = shared
        .wait_for_format(timeout)
        .context("Audio source did not start")?;
    log::info!(
        "Input: {}Hz, {:?}, {} channel(s), analysis {:?}",
        format.sample_rate,
        format.bit_format,
        format.channels,
        shared.merge()
    );

    let mut orchestrator = FrameOrchestrator::new(settings, Arc::clone(shared), format.sample_rate)
        .context("Failed to set up analysis")?;

    let mut renderer = render::create_renderer(
        config.output.format,
        config.raw_options(),
        BufWriter::new(std::io::stdout()),
    );

    let mut frames: u64 = 0;
    let mut last: Option<Vec<i32>> = None;

    loop {
        if let Some(watch) = watch.as_mut() {
            if watch.poll() {
                reload(cli, config, watch.path(), shared, &mut orchestrator);
            }
        }

        let started = Instant::now();
        match orchestrator.tick()? {
            Tick::Frame(bars) => {
                let height = orchestrator.settings().height;
                renderer.render(&RenderFrame::from_bars(&bars, height))?;
                frames += 1;
                last = Some(bars);
                if cli.frames.is_some_and(|n| frames >= n) {
                    break;
                }
                let frame_time = Duration::from_secs_f64(1.0 / f64::from(orchestrator.settings().framerate.max(1)));
                if let Some(rest) = frame_time.checked_sub(started.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
            Tick::Sleeping => std::thread::sleep(SLEEP_POLL),
            Tick::Finished => {
                log::info!("Input finished after {} frames", frames);
                break;
            }
        }
    }

    if let Some(expect) = cli.expect {
        let raw = orchestrator.settings().raw_output;
        check_expectation(expect, last.as_deref().unwrap_or(&[]), raw)?;
        log::info!("Test passed: {:?} after {} frames", expect, frames);
    }
    Ok(())
}

/// Re-read the config after the file changed and hand the result to the
/// orchestrator. A broken file keeps the running settings.
fn reload(
    cli: &Cli,
    started_with: &Config,
    path: &Path,
    shared: &SharedAudio,
    orchestrator: &mut FrameOrchestrator,
) {
    let result = config::load_config(path).and_then(|mut config| {
        cli.apply_to(&mut config);
        if config.channel_merge() != started_with.channel_merge()
            || config.output.format != started_with.output.format
        {
            log::warn!("Channel and output format changes take effect after a restart");
        }
        let settings = config.pipeline_settings()?;
        let capacity = shared.lock_buffers().capacity();
        let next = reloaded_settings(settings, orchestrator.settings(), capacity);
        orchestrator.reconfigure(next)?;
        Ok(())
    });
    match result {
        Ok(()) => log::info!("Reloaded config from {}", path.display()),
        Err(e) => log::warn!("Keeping current config: {:#}", e),
    }
}

/// Settings that cannot change while running are carried over from `current`.
fn reloaded_settings(mut next: PipelineSettings, current: &PipelineSettings, capacity: usize) -> PipelineSettings {
    next.raw_output = current.raw_output;
    if next.sizes.largest() > capacity {
        log::warn!("Transform sizes {:?} need a restart", next.sizes);
        next.sizes = current.sizes;
    }
    next
}

/// Sum of the final bar heights; outside raw mode the one-unit floor counts as empty.
fn total_height(bars: &[i32], raw: bool) -> i64 {
    bars.iter()
        .map(|&b| if !raw && b == 1 { 0 } else { i64::from(b) })
        .sum()
}

fn check_expectation(expect: Expectation, bars: &[i32], raw: bool) -> VisResult<()> {
    let total = total_height(bars, raw);
    match expect {
        Expectation::Zero if total > 0 => Err(VisError::Expectation(format!(
            "expected zero output, total bar height was {}",
            total
        ))),
        Expectation::NonZero if total == 0 => {
            Err(VisError::Expectation("expected non-zero output, all bars were empty".into()))
        }
        _ => Ok(()),
    }
}
