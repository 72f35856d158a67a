//! wave_analyzer - wave field analysis daemon
//!
//! This daemon:
//! 1. Opens the configured frame source (synthetic, local file or V4L2 camera)
//! 2. Feeds every frame through one `AnalysisSession` cycle
//! 3. Renders overlay summaries and spectra through the log presenter
//! 4. Forwards direction and band frequencies to the configured dispatcher
//! 5. Stops on end of stream, `--max-frames` or Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use wave_analyzer::config::DispatchKind;
use wave_analyzer::dispatch::build_dispatcher;
use wave_analyzer::ingest::effective_fps;
use wave_analyzer::{open_source, AnalysisSession, AnalyzerConfig, LogPresenter, Presenter};

#[path = "../ui.rs"]
mod ui;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Estimate wave direction and band frequencies from video"
)]
struct Args {
    /// Config file (TOML or JSON).
    #[arg(long, env = "WAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Frame source: stub://…, a local video file or /dev/videoN.
    #[arg(long)]
    source: Option<String>,

    /// Dispatcher kind (osc|mqtt|log|none).
    #[arg(long)]
    dispatch: Option<String>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Pace the loop at the sampling rate instead of running flat out.
    #[arg(long)]
    realtime: bool,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, false);

    let config = {
        let _stage = ui.stage("Load configuration");
        let mut config = AnalyzerConfig::load_from(args.config.as_deref())?;
        if let Some(source) = &args.source {
            config.source.path = source.clone();
        }
        if let Some(kind) = &args.dispatch {
            config.dispatch.kind = DispatchKind::parse(kind)?;
        }
        config.validate()?;
        config
    };

    let mut source = {
        let _stage = ui.stage("Open frame source");
        let mut source = open_source(&config.source)?;
        source
            .connect()
            .with_context(|| format!("connect to {}", config.source.path))?;
        source
    };
    let fps = effective_fps(
        config.source.fps,
        source.nominal_fps(),
        config.source.fallback_fps,
    );

    let mut session = AnalysisSession::new(&config, fps)?;
    let mut presenter = LogPresenter::with_bands(
        config.present,
        &config.temporal_bands,
        &config.spatial.bands,
    );
    let mut dispatcher = {
        let _stage = ui.stage("Start dispatcher");
        build_dispatcher(&config.dispatch)?
    };
    let mut warmup = ui.warmup(config.buffer.capacity);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("install Ctrl-C handler")?;
    }

    let frame_pause = Duration::from_millis(((1000.0 / fps) as u64).max(1));
    let mut last_health_log = Instant::now();
    let mut dispatched = 0u64;

    log::info!(
        "wave_analyzer running: source={} fps={:.2} presenter={} dispatch={:?}",
        config.source.path,
        fps,
        presenter.name(),
        config.dispatch.kind
    );

    while !stop.load(Ordering::SeqCst) {
        if args
            .max_frames
            .is_some_and(|max| session.frames_processed() >= max)
        {
            log::info!("frame limit reached");
            break;
        }
        let Some(pair) = source.next_pair()? else {
            log::info!("source exhausted");
            break;
        };

        let report = session.process(&pair)?;
        warmup.update(report.warmup);
        presenter.present(&report)?;

        if let (Some(metrics), Some(dispatcher)) = (report.metrics(), dispatcher.as_mut()) {
            match dispatcher.dispatch(&metrics) {
                Ok(()) => dispatched += 1,
                Err(e) => log::warn!("{} dispatch failed: {:#}", dispatcher.name(), e),
            }
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = source.stats();
            log::info!(
                "source health={} frames={} fill={:.0}% dispatched={} path={}",
                source.is_healthy(),
                stats.frames_captured,
                session.buffer().fill_ratio() * 100.0,
                dispatched,
                stats.path
            );
            last_health_log = Instant::now();
        }

        if args.realtime {
            std::thread::sleep(frame_pause);
        }
    }

    if let Some(dispatcher) = dispatcher.take() {
        dispatcher.close()?;
    }
    log::info!(
        "processed {} frames, dispatched {} metric sets",
        session.frames_processed(),
        dispatched
    );
    Ok(())
}
