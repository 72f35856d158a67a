//! demo - end-to-end synthetic run for the wave analyzer
//!
//! Generates a traveling wave with known frequency and direction, runs it
//! through an `AnalysisSession` and prints one JSON `CycleReport` per line
//! once the intensity window is full.

use anyhow::Result;
use clap::Parser;

use wave_analyzer::{open_source, AnalysisSession, AnalyzerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames to generate.
    #[arg(long, default_value_t = 256)]
    frames: u64,
    /// Sampling rate of the synthetic source.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,
    /// Temporal frequency of the wave in Hz.
    #[arg(long, default_value_t = 1.0)]
    hz: f64,
    /// Wave crests across the frame width.
    #[arg(long, default_value_t = 2.0)]
    cycles: f64,
    /// Print every cycle, including warm-up.
    #[arg(long)]
    all: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = AnalyzerConfig::default();
    config.source.path = "stub://demo".to_string();
    config.source.fps = Some(args.fps);
    config.source.synthetic.temporal_hz = args.hz;
    config.source.synthetic.cycles_per_width = args.cycles;
    config.source.synthetic.frame_limit = Some(args.frames);
    config.validate()?;

    let mut source = open_source(&config.source)?;
    source.connect()?;
    let mut session = AnalysisSession::new(&config, args.fps)?;

    while let Some(pair) = source.next_pair()? {
        let report = session.process(&pair)?;
        if args.all || report.temporal.is_some() {
            println!("{}", serde_json::to_string(&report)?);
        }
    }
    Ok(())
}
