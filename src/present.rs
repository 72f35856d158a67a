//! Presentation of per-cycle results.
//!
//! The analysis core never renders anything itself. A `Presenter` receives
//! every `CycleReport` and may render or ignore any part of it. The built-in
//! `LogPresenter` writes the overlay summary and a text spectrum through `log`.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::analysis::{Band, SpectralSummary, Spectrum};
use crate::session::CycleReport;

/// Highest frequency drawn in a spectrum plot.
pub const PLOT_MAX_FREQ: f64 = 5.0;

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const SPARK_WIDTH: usize = 48;

/// Display toggles, fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenterOptions {
    pub show_spectrum: bool,
    pub show_summary: bool,
}

impl Default for PresenterOptions {
    fn default() -> Self {
        Self {
            show_spectrum: true,
            show_summary: true,
        }
    }
}

/// Consumer of per-cycle results.
pub trait Presenter {
    fn name(&self) -> &'static str;

    fn present(&mut self, report: &CycleReport) -> Result<()>;
}

/// Presenter that renders through the `log` facade.
pub struct LogPresenter {
    options: PresenterOptions,
    temporal_colors: Vec<[u8; 3]>,
    spatial_colors: Vec<[u8; 3]>,
    last_warmup_pct: Option<u32>,
}

impl LogPresenter {
    /// Presenter without band color tags.
    pub fn new(options: PresenterOptions) -> Self {
        Self {
            options,
            temporal_colors: Vec::new(),
            spatial_colors: Vec::new(),
            last_warmup_pct: None,
        }
    }

    /// Presenter that tags each summary value with its band's display color.
    pub fn with_bands(options: PresenterOptions, temporal: &[Band], spatial: &[Band]) -> Self {
        Self {
            temporal_colors: temporal.iter().map(|b| b.color).collect(),
            spatial_colors: spatial.iter().map(|b| b.color).collect(),
            ..Self::new(options)
        }
    }
}

impl Presenter for LogPresenter {
    fn name(&self) -> &'static str {
        "log"
    }

    fn present(&mut self, report: &CycleReport) -> Result<()> {
        if let Some(fill) = report.warmup {
            let pct = warmup_percent(fill);
            // One line per percent step, not per frame.
            if self.last_warmup_pct != Some(pct) {
                log::info!("{}", warmup_message(fill));
                self.last_warmup_pct = Some(pct);
            }
        }
        if !self.options.show_spectrum && !self.options.show_summary {
            return Ok(());
        }

        if let Some(temporal) = &report.temporal {
            if self.options.show_spectrum {
                log::info!(
                    "frame {} spectrum 0..{:.1}Hz {}",
                    report.frame_index,
                    PLOT_MAX_FREQ,
                    sparkline(&plot_points(&temporal.spectrum, PLOT_MAX_FREQ), SPARK_WIDTH)
                );
            }
            if self.options.show_summary {
                log::info!(
                    "frame {} temporal {}",
                    report.frame_index,
                    tagged_summary_lines(temporal, &self.temporal_colors).join("  ")
                );
            }
        }
        if self.options.show_summary {
            if let Some(spatial) = &report.spatial {
                log::info!(
                    "frame {} spatial {}",
                    report.frame_index,
                    tagged_summary_lines(spatial, &self.spatial_colors).join("  ")
                );
            }
            if let Some(direction) = &report.direction {
                match direction.degrees() {
                    Some(deg) => log::info!("frame {} direction {:.1}°", report.frame_index, deg),
                    None => log::info!("frame {} direction: no motion", report.frame_index),
                }
            }
        }
        Ok(())
    }
}

/// `"{label}: {value:.2}{unit}"` for every band, in band order.
pub fn summary_lines(summary: &SpectralSummary) -> Vec<String> {
    let unit = summary.domain().unit();
    summary
        .centroids
        .iter()
        .map(|c| format!("{}: {:.2}{}", c.label, c.value, unit))
        .collect()
}

/// `summary_lines` with the band color of the same position appended as
/// `#rrggbb`. Bands without a color entry are left untagged.
pub fn tagged_summary_lines(summary: &SpectralSummary, colors: &[[u8; 3]]) -> Vec<String> {
    summary_lines(summary)
        .into_iter()
        .enumerate()
        .map(|(i, line)| match colors.get(i) {
            Some(&color) => format!("{} {}", line, hex_color(color)),
            None => line,
        })
        .collect()
}

pub fn hex_color([r, g, b]: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Start-up banner shown while the intensity window fills.
pub fn warmup_message(fill_ratio: f64) -> String {
    format!("Data analysis starting up... {}%", warmup_percent(fill_ratio))
}

fn warmup_percent(fill_ratio: f64) -> u32 {
    (fill_ratio.clamp(0.0, 1.0) * 100.0) as u32
}

/// Bins within `[0, max_freq]` mapped to unit coordinates: x is the
/// frequency over `max_freq`, y the magnitude over the largest visible one.
pub fn plot_points(spectrum: &Spectrum, max_freq: f64) -> Vec<(f64, f64)> {
    if max_freq <= 0.0 {
        return Vec::new();
    }
    let visible: Vec<(f64, f64)> = spectrum
        .bins()
        .filter(|&(f, _)| (0.0..=max_freq).contains(&f))
        .collect();
    let peak = visible.iter().map(|&(_, m)| m).fold(0.0f64, f64::max);
    let scale = if peak > 0.0 { peak } else { 1.0 };
    visible
        .into_iter()
        .map(|(f, m)| (f / max_freq, m / scale))
        .collect()
}

/// Render unit-coordinate points as a fixed-width bar string, keeping the
/// tallest point per column.
pub fn sparkline(points: &[(f64, f64)], width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let mut columns = vec![0.0f64; width];
    for &(x, y) in points {
        let col = ((x * (width - 1) as f64).round() as usize).min(width - 1);
        columns[col] = columns[col].max(y);
    }
    let top = (SPARK_LEVELS.len() - 1) as f64;
    columns
        .iter()
        .map(|&y| SPARK_LEVELS[(y.clamp(0.0, 1.0) * top).round() as usize])
        .collect()
}
