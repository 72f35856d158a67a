//! Outbound dispatch of per-cycle metrics.
//!
//! The analysis core hands dispatchers a plain key-value set (`WaveMetrics`)
//! and knows nothing about wire formats. Three transports exist:
//! - OSC float messages over UDP (`/wave/freq_low`, ..., `/wave/direction`)
//! - MQTT publishes under a topic prefix (QoS 1)
//! - `log` output at debug level

mod mqtt;
mod osc;

use anyhow::Result;
use serde::Serialize;

use crate::analysis::SpectralSummary;
use crate::config::{DispatchKind, DispatchSettings};
use crate::motion::DirectionEstimate;

pub use mqtt::MqttDispatcher;
pub use osc::{encode_osc_float, OscDispatcher};

/// Scalar outputs of one cycle, keyed by the names listeners subscribe to.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WaveMetrics {
    pub freq_low: f64,
    pub freq_mid: f64,
    pub freq_high: f64,
    /// Absent when no motion was detected.
    pub direction: Option<f64>,
}

impl WaveMetrics {
    /// The first three temporal bands map to low, mid and high in table
    /// order, whatever their labels. Bands past the third are not dispatched.
    pub fn new(temporal: &SpectralSummary, direction: Option<&DirectionEstimate>) -> Self {
        let band = |i: usize| temporal.centroids.get(i).map(|c| c.value).unwrap_or(0.0);
        Self {
            freq_low: band(0),
            freq_mid: band(1),
            freq_high: band(2),
            direction: direction.and_then(|d| d.degrees()),
        }
    }

    /// `(key, value)` pairs in send order; `direction` is left out when unknown.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        let mut out = vec![
            ("freq_low", self.freq_low),
            ("freq_mid", self.freq_mid),
            ("freq_high", self.freq_high),
        ];
        if let Some(direction) = self.direction {
            out.push(("direction", direction));
        }
        out
    }
}

/// Forwards metrics to an external listener.
pub trait Dispatcher {
    fn name(&self) -> &'static str;

    fn dispatch(&mut self, metrics: &WaveMetrics) -> Result<()>;

    /// Flush and release the transport.
    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Dispatcher that writes metrics to the log at debug level.
#[derive(Default)]
pub struct LogDispatcher;

impl Dispatcher for LogDispatcher {
    fn name(&self) -> &'static str {
        "log"
    }

    fn dispatch(&mut self, metrics: &WaveMetrics) -> Result<()> {
        let line = metrics
            .entries()
            .iter()
            .map(|(key, value)| format!("{}={:.3}", key, value))
            .collect::<Vec<_>>()
            .join(" ");
        log::debug!("metrics {}", line);
        Ok(())
    }
}

/// Build the dispatcher selected by `settings`, or `None` when dispatch is off.
pub fn build_dispatcher(settings: &DispatchSettings) -> Result<Option<Box<dyn Dispatcher>>> {
    let dispatcher: Box<dyn Dispatcher> = match settings.kind {
        DispatchKind::Osc => Box::new(OscDispatcher::connect(&settings.osc_addr)?),
        DispatchKind::Mqtt => Box::new(MqttDispatcher::connect(&settings.mqtt)?),
        DispatchKind::Log => Box::new(LogDispatcher),
        DispatchKind::Disabled => return Ok(None),
    };
    log::info!("dispatch: {}", dispatcher.name());
    Ok(Some(dispatcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{BandCentroid, Domain, Spectrum};

    fn temporal() -> SpectralSummary {
        labelled(&["low", "mid", "high"])
    }

    fn labelled(labels: &[&str]) -> SpectralSummary {
        SpectralSummary {
            spectrum: Spectrum {
                domain: Domain::Temporal,
                frequencies: vec![],
                magnitudes: vec![],
            },
            centroids: labels
                .iter()
                .enumerate()
                .map(|(i, label)| BandCentroid {
                    label: label.to_string(),
                    value: i as f64 + 0.5,
                })
                .collect(),
        }
    }

    #[test]
    fn entries_skip_missing_direction() {
        let metrics = WaveMetrics::new(&temporal(), Some(&DirectionEstimate::NoMotion));
        let keys: Vec<_> = metrics.entries().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["freq_low", "freq_mid", "freq_high"]);
        assert_eq!(metrics.freq_high, 2.5);
    }

    #[test]
    fn custom_band_labels_map_by_position() {
        let metrics = WaveMetrics::new(&labelled(&["swell", "chop", "ripple", "spray"]), None);
        assert_eq!(metrics.freq_low, 0.5);
        assert_eq!(metrics.freq_mid, 1.5);
        assert_eq!(metrics.freq_high, 2.5);
        assert_eq!(metrics.entries().len(), 3);
    }

    #[test]
    fn entries_include_direction_when_moving() {
        let moving = DirectionEstimate::Moving {
            degrees: 12.5,
            moving_pixels: 40,
        };
        let metrics = WaveMetrics::new(&temporal(), Some(&moving));
        assert_eq!(metrics.entries().last(), Some(&("direction", 12.5)));
    }

    #[test]
    fn disabled_dispatch_builds_nothing() -> Result<()> {
        let mut settings = crate::AnalyzerConfig::default().dispatch;
        settings.kind = DispatchKind::Disabled;
        assert!(build_dispatcher(&settings)?.is_none());
        settings.kind = DispatchKind::Log;
        let mut dispatcher = build_dispatcher(&settings)?.ok_or_else(|| anyhow::anyhow!("missing"))?;
        dispatcher.dispatch(&WaveMetrics::new(&temporal(), None))?;
        Ok(())
    }
}
