use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

use crate::analysis::{Band, DEFAULT_BUFFER_CAPACITY};
use crate::ingest::SyntheticWave;
use crate::motion::{AngleAveraging, FarnebackParams, FlowBackendKind, DEFAULT_MOTION_THRESHOLD};
use crate::present::PresenterOptions;

const DEFAULT_SOURCE_PATH: &str = "stub://waves";
const DEFAULT_SOURCE_WIDTH: u32 = 320;
const DEFAULT_SOURCE_HEIGHT: u32 = 240;
const DEFAULT_ROW_START: u32 = 100;
const DEFAULT_ROW_END: u32 = 110;
const DEFAULT_STRIP_ROWS: u32 = 1;
const DEFAULT_DIRECTION_WIDTH: u32 = 160;
const DEFAULT_DIRECTION_HEIGHT: u32 = 120;
const DEFAULT_OSC_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_MQTT_BROKER: &str = "127.0.0.1:1883";
const DEFAULT_MQTT_TOPIC_PREFIX: &str = "wave";
const DEFAULT_MQTT_CLIENT_ID: &str = "wave_analyzer";

#[derive(Debug, Deserialize, Default)]
struct AnalyzerConfigFile {
    source: Option<SourceConfigFile>,
    buffer: Option<BufferConfigFile>,
    temporal: Option<TemporalConfigFile>,
    spatial: Option<SpatialConfigFile>,
    direction: Option<DirectionConfigFile>,
    dispatch: Option<DispatchConfigFile>,
    present: Option<PresentConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    path: Option<String>,
    fps: Option<f64>,
    fallback_fps: Option<f64>,
    width: Option<u32>,
    height: Option<u32>,
    synthetic: Option<SyntheticWave>,
}

#[derive(Debug, Deserialize, Default)]
struct BufferConfigFile {
    capacity: Option<usize>,
    row_start: Option<u32>,
    row_end: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TemporalConfigFile {
    bands: Option<Vec<Band>>,
}

#[derive(Debug, Deserialize, Default)]
struct SpatialConfigFile {
    bands: Option<Vec<Band>>,
    strip_rows: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DirectionConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    threshold: Option<f64>,
    averaging: Option<AngleAveraging>,
    backend: Option<FlowBackendKind>,
    smoothing: Option<u32>,
    flow: Option<FlowConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct FlowConfigFile {
    pyr_scale: Option<f64>,
    levels: Option<u32>,
    winsize: Option<u32>,
    iterations: Option<u32>,
    poly_n: Option<u32>,
    poly_sigma: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct DispatchConfigFile {
    kind: Option<DispatchKind>,
    osc_addr: Option<String>,
    mqtt: Option<MqttConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker: Option<String>,
    topic_prefix: Option<String>,
    client_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PresentConfigFile {
    show_spectrum: Option<bool>,
    show_summary: Option<bool>,
}

/// Complete, validated analyzer configuration.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub source: SourceSettings,
    pub buffer: BufferSettings,
    pub temporal_bands: Vec<Band>,
    pub spatial: SpatialSettings,
    pub direction: DirectionSettings,
    pub dispatch: DispatchSettings,
    pub present: PresenterOptions,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub path: String,
    /// Forced sampling rate; overrides whatever the source reports.
    pub fps: Option<f64>,
    /// Used when the source cannot report a usable rate.
    pub fallback_fps: f64,
    pub width: u32,
    pub height: u32,
    pub synthetic: SyntheticWave,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            path: DEFAULT_SOURCE_PATH.to_string(),
            fps: None,
            fallback_fps: crate::DEFAULT_FPS,
            width: DEFAULT_SOURCE_WIDTH,
            height: DEFAULT_SOURCE_HEIGHT,
            synthetic: SyntheticWave::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BufferSettings {
    pub capacity: usize,
    /// Intensity strip rows `[row_start, row_end)` of the full-size frame.
    pub row_start: u32,
    pub row_end: u32,
}

#[derive(Debug, Clone)]
pub struct SpatialSettings {
    pub bands: Vec<Band>,
    pub strip_rows: u32,
}

#[derive(Debug, Clone)]
pub struct DirectionSettings {
    /// Resolution frames are reduced to before flow estimation.
    pub width: u32,
    pub height: u32,
    pub threshold: f64,
    pub averaging: AngleAveraging,
    pub backend: FlowBackendKind,
    /// Odd Gaussian kernel size applied to reduced frames before flow; 0 disables.
    pub smoothing: u32,
    pub flow: FarnebackParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchKind {
    Osc,
    Mqtt,
    Log,
    #[serde(rename = "none", alias = "off")]
    Disabled,
}

impl DispatchKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "osc" => Ok(DispatchKind::Osc),
            "mqtt" => Ok(DispatchKind::Mqtt),
            "log" => Ok(DispatchKind::Log),
            "none" | "off" => Ok(DispatchKind::Disabled),
            other => Err(anyhow!(
                "unknown dispatch kind {:?} (expected osc, mqtt, log or none)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub kind: DispatchKind,
    pub osc_addr: String,
    pub mqtt: MqttSettings,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub broker: String,
    pub topic_prefix: String,
    pub client_id: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self::from_file(AnalyzerConfigFile::default())
    }
}

impl AnalyzerConfig {
    /// Load from the file named by `WAVE_CONFIG` (if set), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WAVE_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, with an explicit config file taking the place of `WAVE_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AnalyzerConfigFile) -> Self {
        let source_file = file.source.unwrap_or_default();
        let source = SourceSettings {
            path: source_file
                .path
                .unwrap_or_else(|| DEFAULT_SOURCE_PATH.to_string()),
            fps: source_file.fps,
            fallback_fps: source_file.fallback_fps.unwrap_or(crate::DEFAULT_FPS),
            width: source_file.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            synthetic: source_file.synthetic.unwrap_or_default(),
        };

        let buffer_file = file.buffer.unwrap_or_default();
        let buffer = BufferSettings {
            capacity: buffer_file.capacity.unwrap_or(DEFAULT_BUFFER_CAPACITY),
            row_start: buffer_file.row_start.unwrap_or(DEFAULT_ROW_START),
            row_end: buffer_file.row_end.unwrap_or(DEFAULT_ROW_END),
        };

        let temporal_bands = file
            .temporal
            .and_then(|temporal| temporal.bands)
            .unwrap_or_else(Band::default_temporal);

        let spatial_file = file.spatial.unwrap_or_default();
        let spatial = SpatialSettings {
            bands: spatial_file.bands.unwrap_or_else(Band::default_spatial),
            strip_rows: spatial_file.strip_rows.unwrap_or(DEFAULT_STRIP_ROWS),
        };

        let direction_file = file.direction.unwrap_or_default();
        let flow_file = direction_file.flow.unwrap_or_default();
        let flow_default = FarnebackParams::default();
        let direction = DirectionSettings {
            width: direction_file.width.unwrap_or(DEFAULT_DIRECTION_WIDTH),
            height: direction_file.height.unwrap_or(DEFAULT_DIRECTION_HEIGHT),
            threshold: direction_file.threshold.unwrap_or(DEFAULT_MOTION_THRESHOLD),
            averaging: direction_file.averaging.unwrap_or_default(),
            backend: direction_file.backend.unwrap_or_default(),
            smoothing: direction_file.smoothing.unwrap_or(0),
            flow: FarnebackParams {
                pyr_scale: flow_file.pyr_scale.unwrap_or(flow_default.pyr_scale),
                levels: flow_file.levels.unwrap_or(flow_default.levels),
                winsize: flow_file.winsize.unwrap_or(flow_default.winsize),
                iterations: flow_file.iterations.unwrap_or(flow_default.iterations),
                poly_n: flow_file.poly_n.unwrap_or(flow_default.poly_n),
                poly_sigma: flow_file.poly_sigma.unwrap_or(flow_default.poly_sigma),
            },
        };

        let dispatch_file = file.dispatch.unwrap_or_default();
        let mqtt_file = dispatch_file.mqtt.unwrap_or_default();
        let dispatch = DispatchSettings {
            kind: dispatch_file.kind.unwrap_or(DispatchKind::Osc),
            osc_addr: dispatch_file
                .osc_addr
                .unwrap_or_else(|| DEFAULT_OSC_ADDR.to_string()),
            mqtt: MqttSettings {
                broker: mqtt_file
                    .broker
                    .unwrap_or_else(|| DEFAULT_MQTT_BROKER.to_string()),
                topic_prefix: mqtt_file
                    .topic_prefix
                    .unwrap_or_else(|| DEFAULT_MQTT_TOPIC_PREFIX.to_string()),
                client_id: mqtt_file
                    .client_id
                    .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
            },
        };

        let present_file = file.present.unwrap_or_default();
        let present_default = PresenterOptions::default();
        let present = PresenterOptions {
            show_spectrum: present_file
                .show_spectrum
                .unwrap_or(present_default.show_spectrum),
            show_summary: present_file
                .show_summary
                .unwrap_or(present_default.show_summary),
        };

        Self {
            source,
            buffer,
            temporal_bands,
            spatial,
            direction,
            dispatch,
            present,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("WAVE_SOURCE") {
            if !path.trim().is_empty() {
                self.source.path = path;
            }
        }
        if let Ok(fps) = std::env::var("WAVE_FPS") {
            let fps: f64 = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("WAVE_FPS must be a number of frames per second"))?;
            self.source.fps = Some(fps);
        }
        if let Ok(len) = std::env::var("WAVE_BUFFER_LEN") {
            self.buffer.capacity = len
                .trim()
                .parse()
                .map_err(|_| anyhow!("WAVE_BUFFER_LEN must be an integer sample count"))?;
        }
        if let Ok(kind) = std::env::var("WAVE_DISPATCH") {
            if !kind.trim().is_empty() {
                self.dispatch.kind = DispatchKind::parse(&kind)
                    .map_err(|e| anyhow!("WAVE_DISPATCH: {}", e))?;
            }
        }
        if let Ok(addr) = std::env::var("WAVE_OSC_ADDR") {
            if !addr.trim().is_empty() {
                self.dispatch.osc_addr = addr;
            }
        }
        if let Ok(broker) = std::env::var("WAVE_MQTT_BROKER") {
            if !broker.trim().is_empty() {
                self.dispatch.mqtt.broker = broker;
            }
        }
        if let Ok(prefix) = std::env::var("WAVE_MQTT_TOPIC_PREFIX") {
            if !prefix.trim().is_empty() {
                self.dispatch.mqtt.topic_prefix = prefix;
            }
        }
        if let Ok(backend) = std::env::var("WAVE_FLOW_BACKEND") {
            if !backend.trim().is_empty() {
                self.direction.backend = FlowBackendKind::parse(&backend)
                    .map_err(|e| anyhow!("WAVE_FLOW_BACKEND: {}", e))?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.path.trim().is_empty() {
            return Err(anyhow!("source path must not be empty"));
        }
        if let Some(fps) = self.source.fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(anyhow!("source fps must be positive, got {}", fps));
            }
        }
        if !(self.source.fallback_fps.is_finite() && self.source.fallback_fps > 0.0) {
            return Err(anyhow!("source fallback_fps must be positive"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if self.buffer.capacity == 0 {
            return Err(anyhow!("buffer capacity must be greater than zero"));
        }
        if self.buffer.row_end <= self.buffer.row_start {
            return Err(anyhow!(
                "buffer rows must satisfy row_start < row_end (got {}..{})",
                self.buffer.row_start,
                self.buffer.row_end
            ));
        }
        validate_bands("temporal", &self.temporal_bands)?;
        if self.temporal_bands.len() < DISPATCHED_TEMPORAL_BANDS {
            return Err(anyhow!(
                "temporal bands must list at least {} entries (low, mid, high), got {}",
                DISPATCHED_TEMPORAL_BANDS,
                self.temporal_bands.len()
            ));
        }
        validate_bands("spatial", &self.spatial.bands)?;
        if self.spatial.strip_rows == 0 {
            return Err(anyhow!("spatial strip_rows must be at least 1"));
        }
        if self.direction.width == 0 || self.direction.height == 0 {
            return Err(anyhow!("direction downsample size must be greater than zero"));
        }
        if !(self.direction.threshold.is_finite() && self.direction.threshold >= 0.0) {
            return Err(anyhow!("direction threshold must be a non-negative number"));
        }
        if !self.direction.backend.is_available() {
            return Err(anyhow!(
                "flow backend {:?} is not compiled in (enable the flow-opencv feature)",
                self.direction.backend
            ));
        }
        if self.direction.smoothing % 2 == 0 && self.direction.smoothing != 0 {
            return Err(anyhow!(
                "direction smoothing must be 0 or an odd kernel size, got {}",
                self.direction.smoothing
            ));
        }
        self.direction.flow.validate()?;
        match self.dispatch.kind {
            DispatchKind::Osc => {
                self.dispatch
                    .osc_addr
                    .parse::<SocketAddr>()
                    .map_err(|_| anyhow!("invalid osc_addr {}", self.dispatch.osc_addr))?;
            }
            DispatchKind::Mqtt => {
                if self.dispatch.mqtt.broker.trim().is_empty() {
                    return Err(anyhow!("mqtt broker must not be empty"));
                }
                if self.dispatch.mqtt.topic_prefix.trim().is_empty() {
                    return Err(anyhow!("mqtt topic_prefix must not be empty"));
                }
            }
            DispatchKind::Log | DispatchKind::Disabled => {}
        }
        Ok(())
    }
}

/// Temporal bands feeding `freq_low`, `freq_mid` and `freq_high`, by position.
const DISPATCHED_TEMPORAL_BANDS: usize = 3;

fn validate_bands(domain: &str, bands: &[Band]) -> Result<()> {
    if bands.is_empty() {
        return Err(anyhow!("{} bands must not be empty", domain));
    }
    for band in bands {
        band.validate()
            .map_err(|e| anyhow!("{} bands: {}", domain, e))?;
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<AnalyzerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() -> Result<()> {
        let cfg = AnalyzerConfig::default();
        cfg.validate()?;
        assert_eq!(cfg.buffer.capacity, 128);
        assert_eq!((cfg.buffer.row_start, cfg.buffer.row_end), (100, 110));
        assert_eq!((cfg.direction.width, cfg.direction.height), (160, 120));
        assert_eq!(cfg.dispatch.kind, DispatchKind::Osc);
        assert_eq!(cfg.dispatch.osc_addr, "127.0.0.1:8000");
        Ok(())
    }

    #[test]
    fn dispatch_kind_parsing() -> Result<()> {
        assert_eq!(DispatchKind::parse("MQTT")?, DispatchKind::Mqtt);
        assert_eq!(DispatchKind::parse(" none ")?, DispatchKind::Disabled);
        assert!(DispatchKind::parse("carrier-pigeon").is_err());
        Ok(())
    }

    #[test]
    fn inverted_rows_are_rejected() {
        let mut cfg = AnalyzerConfig::default();
        cfg.buffer.row_start = 20;
        cfg.buffer.row_end = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn toml_file_sections_are_parsed() -> Result<()> {
        let file: AnalyzerConfigFile = toml::from_str(
            r#"
            [buffer]
            capacity = 64

            [direction]
            averaging = "arithmetic"

            [direction.flow]
            winsize = 21

            [[temporal.bands]]
            label = "swell"
            min = 0.05
            max = 0.3

            [[temporal.bands]]
            label = "chop"
            min = 0.3
            max = 1.5

            [[temporal.bands]]
            label = "ripple"
            min = 1.5
            max = 6.0
            "#,
        )?;
        let cfg = AnalyzerConfig::from_file(file);
        cfg.validate()?;
        assert_eq!(cfg.buffer.capacity, 64);
        assert_eq!(cfg.direction.averaging, AngleAveraging::Arithmetic);
        assert_eq!(cfg.direction.flow.winsize, 21);
        assert_eq!(cfg.direction.flow.levels, 3);
        assert_eq!(cfg.temporal_bands.len(), 3);
        assert_eq!(cfg.temporal_bands[0].color, [128, 128, 128]);
        Ok(())
    }

    #[test]
    fn flow_backend_and_smoothing_are_checked() -> Result<()> {
        let file: AnalyzerConfigFile = serde_json::from_str(
            r#"{"direction": {"backend": "farneback", "smoothing": 5}}"#,
        )?;
        let mut cfg = AnalyzerConfig::from_file(file);
        cfg.validate()?;
        assert_eq!(cfg.direction.backend, FlowBackendKind::Farneback);
        assert_eq!(cfg.direction.smoothing, 5);

        cfg.direction.smoothing = 4;
        assert!(cfg.validate().is_err());
        cfg.direction.smoothing = 0;

        cfg.direction.backend = FlowBackendKind::Opencv;
        assert_eq!(cfg.validate().is_ok(), cfg!(feature = "flow-opencv"));
        Ok(())
    }

    #[test]
    fn too_few_temporal_bands_are_rejected() {
        let mut cfg = AnalyzerConfig::default();
        cfg.temporal_bands.truncate(2);
        let err = cfg.validate().err().map(|e| e.to_string());
        assert!(
            err.as_deref().is_some_and(|e| e.contains("at least 3")),
            "{err:?}"
        );
    }

    #[test]
    fn unknown_dispatch_kind_fails_to_parse() {
        let parsed: Result<AnalyzerConfigFile, _> =
            serde_json::from_str(r#"{"dispatch": {"kind": "pigeon"}}"#);
        assert!(parsed.is_err());
    }
}
