use std::net::UdpSocket;
use std::time::Duration;

use wave_analyzer::config::DispatchKind;
use wave_analyzer::dispatch::build_dispatcher;
use wave_analyzer::{
    open_source, AnalysisSession, AnalyzerConfig, CycleReport, LogPresenter, Presenter,
};

const FPS: f64 = 32.0;
const WAVE_HZ: f64 = 1.5;

fn synthetic_config(frames: u64) -> AnalyzerConfig {
    let mut config = AnalyzerConfig::default();
    config.source.path = "stub://e2e".to_string();
    config.source.fps = Some(FPS);
    config.source.width = 128;
    config.source.height = 120;
    config.source.synthetic.temporal_hz = WAVE_HZ;
    config.source.synthetic.cycles_per_width = 1.0;
    config.source.synthetic.noise = 0.0;
    config.source.synthetic.frame_limit = Some(frames);
    config.buffer.capacity = 64;
    config.direction.width = 64;
    config.direction.height = 48;
    config.dispatch.kind = DispatchKind::Log;
    config
}

fn run(config: &AnalyzerConfig) -> Vec<CycleReport> {
    let mut source = open_source(&config.source).expect("open source");
    source.connect().expect("connect");
    let mut session = AnalysisSession::new(config, FPS).expect("session");
    let mut presenter = LogPresenter::with_bands(
        config.present,
        &config.temporal_bands,
        &config.spatial.bands,
    );
    let mut reports = Vec::new();
    while let Some(pair) = source.next_pair().expect("next frame") {
        let report = session.process(&pair).expect("cycle");
        presenter.present(&report).expect("present");
        reports.push(report);
    }
    reports
}

fn angular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

#[test]
fn synthetic_wave_yields_frequency_and_direction() {
    let config = synthetic_config(80);
    let reports = run(&config);
    assert_eq!(reports.len(), 80);

    // Warm-up until the 64-sample window fills.
    for report in &reports[..63] {
        assert!(report.temporal.is_none());
        assert!(report.warmup.is_some());
    }
    assert!(reports[62].warmup.unwrap() < 1.0);

    let last = reports.last().expect("report");
    assert!(last.warmup.is_none());
    let temporal = last.temporal.as_ref().expect("temporal summary");
    let mid = temporal.centroid("mid");
    assert!((mid - WAVE_HZ).abs() < 0.3, "mid centroid {mid}");
    let (peak, _) = temporal.spectrum.peak().expect("peak");
    assert!((peak - WAVE_HZ).abs() < 1e-9, "peak {peak}");

    let spatial = last.spatial.as_ref().expect("spatial summary");
    assert!(spatial.centroids.iter().all(|c| c.value.is_finite()));
    assert!(spatial.centroid("low") > 0.5);

    let direction = last.direction.expect("direction");
    let degrees = direction.degrees().expect("wave should be moving");
    assert!(
        angular_distance(degrees, 0.0) < 30.0,
        "direction {degrees} should point along +x"
    );

    let metrics = last.metrics().expect("metrics");
    assert_eq!(metrics.freq_mid, mid);
    assert_eq!(metrics.direction, Some(degrees));
}

#[test]
fn renamed_bands_still_drive_metrics() {
    let mut config = synthetic_config(70);
    for (band, label) in config.temporal_bands.iter_mut().zip(["swell", "chop", "ripple"]) {
        band.label = label.to_string();
    }
    let reports = run(&config);
    let last = reports.last().expect("report");
    let temporal = last.temporal.as_ref().expect("temporal summary");
    let chop = temporal.centroid("chop");
    assert!((chop - WAVE_HZ).abs() < 0.3, "chop centroid {chop}");

    let metrics = last.metrics().expect("metrics");
    assert_eq!(metrics.freq_low, temporal.centroid("swell"));
    assert_eq!(metrics.freq_mid, chop);
    assert_eq!(metrics.freq_high, temporal.centroid("ripple"));
}

#[test]
fn metrics_reach_an_osc_listener() {
    let listener = UdpSocket::bind("127.0.0.1:0").expect("bind listener");
    listener
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("timeout");

    let mut config = synthetic_config(70);
    config.dispatch.kind = DispatchKind::Osc;
    config.dispatch.osc_addr = listener.local_addr().expect("addr").to_string();
    let mut dispatcher = build_dispatcher(&config.dispatch)
        .expect("build dispatcher")
        .expect("osc dispatcher");

    let reports = run(&config);
    let metrics = reports
        .iter()
        .rev()
        .find_map(|r| r.metrics())
        .expect("at least one full window");
    dispatcher.dispatch(&metrics).expect("dispatch");

    let mut buf = [0u8; 64];
    let (len, _) = listener.recv_from(&mut buf).expect("datagram");
    assert!(buf[..len].starts_with(b"/wave/freq_low\0"));
    // Address (16 bytes) + ",f" tag (4 bytes) + big-endian float.
    let value = f32::from_be_bytes([buf[20], buf[21], buf[22], buf[23]]);
    assert!((value as f64 - metrics.freq_low).abs() < 1e-4);
}

#[test]
fn reports_serialize_to_json() {
    let config = synthetic_config(66);
    let reports = run(&config);
    let json = serde_json::to_value(reports.last().expect("report")).expect("json");
    assert_eq!(json["frame_index"], 65);
    assert!(json["temporal"]["centroids"].is_array());
    assert_eq!(json["direction"]["state"], "moving");
}

#[test]
fn static_scene_degrades_to_zero_and_no_motion() {
    let mut config = synthetic_config(70);
    config.source.synthetic.amplitude = 0.0;
    let reports = run(&config);
    let last = reports.last().expect("report");

    let temporal = last.temporal.as_ref().expect("temporal summary");
    assert!(temporal.centroids.iter().all(|c| c.value == 0.0));
    assert_eq!(last.direction.and_then(|d| d.degrees()), None);
    assert_eq!(last.metrics().expect("metrics").direction, None);
}
