use approx::assert_abs_diff_eq;
use std::f64::consts::PI;

use wave_analyzer::analysis::band_in_cycles_per_pixel;
use wave_analyzer::{
    AngleAveraging, Band, DirectionEstimate, DirectionEstimator, FarnebackParams, GrayFrame,
    IntensityBuffer, SpatialSpectrumEstimator, TemporalSpectrumEstimator,
};

fn sine(n: usize, freq: f64, fps: f64) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + 20.0 * (2.0 * PI * freq * i as f64 / fps).sin())
        .collect()
}

#[test]
fn constant_window_has_zero_centroids_and_flat_spectrum() {
    let mut estimator = TemporalSpectrumEstimator::default();
    let summary = estimator
        .estimate_window(&vec![87.5; 128], 30.0)
        .expect("estimate");

    for centroid in &summary.centroids {
        assert_eq!(centroid.value, 0.0, "band {}", centroid.label);
    }
    for (freq, mag) in summary.spectrum.bins().skip(1) {
        assert_eq!(mag, 0.0, "bin at {freq} Hz");
    }
    assert!(summary.spectrum.peak().is_none());
}

#[test]
fn sine_lands_in_exactly_one_band() {
    let fps = 20.0;
    let freq = 1.25;
    for n in [64, 128, 256] {
        let mut estimator = TemporalSpectrumEstimator::default();
        let summary = estimator
            .estimate_window(&sine(n, freq, fps), fps)
            .expect("estimate");
        assert_abs_diff_eq!(summary.centroid("mid"), freq, epsilon = 1e-9);
        assert_eq!(summary.centroid("low"), 0.0, "n={n}");
        assert_eq!(summary.centroid("high"), 0.0, "n={n}");
    }
}

#[test]
fn off_bin_sine_stays_near_its_frequency() {
    let fps = 30.0;
    let freq = 1.1;
    let mut estimator = TemporalSpectrumEstimator::default();
    let summary = estimator
        .estimate_window(&sine(1024, freq, fps), fps)
        .expect("estimate");
    let (peak, _) = summary.spectrum.peak().expect("peak");
    assert!((peak - freq).abs() <= fps / 1024.0);
    assert_abs_diff_eq!(summary.centroid("mid"), freq, epsilon = 0.15);
}

#[test]
fn buffer_is_a_bounded_fifo() {
    let n = 16;
    let mut buffer = IntensityBuffer::new(n);
    for i in 0..n {
        assert!(!buffer.is_full());
        buffer.push(i as f64);
    }
    assert!(buffer.is_full());
    buffer.push(n as f64);
    assert_eq!(buffer.len(), n);
    let expected: Vec<f64> = (1..=n).map(|i| i as f64).collect();
    assert_eq!(buffer.snapshot(), expected);

    for i in 0..1000 {
        buffer.push(i as f64);
        assert!(buffer.len() <= n);
    }
}

#[test]
fn partial_buffer_is_a_contract_violation() {
    let mut buffer = IntensityBuffer::new(8);
    buffer.push(1.0);
    let err = TemporalSpectrumEstimator::default()
        .estimate(&buffer, 30.0)
        .expect_err("partial window");
    assert_eq!(
        err.downcast_ref::<wave_analyzer::AnalysisError>(),
        Some(&wave_analyzer::AnalysisError::InsufficientData { have: 1, need: 8 })
    );
}

#[test]
fn alternating_window_peaks_at_nyquist() {
    let mut buffer = IntensityBuffer::new(8);
    for sample in [1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0] {
        buffer.push(sample);
    }
    let mut estimator = TemporalSpectrumEstimator::new(vec![Band::new("top", 3.5, 4.0, [0, 0, 0])]);
    let summary = estimator.estimate(&buffer, 8.0).expect("estimate");

    let (peak, _) = summary.spectrum.peak().expect("peak");
    assert_abs_diff_eq!(peak, 4.0, epsilon = 1e-12);
    assert_abs_diff_eq!(summary.centroid("top"), 4.0, epsilon = 1e-12);
}

#[test]
fn two_hertz_window_reports_two_hertz_centroid() {
    // Period of four samples at 8 fps.
    let window = [1.0, 2.0, 1.0, 0.0, 1.0, 2.0, 1.0, 0.0];
    let mut estimator =
        TemporalSpectrumEstimator::new(vec![Band::new("two_hz", 1.5, 2.5, [0, 0, 0])]);
    let summary = estimator.estimate_window(&window, 8.0).expect("estimate");

    let (peak, _) = summary.spectrum.peak().expect("peak");
    assert_abs_diff_eq!(peak, 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(summary.centroid("two_hz"), 2.0, epsilon = 1e-9);
}

#[test]
fn spatial_output_is_finite_for_degenerate_frames() {
    let mut estimator = SpatialSpectrumEstimator::default();
    let frames = [
        GrayFrame::from_fn(64, 32, |_, _| 0),
        GrayFrame::from_fn(1, 32, |_, y| (y * 7) as u8),
        GrayFrame::from_fn(1, 1, |_, _| 255),
        GrayFrame::from_fn(2, 3, |x, _| (x * 255) as u8),
    ];
    for frame in &frames {
        let summary = estimator.estimate(frame).expect("estimate");
        assert!(summary.spectrum.bins().all(|(f, m)| f.is_finite() && m.is_finite()));
        assert!(summary.centroids.iter().all(|c| c.value.is_finite()));
    }
    let zero = estimator.estimate(&frames[0]).expect("estimate");
    assert!(zero.centroids.iter().all(|c| c.value == 0.0));
}

#[test]
fn spatial_centroid_is_invariant_to_frame_width() {
    let band = Band::new("mid", 3.0, 8.0, [0, 0, 0]);
    let (lo, hi) = band_in_cycles_per_pixel(&band, 64);
    assert_abs_diff_eq!(lo, 3.0 / 64.0, epsilon = 1e-12);
    assert_abs_diff_eq!(hi, 8.0 / 64.0, epsilon = 1e-12);

    let stripes = |width: u32| {
        GrayFrame::from_fn(width, 8, move |x, _| {
            let phase = 2.0 * PI * 4.0 * x as f64 / width as f64;
            (128.0 + 100.0 * phase.sin()).round() as u8
        })
    };
    let mut estimator = SpatialSpectrumEstimator::new(vec![band], 1);
    let narrow = estimator.estimate(&stripes(64)).expect("estimate");
    let wide = estimator.estimate(&stripes(128)).expect("estimate");

    assert_abs_diff_eq!(narrow.centroid("mid"), 4.0, epsilon = 0.05);
    assert_abs_diff_eq!(narrow.centroid("mid"), wide.centroid("mid"), epsilon = 0.05);
}

#[test]
fn identical_frames_report_no_motion() {
    let frame = GrayFrame::from_fn(64, 48, |x, y| {
        let v = 128.0 + 40.0 * (x as f64 * 0.3).sin() + 40.0 * (y as f64 * 0.25).cos();
        v.round() as u8
    });
    let mut estimator =
        DirectionEstimator::new(FarnebackParams::default(), 1.0, AngleAveraging::Circular)
            .expect("estimator");
    let estimate = estimator.estimate(&frame, &frame).expect("estimate");
    assert_eq!(estimate, DirectionEstimate::NoMotion);
    assert_eq!(estimate.degrees(), None);

    let mut arithmetic =
        DirectionEstimator::new(FarnebackParams::default(), 1.0, AngleAveraging::Arithmetic)
            .expect("estimator");
    assert!(!arithmetic.estimate(&frame, &frame).expect("estimate").is_moving());
}

#[test]
fn mismatched_frames_are_rejected() {
    let a = GrayFrame::from_fn(32, 24, |x, _| x as u8);
    let b = GrayFrame::from_fn(24, 32, |x, _| x as u8);
    let mut estimator = DirectionEstimator::new(
        FarnebackParams::default(),
        1.0,
        AngleAveraging::default(),
    )
    .expect("estimator");
    assert!(estimator.estimate(&a, &b).is_err());
}
