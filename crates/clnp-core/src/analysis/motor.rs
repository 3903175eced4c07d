// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! Time-domain motor metrics: signal-dependent noise, cross-axis coupling,
//! pulse-response latency, and the minimum-jerk correction fit.

use super::{PulseEvent, TrackingSeries};
use crate::dsp;
use serde::Serialize;

const NOISE_WINDOW: usize = 15;
const NOISE_WINDOW_STEP: usize = 8;
const NOISE_MIN_SPEED: f64 = 10.0;
const NOISE_MIN_WINDOWS: usize = 5;
const CROSS_AXIS_WINDOW_MS: f64 = 400.0;
const CROSS_AXIS_MIN_DX: f64 = 2.0;
const PULSE_PRE_MS: f64 = 200.0;
const PULSE_POST_MS: f64 = 600.0;
const ONSET_MIN_MS: f64 = 80.0;
const ONSET_THRESHOLD: f64 = 0.20;
const ONSET_SUSTAIN_THRESHOLD: f64 = 0.15;
const ONSET_SUSTAIN_MS: f64 = 40.0;
const MIN_JERK_MIN_SAMPLES: usize = 4;
const MIN_JERK_MIN_SPAN_MS: f64 = 30.0;

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignalNoiseFeatures {
    pub valid: bool,
    pub correlation: f64,
    pub slope: f64,
    pub window_count: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CrossAxisFeatures {
    pub valid: bool,
    pub mean_ratio: f64,
    pub sd_ratio: f64,
    pub pulse_count: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PulseFeatures {
    pub valid: bool,
    pub latency_mean_ms: f64,
    pub latency_sd_ms: f64,
    pub mean_overshoot: f64,
    pub detected: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MinJerkFeatures {
    pub valid: bool,
    pub mean_r_squared: f64,
    pub fitted: usize,
}

/// One detected correction response, kept for the minimum-jerk fit.
#[derive(Debug, Clone)]
pub struct PulseDetection {
    pub latency_ms: f64,
    pub peak_ms: f64,
    pub peak_correction: f64,
    /// (ms since pulse start, normalized correction) between onset and peak.
    pub trace: Vec<(f64, f64)>,
}

/// Healthy motor control shows noise that grows with movement speed.
/// Windows of 15 samples at 50% overlap; only windows moving faster than
/// 10 px/s count.
pub fn signal_dependent_noise(series: &TrackingSeries) -> SignalNoiseFeatures {
    let n = series.len();
    if n < NOISE_WINDOW + 1 {
        return SignalNoiseFeatures::default();
    }
    let error_mag = series.error_mag();
    let speed: Vec<f64> = (0..n - 1)
        .map(|i| {
            let dt = (series.t[i + 1] - series.t[i]) / 1000.0;
            if dt <= 0.0 {
                return 0.0;
            }
            let dx = series.cursor_x[i + 1] - series.cursor_x[i];
            let dy = series.cursor_y[i + 1] - series.cursor_y[i];
            (dx * dx + dy * dy).sqrt() / dt
        })
        .collect();

    let mut speeds = Vec::new();
    let mut error_sds = Vec::new();
    let mut start = 0usize;
    while start + NOISE_WINDOW <= n {
        let speed_end = (start + NOISE_WINDOW - 1).min(speed.len());
        let mean_speed = dsp::mean(&speed[start..speed_end]);
        if mean_speed > NOISE_MIN_SPEED {
            speeds.push(mean_speed);
            error_sds.push(dsp::std_dev(&error_mag[start..start + NOISE_WINDOW]));
        }
        start += NOISE_WINDOW_STEP;
    }
    if speeds.len() < NOISE_MIN_WINDOWS {
        return SignalNoiseFeatures::default();
    }
    SignalNoiseFeatures {
        valid: true,
        correlation: dsp::pearson(&speeds, &error_sds),
        slope: dsp::linear_regression(&speeds, &error_sds).slope,
        window_count: speeds.len(),
    }
}

/// Ratio of vertical to horizontal displacement over the 400 ms following
/// each pulse. Mechanical playback that mirrors only the displaced axis
/// shows near-zero coupling.
pub fn cross_axis(series: &TrackingSeries, pulses: &[PulseEvent]) -> CrossAxisFeatures {
    let mut ratios = Vec::new();
    for pulse in pulses {
        let in_window: Vec<usize> = (0..series.len())
            .filter(|&i| {
                series.t[i] >= pulse.start_ms && series.t[i] < pulse.start_ms + CROSS_AXIS_WINDOW_MS
            })
            .collect();
        let (Some(&first), Some(&last)) = (in_window.first(), in_window.last()) else {
            continue;
        };
        if first == last {
            continue;
        }
        let dx = series.cursor_x[last] - series.cursor_x[first];
        let dy = series.cursor_y[last] - series.cursor_y[first];
        if dx.abs() <= CROSS_AXIS_MIN_DX {
            continue;
        }
        ratios.push((dy / dx).abs());
    }
    if ratios.len() < 2 {
        return CrossAxisFeatures::default();
    }
    CrossAxisFeatures {
        valid: true,
        mean_ratio: dsp::mean(&ratios),
        sd_ratio: dsp::std_dev(&ratios),
        pulse_count: ratios.len(),
    }
}

/// Correction signal for one pulse: cursor x with the pre-pulse linear
/// motion subtracted, normalized by the signed pulse amplitude so 1.0 means
/// a completed correction in the displaced direction.
fn correction_trace(
    series: &TrackingSeries,
    pulse: &PulseEvent,
) -> Option<Vec<(f64, f64)>> {
    if pulse.amp_x == 0.0 {
        return None;
    }
    let mut pre_t = Vec::new();
    let mut pre_x = Vec::new();
    let mut post = Vec::new();
    for i in 0..series.len() {
        let dt = series.t[i] - pulse.start_ms;
        if (-PULSE_PRE_MS..0.0).contains(&dt) {
            pre_t.push(dt);
            pre_x.push(series.cursor_x[i]);
        } else if (0.0..PULSE_POST_MS).contains(&dt) {
            post.push((dt, series.cursor_x[i]));
        }
    }
    if pre_t.len() < 3 || post.len() < 5 {
        return None;
    }
    let baseline = dsp::linear_regression(&pre_t, &pre_x);
    Some(
        post.into_iter()
            .map(|(dt, x)| {
                let extrapolated = baseline.intercept + baseline.slope * dt;
                (dt, (x - extrapolated) / pulse.amp_x)
            })
            .collect(),
    )
}

/// True when the correction is above threshold at `idx` and stays above the
/// sustain threshold for the following 40 ms of samples.
fn sustained(trace: &[(f64, f64)], idx: usize) -> bool {
    let (dt0, c0) = trace[idx];
    if c0 <= ONSET_THRESHOLD {
        return false;
    }
    trace[idx + 1..]
        .iter()
        .take_while(|(dt, _)| *dt <= dt0 + ONSET_SUSTAIN_MS)
        .all(|(_, c)| *c > ONSET_SUSTAIN_THRESHOLD)
}

/// Reaction latency to each displacement pulse. A correction already
/// sustained before 80 ms is an instantaneous (machine-like) response and
/// produces no detection.
pub fn pulse_response(
    series: &TrackingSeries,
    pulses: &[PulseEvent],
) -> (PulseFeatures, Vec<PulseDetection>) {
    let mut detections = Vec::new();
    'pulses: for pulse in pulses {
        let Some(trace) = correction_trace(series, pulse) else {
            continue;
        };
        let mut onset = None;
        for idx in 0..trace.len() {
            if !sustained(&trace, idx) {
                continue;
            }
            if trace[idx].0 < ONSET_MIN_MS {
                continue 'pulses;
            }
            onset = Some(idx);
            break;
        }
        let Some(onset_idx) = onset else { continue };
        let latency_ms = trace[onset_idx].0;
        let (peak_ms, peak_correction) = trace[onset_idx..]
            .iter()
            .copied()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or(trace[onset_idx]);
        detections.push(PulseDetection {
            latency_ms,
            peak_ms,
            peak_correction,
            trace: trace
                .into_iter()
                .filter(|(dt, _)| *dt >= latency_ms && *dt <= peak_ms)
                .collect(),
        });
    }

    let features = if detections.len() >= 2 {
        let latencies: Vec<f64> = detections.iter().map(|d| d.latency_ms).collect();
        let overshoots: Vec<f64> = detections
            .iter()
            .map(|d| (d.peak_correction - 1.0).max(0.0))
            .collect();
        PulseFeatures {
            valid: true,
            latency_mean_ms: dsp::mean(&latencies),
            latency_sd_ms: dsp::std_dev(&latencies),
            mean_overshoot: dsp::mean(&overshoots),
            detected: detections.len(),
        }
    } else {
        PulseFeatures {
            detected: detections.len(),
            ..PulseFeatures::default()
        }
    };
    (features, detections)
}

fn min_jerk_blend(tau: f64) -> f64 {
    let t3 = tau * tau * tau;
    t3 * (10.0 - 15.0 * tau + 6.0 * tau * tau)
}

/// Goodness of fit of each detected correction against the quintic
/// minimum-jerk profile between onset and peak.
pub fn min_jerk(detections: &[PulseDetection]) -> MinJerkFeatures {
    let mut r_squareds = Vec::new();
    for detection in detections {
        let span = detection.peak_ms - detection.latency_ms;
        if detection.trace.len() < MIN_JERK_MIN_SAMPLES || span < MIN_JERK_MIN_SPAN_MS {
            continue;
        }
        let c0 = detection.trace[0].1;
        let cf = detection.peak_correction;
        let observed: Vec<f64> = detection.trace.iter().map(|(_, c)| *c).collect();
        let modeled: Vec<f64> = detection
            .trace
            .iter()
            .map(|(dt, _)| {
                let tau = ((dt - detection.latency_ms) / span).clamp(0.0, 1.0);
                c0 + (cf - c0) * min_jerk_blend(tau)
            })
            .collect();
        let mean_obs = dsp::mean(&observed);
        let ss_tot: f64 = observed.iter().map(|o| (o - mean_obs) * (o - mean_obs)).sum();
        if ss_tot <= 0.0 {
            continue;
        }
        let ss_res: f64 = observed
            .iter()
            .zip(modeled.iter())
            .map(|(o, m)| (o - m) * (o - m))
            .sum();
        r_squareds.push((1.0 - ss_res / ss_tot).clamp(0.0, 1.0));
    }
    if r_squareds.is_empty() {
        return MinJerkFeatures::default();
    }
    MinJerkFeatures {
        valid: true,
        mean_r_squared: dsp::mean(&r_squareds),
        fitted: r_squareds.len(),
    }
}
