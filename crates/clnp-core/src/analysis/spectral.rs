// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! Frequency-domain metrics: probe transfer function, cursor and
//! accelerometer tremor bands, and the 1/f noise slope.

use super::{AccelSample, TrackingSeries};
use crate::dsp;
use serde::Serialize;
use std::f64::consts::TAU;

const COHERENCE_FLOOR: f64 = 0.15;
const TREMOR_BAND_LO: f64 = 8.0;
const TREMOR_BAND_HI: f64 = 12.0;
const MIN_SPECTRAL_SAMPLES: usize = 64;
const MIN_TREMOR_SAMPLES: usize = 32;
const MIN_ONE_OVER_F_POINTS: usize = 8;

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransferFeatures {
    pub valid: bool,
    pub has_rolloff: bool,
    pub mean_delay_ms: f64,
    pub delay_plausible: bool,
    pub coherent_probes: usize,
    pub probe_gains: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TremorFeatures {
    pub valid: bool,
    pub ratio: f64,
    pub peak_freq_hz: f64,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OneOverFFeatures {
    pub valid: bool,
    pub slope: f64,
    pub r_squared: f64,
}

/// Transfer function between the injected perturbation and the cursor's
/// residual against the smooth path, evaluated at the probe frequencies.
pub fn transfer_pipeline(series: &TrackingSeries, probe_freqs: &[f64]) -> TransferFeatures {
    let rate = series.sample_rate_hz;
    if rate <= 0.0 || probe_freqs.is_empty() {
        return TransferFeatures::default();
    }
    let stimulus = dsp::resample_uniform(&series.t, &series.pert_x, rate);
    let response = dsp::resample_uniform(&series.t, &series.path_residual_x(), rate);
    let len = stimulus.values.len().min(response.values.len());
    if len < MIN_SPECTRAL_SAMPLES {
        return TransferFeatures::default();
    }
    let tf = dsp::transfer_function(&stimulus.values[..len], &response.values[..len], rate);
    if tf.len() < 2 {
        return TransferFeatures::default();
    }
    let fft_n = (tf.len() - 1) * 2;

    let points: Vec<dsp::TransferPoint> = probe_freqs
        .iter()
        .map(|&freq| {
            let bin = ((freq * fft_n as f64 / rate).round() as usize).clamp(1, tf.len() - 1);
            tf[bin]
        })
        .collect();
    let probe_gains: Vec<f64> = points.iter().map(|p| p.gain).collect();

    let mut run = 0usize;
    let mut longest_run = 0usize;
    for pair in probe_gains.windows(2) {
        if pair[1] < pair[0] {
            run += 1;
            longest_run = longest_run.max(run);
        } else {
            run = 0;
        }
    }
    let has_rolloff = longest_run >= 2;

    let mut weighted = 0.0;
    let mut weight = 0.0;
    let mut coherent_probes = 0usize;
    for (point, &freq) in points.iter().zip(probe_freqs) {
        if point.coherence <= COHERENCE_FLOOR {
            continue;
        }
        coherent_probes += 1;
        let delay_ms = -point.phase_rad / (TAU * freq) * 1000.0;
        if delay_ms > 0.0 && delay_ms < 1000.0 {
            weighted += point.coherence * delay_ms;
            weight += point.coherence;
        }
    }
    let mean_delay_ms = if weight > 0.0 { weighted / weight } else { 0.0 };

    TransferFeatures {
        valid: true,
        has_rolloff,
        mean_delay_ms,
        delay_plausible: mean_delay_ms > 30.0 && mean_delay_ms < 500.0,
        coherent_probes,
        probe_gains,
    }
}

/// Power ratio of the 8–12 Hz band of a detrended speed signal against all
/// supra-1 Hz power, plus the in-band peak frequency.
fn band_ratio(signal: &[f64], rate: f64) -> TremorFeatures {
    if signal.len() < MIN_TREMOR_SAMPLES || rate <= 0.0 {
        return TremorFeatures::default();
    }
    let window = ((rate / 3.0).round() as usize).max(1);
    let trend = dsp::moving_average(signal, window);
    let residual: Vec<f64> = signal.iter().zip(trend.iter()).map(|(s, m)| s - m).collect();
    let spectrum = dsp::psd(&residual, rate);

    let band = dsp::band_power(&spectrum, TREMOR_BAND_LO, TREMOR_BAND_HI);
    let total: f64 = spectrum
        .freqs
        .iter()
        .zip(spectrum.power.iter())
        .filter(|(f, _)| **f > 1.0)
        .map(|(_, p)| *p)
        .sum();
    let ratio = if total > 0.0 { band / total } else { 0.0 };

    let peak_freq_hz = spectrum
        .freqs
        .iter()
        .zip(spectrum.power.iter())
        .filter(|(f, _)| **f >= TREMOR_BAND_LO && **f <= TREMOR_BAND_HI)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(f, _)| *f)
        .unwrap_or(0.0);

    TremorFeatures {
        valid: true,
        ratio,
        peak_freq_hz,
    }
}

/// Physiological tremor in cursor speed, capped at 120 Hz analysis rate.
pub fn cursor_tremor(series: &TrackingSeries) -> TremorFeatures {
    let rate = series.sample_rate_hz.min(120.0);
    if rate <= 0.0 {
        return TremorFeatures::default();
    }
    let rx = dsp::resample_uniform(&series.t, &series.cursor_x, rate);
    let ry = dsp::resample_uniform(&series.t, &series.cursor_y, rate);
    let n = rx.values.len().min(ry.values.len());
    if n < 2 {
        return TremorFeatures::default();
    }
    let step_s = rx.step_ms / 1000.0;
    let speed: Vec<f64> = (0..n - 1)
        .map(|i| {
            let vx = (rx.values[i + 1] - rx.values[i]) / step_s;
            let vy = (ry.values[i + 1] - ry.values[i]) / step_s;
            (vx * vx + vy * vy).sqrt()
        })
        .collect();
    band_ratio(&speed, rate)
}

/// Tremor in accelerometer magnitude. Requires a device stream of at least
/// 20 Hz, estimated over the first 500 samples.
pub fn accel_tremor(accel: &[AccelSample]) -> TremorFeatures {
    if accel.len() < MIN_TREMOR_SAMPLES {
        return TremorFeatures::default();
    }
    let times: Vec<f64> = accel.iter().map(|s| s.0).collect();
    let rate = dsp::estimate_sample_rate(&times, 500);
    if rate < 20.0 {
        return TremorFeatures::default();
    }
    let magnitude: Vec<f64> = accel
        .iter()
        .map(|&(_, ax, ay, az)| (ax * ax + ay * ay + az * az).sqrt())
        .collect();
    let analysis_rate = rate.min(100.0);
    let resampled = dsp::resample_uniform(&times, &magnitude, analysis_rate);
    band_ratio(&resampled.values, analysis_rate)
}

/// Log-log spectral slope of the positional error velocity. Biological
/// motor noise falls off roughly as 1/f^α.
pub fn one_over_f(series: &TrackingSeries) -> OneOverFFeatures {
    let rate = series.sample_rate_hz;
    if rate <= 0.0 {
        return OneOverFFeatures::default();
    }
    let error = dsp::resample_uniform(&series.t, &series.error_x(), rate);
    if error.values.len() < 3 {
        return OneOverFFeatures::default();
    }
    let step_s = error.step_ms / 1000.0;
    let error_velocity: Vec<f64> = error
        .values
        .windows(2)
        .map(|w| (w[1] - w[0]) / step_s)
        .collect();
    let spectrum = dsp::psd(&error_velocity, rate);

    let mut log_f = Vec::new();
    let mut log_p = Vec::new();
    for (f, p) in spectrum.freqs.iter().zip(spectrum.power.iter()) {
        if *f >= 0.3 && *f <= rate / 4.0 && *p > 0.0 {
            log_f.push(f.log10());
            log_p.push(p.log10());
        }
    }
    if log_f.len() < MIN_ONE_OVER_F_POINTS {
        return OneOverFFeatures::default();
    }
    let fit = dsp::linear_regression(&log_f, &log_p);
    OneOverFFeatures {
        valid: true,
        slope: fit.slope,
        r_squared: fit.r_squared,
    }
}
