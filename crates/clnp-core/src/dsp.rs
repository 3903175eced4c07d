// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared signal-processing kernel for the analysis battery.
//!
//! All spectral routines operate on dense `f64` slices, window with Hann,
//! zero-pad to a power of two, and report the half-spectrum. Timestamps are
//! milliseconds throughout; frequencies are Hz.

use num_complex::Complex64;
use rustfft::FftPlanner;
use std::f64::consts::PI;

const EPS: f64 = 1e-12;

/// Forward FFT of a real signal: Hann window, then zero-pad to the next
/// power of two. Returns the full complex spectrum (length = padded size).
pub fn windowed_fft(signal: &[f64]) -> Vec<Complex64> {
    let n = signal.len().next_power_of_two().max(2);
    let mut buf: Vec<Complex64> = hann_window(signal)
        .into_iter()
        .map(|x| Complex64::new(x, 0.0))
        .collect();
    buf.resize(n, Complex64::new(0.0, 0.0));
    FftPlanner::new().plan_fft_forward(n).process(&mut buf);
    buf
}

/// Forward FFT without windowing or padding; `data.len()` must already be a
/// power of two.
pub fn fft(data: &mut [Complex64]) {
    FftPlanner::new()
        .plan_fft_forward(data.len())
        .process(data);
}

/// Inverse FFT with 1/N scaling so `ifft(fft(x)) == x`.
pub fn ifft(data: &mut [Complex64]) {
    let n = data.len();
    FftPlanner::new().plan_fft_inverse(n).process(data);
    let scale = 1.0 / n as f64;
    for v in data.iter_mut() {
        *v *= scale;
    }
}

/// Applies a Hann window, leaving signals of length <= 1 untouched.
pub fn hann_window(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n <= 1 {
        return signal.to_vec();
    }
    let denom = (n - 1) as f64;
    signal
        .iter()
        .enumerate()
        .map(|(i, &x)| x * 0.5 * (1.0 - (2.0 * PI * i as f64 / denom).cos()))
        .collect()
}

/// One-sided power spectral density with matching bin frequencies.
pub struct Psd {
    pub freqs: Vec<f64>,
    pub power: Vec<f64>,
}

pub fn psd(signal: &[f64], sample_rate_hz: f64) -> Psd {
    if signal.is_empty() || sample_rate_hz <= 0.0 {
        return Psd {
            freqs: Vec::new(),
            power: Vec::new(),
        };
    }
    let spectrum = windowed_fft(signal);
    let n = spectrum.len();
    let n_f = n as f64;
    let half = n / 2;
    let freqs = (0..=half).map(|i| i as f64 * sample_rate_hz / n_f).collect();
    let power = (0..=half).map(|i| spectrum[i].norm_sqr() / n_f).collect();
    Psd { freqs, power }
}

/// Per-bin input/output relationship between a stimulus and a response.
#[derive(Debug, Clone, Copy)]
pub struct TransferPoint {
    pub freq_hz: f64,
    pub gain: f64,
    pub phase_rad: f64,
    pub coherence: f64,
}

/// Single-shot transfer function estimate between `input` and `output`,
/// regularized so silent bins report near-zero coherence rather than NaN.
///
/// The cross-spectrum is `conj(X)·Y`, so an output lagging the input by τ
/// carries phase `-2πfτ` and the delay estimate `-phase/(2πf)` is positive.
pub fn transfer_function(input: &[f64], output: &[f64], sample_rate_hz: f64) -> Vec<TransferPoint> {
    let len = input.len().min(output.len());
    if len < 2 || sample_rate_hz <= 0.0 {
        return Vec::new();
    }
    let x = windowed_fft(&input[..len]);
    let y = windowed_fft(&output[..len]);
    let n = x.len();
    let n_f = n as f64;
    (0..=n / 2)
        .map(|i| {
            let sxy = x[i].conj() * y[i];
            let sxx = x[i].norm_sqr() + EPS;
            let syy = y[i].norm_sqr() + EPS;
            TransferPoint {
                freq_hz: i as f64 * sample_rate_hz / n_f,
                gain: sxy.norm() / sxx,
                phase_rad: sxy.arg(),
                coherence: sxy.norm_sqr() / (sxx * syy),
            }
        })
        .collect()
}

/// A signal resampled onto a uniform grid.
#[derive(Debug, Clone)]
pub struct Resampled {
    pub start_ms: f64,
    pub step_ms: f64,
    pub values: Vec<f64>,
}

impl Resampled {
    pub fn rate_hz(&self) -> f64 {
        1000.0 / self.step_ms
    }

    pub fn time_at(&self, index: usize) -> f64 {
        self.start_ms + index as f64 * self.step_ms
    }
}

/// Piecewise-linear resampling of irregular samples onto `target_rate_hz`.
/// The grid spans [first, last] timestamp inclusive of the start.
pub fn resample_uniform(times_ms: &[f64], values: &[f64], target_rate_hz: f64) -> Resampled {
    let n = times_ms.len().min(values.len());
    if n == 0 || target_rate_hz <= 0.0 {
        return Resampled {
            start_ms: 0.0,
            step_ms: 1000.0 / target_rate_hz.max(1.0),
            values: Vec::new(),
        };
    }
    let step = 1000.0 / target_rate_hz;
    let start = times_ms[0];
    let end = times_ms[n - 1];
    let count = if end > start {
        ((end - start) / step).floor() as usize + 1
    } else {
        1
    };

    let mut out = Vec::with_capacity(count);
    let mut seg = 0usize;
    for i in 0..count {
        let t = start + i as f64 * step;
        while seg + 1 < n && times_ms[seg + 1] < t {
            seg += 1;
        }
        if seg + 1 >= n {
            out.push(values[n - 1]);
            continue;
        }
        let t0 = times_ms[seg];
        let t1 = times_ms[seg + 1];
        let span = t1 - t0;
        if span <= 0.0 {
            out.push(values[seg]);
        } else {
            let frac = ((t - t0) / span).clamp(0.0, 1.0);
            out.push(values[seg] + (values[seg + 1] - values[seg]) * frac);
        }
    }
    Resampled {
        start_ms: start,
        step_ms: step,
        values: out,
    }
}

/// Forward-difference velocity in units/second over irregular timestamps.
/// Pairs with non-positive dt are skipped.
pub fn velocity(times_ms: &[f64], values: &[f64]) -> Vec<f64> {
    let n = times_ms.len().min(values.len());
    let mut out = Vec::with_capacity(n.saturating_sub(1));
    for i in 0..n.saturating_sub(1) {
        let dt = (times_ms[i + 1] - times_ms[i]) / 1000.0;
        if dt <= 0.0 {
            continue;
        }
        out.push((values[i + 1] - values[i]) / dt);
    }
    out
}

/// Centered moving average; window is clamped to the signal bounds.
pub fn moving_average(signal: &[f64], window: usize) -> Vec<f64> {
    let n = signal.len();
    let w = window.max(1);
    let half = w / 2;
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            signal[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64).sqrt()
}

#[derive(Debug, Clone, Copy)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Ordinary least squares over paired slices; zero-variance x yields a flat
/// fit with r² = 0.
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Regression {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return Regression {
            slope: 0.0,
            intercept: if n == 1 { ys[0] } else { 0.0 },
            r_squared: 0.0,
        };
    }
    let mx = mean(&xs[..n]);
    let my = mean(&ys[..n]);
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for i in 0..n {
        sxx += (xs[i] - mx) * (xs[i] - mx);
        sxy += (xs[i] - mx) * (ys[i] - my);
    }
    if sxx <= 0.0 {
        return Regression {
            slope: 0.0,
            intercept: my,
            r_squared: 0.0,
        };
    }
    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for i in 0..n {
        let pred = intercept + slope * xs[i];
        ss_res += (ys[i] - pred) * (ys[i] - pred);
        ss_tot += (ys[i] - my) * (ys[i] - my);
    }
    let r_squared = if ss_tot > 0.0 {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Regression {
        slope,
        intercept,
        r_squared,
    }
}

/// Pearson correlation; either series having zero variance yields 0.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let mx = mean(&xs[..n]);
    let my = mean(&ys[..n]);
    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for i in 0..n {
        sxx += (xs[i] - mx) * (xs[i] - mx);
        syy += (ys[i] - my) * (ys[i] - my);
        sxy += (xs[i] - mx) * (ys[i] - my);
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return 0.0;
    }
    sxy / (sxx.sqrt() * syy.sqrt())
}

/// Mean sampling rate in Hz estimated from (at most) the leading
/// `max_samples` timestamps. Non-positive intervals are ignored.
pub fn estimate_sample_rate(times_ms: &[f64], max_samples: usize) -> f64 {
    let n = times_ms.len().min(max_samples);
    let mut total = 0.0;
    let mut count = 0usize;
    for i in 0..n.saturating_sub(1) {
        let dt = times_ms[i + 1] - times_ms[i];
        if dt > 0.0 {
            total += dt;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    1000.0 / (total / count as f64)
}

/// Sum of PSD power over bins with frequency in [lo, hi].
pub fn band_power(psd: &Psd, lo_hz: f64, hi_hz: f64) -> f64 {
    psd.freqs
        .iter()
        .zip(psd.power.iter())
        .filter(|(f, _)| **f >= lo_hz && **f <= hi_hz)
        .map(|(_, p)| *p)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq_hz: f64, rate_hz: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq_hz * i as f64 / rate_hz).sin())
            .collect()
    }

    #[test]
    fn fft_round_trip_reconstructs_input() {
        for n in [64usize, 128, 256] {
            let original: Vec<Complex64> = (0..n)
                .map(|i| Complex64::new((i as f64 * 0.37).sin(), (i as f64 * 0.11).cos()))
                .collect();
            let mut buf = original.clone();
            fft(&mut buf);
            ifft(&mut buf);
            let norm: f64 = original.iter().map(|v| v.norm()).sum::<f64>() / n as f64;
            for (a, b) in original.iter().zip(buf.iter()) {
                assert!((a - b).norm() / norm < 1e-9, "n={n}");
            }
        }
    }

    #[test]
    fn psd_peaks_at_signal_frequency() {
        let rate = 100.0;
        let signal = sine(10.0, rate, 512);
        let spectrum = psd(&signal, rate);
        let peak = spectrum
            .power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| spectrum.freqs[i])
            .unwrap();
        assert!((peak - 10.0).abs() < 0.5, "peak at {peak}");
    }

    #[test]
    fn transfer_function_recovers_pure_delay() {
        let rate = 100.0;
        let delay_s = 0.10;
        let freq = 2.0;
        let n = 1024;
        let input = sine(freq, rate, n);
        let output: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * freq * (i as f64 / rate - delay_s)).sin())
            .collect();
        let tf = transfer_function(&input, &output, rate);
        let fft_n = (tf.len() - 1) * 2;
        let bin = (freq * fft_n as f64 / rate).round() as usize;
        let point = tf[bin];
        let delay_est = -point.phase_rad / (2.0 * PI * point.freq_hz);
        assert!((delay_est - delay_s).abs() < 0.02, "delay {delay_est}");
        assert!(point.coherence > 0.5);
    }

    #[test]
    fn hann_window_tapers_endpoints() {
        let w = hann_window(&[1.0; 64]);
        assert!(w[0].abs() < 1e-12);
        assert!(w[63].abs() < 1e-12);
        assert!((w[32] - 1.0).abs() < 0.01);
    }

    #[test]
    fn resample_linear_segments_exactly() {
        let ts = [0.0, 10.0, 30.0];
        let vs = [0.0, 10.0, 50.0];
        let out = resample_uniform(&ts, &vs, 200.0);
        assert_eq!(out.step_ms, 5.0);
        assert_eq!(out.values.len(), 7);
        assert!((out.values[1] - 5.0).abs() < 1e-12);
        assert!((out.values[3] - 20.0).abs() < 1e-12);
        assert!((out.values[6] - 50.0).abs() < 1e-12);
    }

    #[test]
    fn velocity_skips_non_positive_dt() {
        let ts = [0.0, 10.0, 10.0, 20.0];
        let vs = [0.0, 1.0, 5.0, 6.0];
        let v = velocity(&ts, &vs);
        assert_eq!(v.len(), 2);
        assert!((v[0] - 100.0).abs() < 1e-12);
        assert!((v[1] - 100.0).abs() < 1e-12);
    }

    #[test]
    fn regression_fits_exact_line() {
        let xs: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 * x - 7.0).collect();
        let fit = linear_regression(&xs, &ys);
        assert!((fit.slope - 3.0).abs() < 1e-9);
        assert!((fit.intercept + 7.0).abs() < 1e-9);
        assert!(fit.r_squared > 0.999_999);
    }

    #[test]
    fn pearson_guards_zero_variance() {
        let flat = [4.0; 10];
        let ramp: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert_eq!(pearson(&flat, &ramp), 0.0);
        assert!((pearson(&ramp, &ramp) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sample_rate_from_leading_window() {
        let ts: Vec<f64> = (0..100).map(|i| i as f64 * 16.0).collect();
        let rate = estimate_sample_rate(&ts, 500);
        assert!((rate - 62.5).abs() < 0.01);
    }

    #[test]
    fn moving_average_is_length_preserving() {
        let signal: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let ma = moving_average(&signal, 5);
        assert_eq!(ma.len(), signal.len());
        assert!((ma[10] - 10.0).abs() < 1e-12);
    }
}
