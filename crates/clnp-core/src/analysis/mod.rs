// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! The biomechanical analysis battery.
//!
//! Every metric is a pure function over a [`TrackingSeries`] (raw cursor
//! samples joined with the server-reconstructed target) returning a typed
//! feature struct with a `valid` flag. Invalid metrics take no weight in
//! scoring. The battery itself never touches I/O and propagates no panics;
//! hard failures surface as [`AnalysisError`].

pub mod cognitive;
pub mod motor;
pub mod spectral;

use crate::challenge::{Challenge, Mode};
use crate::dsp;
use crate::error::{AnalysisError, AnalysisResult};
use crate::reconstruct::{self, CanvasSize, PhaseTimes};
use serde::{Deserialize, Serialize};

pub use cognitive::CognitiveFeatures;
pub use motor::{CrossAxisFeatures, MinJerkFeatures, PulseFeatures, SignalNoiseFeatures};
pub use spectral::{OneOverFFeatures, TransferFeatures, TremorFeatures};

/// Raw pointer sample: (ms since navigation start, x, y).
pub type PointerSample = (f64, f64, f64);

/// Embedded pointer sample: (wall ms, cumulative hover ms, x, y, element index).
pub type EmbedPointerSample = (f64, f64, f64, f64, i64);

/// Accelerometer sample: (ms, ax, ay, az).
pub type AccelSample = (f64, f64, f64, f64);

/// Tracked element geometry reported by the embedded client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ElementRect {
    pub index: i64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Dense column-oriented view of one session's tracking data. The time
/// axis is wall milliseconds for standalone sessions and cumulative hover
/// milliseconds for embedded ones.
#[derive(Debug, Clone, Default)]
pub struct TrackingSeries {
    pub t: Vec<f64>,
    pub cursor_x: Vec<f64>,
    pub cursor_y: Vec<f64>,
    pub target_x: Vec<f64>,
    pub target_y: Vec<f64>,
    pub pert_x: Vec<f64>,
    pub pert_y: Vec<f64>,
    pub sample_rate_hz: f64,
}

impl TrackingSeries {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn error_x(&self) -> Vec<f64> {
        self.cursor_x
            .iter()
            .zip(self.target_x.iter())
            .map(|(c, t)| c - t)
            .collect()
    }

    pub fn error_mag(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| {
                let ex = self.cursor_x[i] - self.target_x[i];
                let ey = self.cursor_y[i] - self.target_y[i];
                (ex * ex + ey * ey).sqrt()
            })
            .collect()
    }

    /// Residual of the cursor against the smooth path only, i.e. the part
    /// of the motion attributable to the injected perturbation plus the
    /// controller's own noise.
    pub fn path_residual_x(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| self.cursor_x[i] - (self.target_x[i] - self.pert_x[i]))
            .collect()
    }
}

/// A pulse on the series time axis.
#[derive(Debug, Clone, Copy)]
pub struct PulseEvent {
    pub start_ms: f64,
    pub amp_x: f64,
}

/// A cognitive flash on the series time axis.
#[derive(Debug, Clone, Copy)]
pub struct FlashEvent {
    pub at_ms: f64,
    pub is_target: bool,
}

/// Everything the battery consumes beyond the series itself.
#[derive(Debug, Clone, Default)]
pub struct BatteryInput {
    pub probe_freqs: Vec<f64>,
    pub pulses: Vec<PulseEvent>,
    pub flashes: Vec<FlashEvent>,
    pub accel: Vec<AccelSample>,
    pub cog_answer: Option<i64>,
    pub cog_true_count: Option<u32>,
}

impl BatteryInput {
    /// Assembles the battery input for a standalone session: pulse and
    /// flash offsets are shifted onto the wall-time axis.
    pub fn standalone(
        challenge: &Challenge,
        phases: &PhaseTimes,
        accel: Vec<AccelSample>,
        cog_answer: Option<i64>,
    ) -> Self {
        Self {
            probe_freqs: challenge.probes.iter().map(|p| p.freq_hz).collect(),
            pulses: challenge
                .pulses
                .iter()
                .map(|p| PulseEvent {
                    start_ms: phases.tracking_start + p.at_ms,
                    amp_x: p.amp_x,
                })
                .collect(),
            flashes: challenge
                .cog
                .as_ref()
                .map(|cog| {
                    cog.flashes
                        .iter()
                        .map(|f| FlashEvent {
                            at_ms: phases.dualtask_start + f.at_ms,
                            is_target: f.is_target,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            accel,
            cog_answer,
            cog_true_count: challenge.cog.as_ref().map(|c| c.target_count),
        }
    }

    /// Battery input for an embedded session: the pulse schedule already
    /// lives on the hover-time axis and there is no cognitive task.
    pub fn embed(challenge: &Challenge, accel: Vec<AccelSample>) -> Self {
        Self {
            probe_freqs: challenge.probes.iter().map(|p| p.freq_hz).collect(),
            pulses: challenge
                .pulses
                .iter()
                .map(|p| PulseEvent {
                    start_ms: p.at_ms,
                    amp_x: p.amp_x,
                })
                .collect(),
            flashes: Vec::new(),
            accel,
            cog_answer: None,
            cog_true_count: None,
        }
    }
}

/// Joins raw standalone pointer samples with the reconstructed target.
/// Samples before the tracking phase or after the test end are discarded;
/// out-of-order timestamps are dropped rather than reordered.
pub fn build_standalone_series(
    challenge: &Challenge,
    phases: &PhaseTimes,
    canvas: CanvasSize,
    pointer: &[PointerSample],
) -> AnalysisResult<TrackingSeries> {
    let mut series = TrackingSeries::default();
    let mut last_t = f64::NEG_INFINITY;
    for &(t, x, y) in pointer {
        if !t.is_finite() || !x.is_finite() || !y.is_finite() {
            return Err(AnalysisError::NonFinite("pointer"));
        }
        if t < last_t || t > phases.test_end {
            continue;
        }
        let Some(recon) = reconstruct::reconstruct_standalone(challenge, phases, canvas, t) else {
            continue;
        };
        last_t = t;
        series.t.push(t);
        series.cursor_x.push(x);
        series.cursor_y.push(y);
        series.target_x.push(recon.target_x);
        series.target_y.push(recon.target_y);
        series.pert_x.push(recon.pert_x);
        series.pert_y.push(recon.pert_y);
    }
    if series.len() < 2 {
        return Err(AnalysisError::EmptySeries);
    }
    series.sample_rate_hz = dsp::estimate_sample_rate(&series.t, series.len());
    Ok(series)
}

/// Joins embedded pointer samples with element-relative targets on the
/// hover-time axis. Samples off every tracked element are dropped.
pub fn build_embed_series(
    challenge: &Challenge,
    pointer: &[EmbedPointerSample],
    elements: &[ElementRect],
) -> AnalysisResult<TrackingSeries> {
    let mut series = TrackingSeries::default();
    let mut last_hover = f64::NEG_INFINITY;
    for &(_wall, hover, x, y, element_idx) in pointer {
        if !hover.is_finite() || !x.is_finite() || !y.is_finite() {
            return Err(AnalysisError::NonFinite("pointer"));
        }
        if element_idx < 0 || hover < last_hover {
            continue;
        }
        let Some(rect) = elements.iter().find(|e| e.index == element_idx) else {
            continue;
        };
        last_hover = hover;
        let recon = reconstruct::embed_perturbation(challenge, hover);
        series.t.push(hover);
        series.cursor_x.push(x);
        series.cursor_y.push(y);
        series
            .target_x
            .push(rect.x + rect.width / 2.0 + recon.pert_x);
        series
            .target_y
            .push(rect.y + rect.height / 2.0 + recon.pert_y);
        series.pert_x.push(recon.pert_x);
        series.pert_y.push(recon.pert_y);
    }
    if series.len() < 2 {
        return Err(AnalysisError::EmptySeries);
    }
    series.sample_rate_hz = dsp::estimate_sample_rate(&series.t, series.len());
    Ok(series)
}

/// The full feature set for one session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub transfer: TransferFeatures,
    pub cursor_tremor: TremorFeatures,
    pub accel_tremor: TremorFeatures,
    pub one_over_f: OneOverFFeatures,
    pub signal_noise: SignalNoiseFeatures,
    pub cross_axis: CrossAxisFeatures,
    pub pulse: PulseFeatures,
    pub cognitive: CognitiveFeatures,
    pub min_jerk: MinJerkFeatures,
    pub sample_rate_hz: f64,
    pub sample_count: usize,
}

/// Runs every pipeline. Pulse-correction detections are computed once and
/// shared between the latency metric and the minimum-jerk fit.
pub fn run_battery(series: &TrackingSeries, input: &BatteryInput, mode: Mode) -> AnalysisReport {
    let (pulse, detections) = motor::pulse_response(series, &input.pulses);
    AnalysisReport {
        transfer: spectral::transfer_pipeline(series, &input.probe_freqs),
        cursor_tremor: spectral::cursor_tremor(series),
        accel_tremor: spectral::accel_tremor(&input.accel),
        one_over_f: spectral::one_over_f(series),
        signal_noise: motor::signal_dependent_noise(series),
        cross_axis: motor::cross_axis(series, &input.pulses),
        pulse,
        cognitive: if mode == Mode::Standalone {
            cognitive::interference(
                series,
                &input.flashes,
                input.cog_answer,
                input.cog_true_count,
            )
        } else {
            CognitiveFeatures::default()
        },
        min_jerk: motor::min_jerk(&detections),
        sample_rate_hz: series.sample_rate_hz,
        sample_count: series.len(),
    }
}
