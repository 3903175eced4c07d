// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! Server-secret scoring model.
//!
//! Each analysis metric folds into a sub-score in [0,1]; the aggregate is a
//! weighted average over the metrics that reported `valid`. None of the
//! weights or thresholds ever reach a client; the whole model lives in one
//! [`ScoringConfig`] built at startup and passed by reference so threshold
//! experiments touch exactly one place.

use crate::analysis::{AnalysisReport, TremorFeatures};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
pub struct Weights {
    pub transfer_fn: f64,
    pub tremor: f64,
    pub one_over_f: f64,
    pub signal_dep_noise: f64,
    pub cross_axis: f64,
    pub pulse_response: f64,
    pub cog_interference: f64,
    pub min_jerk: f64,
}

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub weights: Weights,
    pub biological_threshold: f64,
    pub uncertain_threshold: f64,
    pub embed_verified_threshold: f64,
    pub tremor_ratio_scale: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: Weights {
                transfer_fn: 3.0,
                tremor: 2.5,
                one_over_f: 2.0,
                signal_dep_noise: 2.5,
                cross_axis: 2.0,
                pulse_response: 3.0,
                cog_interference: 2.0,
                min_jerk: 1.5,
            },
            biological_threshold: 0.65,
            uncertain_threshold: 0.35,
            embed_verified_threshold: 0.60,
            tremor_ratio_scale: 0.015,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictClass {
    Biological,
    Uncertain,
    NonBiological,
}

impl VerdictClass {
    pub fn as_str(self) -> &'static str {
        match self {
            VerdictClass::Biological => "biological",
            VerdictClass::Uncertain => "uncertain",
            VerdictClass::NonBiological => "non-biological",
        }
    }

    pub fn verdict_text(self) -> &'static str {
        match self {
            VerdictClass::Biological => "BIOLOGICAL CONTROLLER DETECTED",
            VerdictClass::Uncertain => "UNCERTAIN - INSUFFICIENT EVIDENCE",
            VerdictClass::NonBiological => "NON-BIOLOGICAL CONTROLLER SUSPECTED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricScore {
    pub valid: bool,
    pub score: f64,
    pub features: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionScore {
    pub overall: f64,
    pub verdict: String,
    pub verdict_class: VerdictClass,
    pub valid_metrics: usize,
    pub metrics: BTreeMap<&'static str, MetricScore>,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Smooth indicator that `value` lies inside [lo, hi], with edge softness
/// proportional to the window width.
fn range_score(value: f64, lo: f64, hi: f64) -> f64 {
    let k = 10.0 / (hi - lo);
    sigmoid(k * (value - lo)) * sigmoid(k * (hi - value))
}

pub fn classify(cfg: &ScoringConfig, overall: f64) -> VerdictClass {
    if overall >= cfg.biological_threshold {
        VerdictClass::Biological
    } else if overall >= cfg.uncertain_threshold {
        VerdictClass::Uncertain
    } else {
        VerdictClass::NonBiological
    }
}

fn transfer_score(report: &AnalysisReport) -> Option<f64> {
    let f = &report.transfer;
    if !f.valid {
        return None;
    }
    let mut score: f64 = 0.0;
    if f.has_rolloff {
        score += 0.7;
    }
    if f.mean_delay_ms > 50.0 {
        score += 0.15;
    }
    if f.delay_plausible {
        score += 0.15;
    }
    Some(score.min(1.0))
}

fn tremor_sub_score(cfg: &ScoringConfig, f: &TremorFeatures) -> Option<f64> {
    if !f.valid {
        return None;
    }
    let mut score = (f.ratio / cfg.tremor_ratio_scale).min(1.0);
    if (7.0..=13.0).contains(&f.peak_freq_hz) {
        score += 0.2;
    }
    Some(score.min(1.0))
}

fn tremor_score(cfg: &ScoringConfig, report: &AnalysisReport) -> Option<f64> {
    let cursor = tremor_sub_score(cfg, &report.cursor_tremor);
    let accel = tremor_sub_score(cfg, &report.accel_tremor);
    match (cursor, accel) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) | (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}

fn one_over_f_score(report: &AnalysisReport) -> Option<f64> {
    let f = &report.one_over_f;
    if !f.valid {
        return None;
    }
    // Sigmoid-windowed indicator of slope ∈ [-2.5, 0], steepness 3.
    Some((sigmoid(3.0 * (f.slope + 2.5)) * sigmoid(3.0 * -f.slope)).clamp(0.0, 1.0))
}

fn signal_noise_score(report: &AnalysisReport) -> Option<f64> {
    let f = &report.signal_noise;
    if !f.valid {
        return None;
    }
    Some((f.correlation / 0.4).clamp(0.0, 1.0))
}

fn cross_axis_score(report: &AnalysisReport, touch: bool) -> Option<f64> {
    let f = &report.cross_axis;
    if !f.valid {
        return None;
    }
    let (ideal_max, denom) = if touch { (8.0, 1.0) } else { (2.0, 0.3) };
    let base = (f.mean_ratio / denom).min(1.0);
    Some(base * if f.mean_ratio < ideal_max { 1.0 } else { 0.5 })
}

fn pulse_score(report: &AnalysisReport) -> Option<f64> {
    let f = &report.pulse;
    if !f.valid {
        return None;
    }
    Some(
        0.6 * range_score(f.latency_mean_ms, 120.0, 380.0)
            + 0.4 * range_score(f.latency_sd_ms, 15.0, 180.0),
    )
}

fn cognitive_score(report: &AnalysisReport) -> Option<f64> {
    let f = &report.cognitive;
    if !f.valid {
        return None;
    }
    let mut score = 0.55 * (f.target_increase / 0.15).clamp(0.0, 1.0);
    if f.attention_effect > 0.02 {
        score += 0.2;
    }
    if let Some(answer) = f.answer {
        score += 0.1;
        if (answer - f.true_count as i64).abs() <= 1 {
            score += 0.15;
        }
    }
    Some(score.min(1.0))
}

fn min_jerk_score(report: &AnalysisReport) -> Option<f64> {
    let f = &report.min_jerk;
    if !f.valid {
        return None;
    }
    Some((f.mean_r_squared / 0.6).clamp(0.0, 1.0))
}

fn features_json<T: Serialize>(features: &T) -> Value {
    serde_json::to_value(features).unwrap_or(Value::Null)
}

/// Folds the analysis report into the session verdict.
pub fn score(cfg: &ScoringConfig, report: &AnalysisReport, touch_input: bool) -> SessionScore {
    let tremor_features = serde_json::json!({
        "cursor": features_json(&report.cursor_tremor),
        "accel": features_json(&report.accel_tremor),
    });
    let entries: [(&'static str, Option<f64>, f64, Value); 8] = [
        (
            "transferFn",
            transfer_score(report),
            cfg.weights.transfer_fn,
            features_json(&report.transfer),
        ),
        (
            "tremor",
            tremor_score(cfg, report),
            cfg.weights.tremor,
            tremor_features,
        ),
        (
            "oneOverF",
            one_over_f_score(report),
            cfg.weights.one_over_f,
            features_json(&report.one_over_f),
        ),
        (
            "signalDepNoise",
            signal_noise_score(report),
            cfg.weights.signal_dep_noise,
            features_json(&report.signal_noise),
        ),
        (
            "crossAxis",
            cross_axis_score(report, touch_input),
            cfg.weights.cross_axis,
            features_json(&report.cross_axis),
        ),
        (
            "pulseResponse",
            pulse_score(report),
            cfg.weights.pulse_response,
            features_json(&report.pulse),
        ),
        (
            "cogInterference",
            cognitive_score(report),
            cfg.weights.cog_interference,
            features_json(&report.cognitive),
        ),
        (
            "minJerk",
            min_jerk_score(report),
            cfg.weights.min_jerk,
            features_json(&report.min_jerk),
        ),
    ];

    let mut metrics = BTreeMap::new();
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    let mut valid_metrics = 0usize;
    for (name, sub_score, weight, features) in entries {
        let valid = sub_score.is_some();
        let value = sub_score.unwrap_or(0.0);
        if valid {
            weighted += weight * value;
            weight_sum += weight;
            valid_metrics += 1;
        }
        metrics.insert(
            name,
            MetricScore {
                valid,
                score: value,
                features,
            },
        );
    }

    let overall = if weight_sum > 0.0 {
        weighted / weight_sum
    } else {
        0.0
    };
    let verdict_class = classify(cfg, overall);
    SessionScore {
        overall,
        verdict: verdict_class.verdict_text().to_string(),
        verdict_class,
        valid_metrics,
        metrics,
    }
}
