// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cognitive-motor interference: attending to a counted flash measurably
//! degrades tracking for a biological controller, and target-colored
//! flashes degrade it more than distractors.

use super::{FlashEvent, TrackingSeries};
use crate::dsp;
use serde::Serialize;

const PRE_WINDOW_MS: f64 = 500.0;
const POST_DELAY_MS: f64 = 200.0;
const POST_WINDOW_MS: f64 = 500.0;
const MIN_WINDOW_SAMPLES: usize = 3;

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveFeatures {
    pub valid: bool,
    /// Mean fractional error increase after target-colored flashes.
    pub target_increase: f64,
    pub nontarget_increase: f64,
    pub attention_effect: f64,
    pub true_count: u32,
    pub answer: Option<i64>,
    pub flashes_evaluated: usize,
}

pub fn interference(
    series: &TrackingSeries,
    flashes: &[FlashEvent],
    answer: Option<i64>,
    true_count: Option<u32>,
) -> CognitiveFeatures {
    let error_mag = series.error_mag();
    let mut target_increases = Vec::new();
    let mut nontarget_increases = Vec::new();

    for flash in flashes {
        let mut pre = Vec::new();
        let mut post = Vec::new();
        for i in 0..series.len() {
            let dt = series.t[i] - flash.at_ms;
            if (-PRE_WINDOW_MS..0.0).contains(&dt) {
                pre.push(error_mag[i]);
            } else if (POST_DELAY_MS..POST_DELAY_MS + POST_WINDOW_MS).contains(&dt) {
                post.push(error_mag[i]);
            }
        }
        if pre.len() < MIN_WINDOW_SAMPLES || post.len() < MIN_WINDOW_SAMPLES {
            continue;
        }
        let pre_mean = dsp::mean(&pre);
        if pre_mean <= 1e-9 {
            continue;
        }
        let increase = (dsp::mean(&post) - pre_mean) / pre_mean;
        if flash.is_target {
            target_increases.push(increase);
        } else {
            nontarget_increases.push(increase);
        }
    }

    if target_increases.is_empty() || nontarget_increases.is_empty() {
        return CognitiveFeatures {
            true_count: true_count.unwrap_or(0),
            answer,
            flashes_evaluated: target_increases.len() + nontarget_increases.len(),
            ..CognitiveFeatures::default()
        };
    }

    let target_increase = dsp::mean(&target_increases);
    let nontarget_increase = dsp::mean(&nontarget_increases);
    CognitiveFeatures {
        valid: true,
        target_increase,
        nontarget_increase,
        attention_effect: target_increase - nontarget_increase,
        true_count: true_count.unwrap_or(0),
        answer,
        flashes_evaluated: target_increases.len() + nontarget_increases.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_with_error_bumps(flashes: &[FlashEvent], bump: impl Fn(&FlashEvent) -> f64) -> TrackingSeries {
        let mut series = TrackingSeries::default();
        for i in 0..1200 {
            let t = i as f64 * 10.0;
            let mut err = 2.0;
            for flash in flashes {
                let dt = t - flash.at_ms;
                if (POST_DELAY_MS..POST_DELAY_MS + POST_WINDOW_MS).contains(&dt) {
                    err += bump(flash);
                }
            }
            series.t.push(t);
            series.cursor_x.push(err);
            series.cursor_y.push(0.0);
            series.target_x.push(0.0);
            series.target_y.push(0.0);
            series.pert_x.push(0.0);
            series.pert_y.push(0.0);
        }
        series.sample_rate_hz = 100.0;
        series
    }

    #[test]
    fn attention_effect_separates_target_flashes() {
        let flashes = vec![
            FlashEvent {
                at_ms: 2_000.0,
                is_target: true,
            },
            FlashEvent {
                at_ms: 4_000.0,
                is_target: false,
            },
            FlashEvent {
                at_ms: 6_000.0,
                is_target: true,
            },
            FlashEvent {
                at_ms: 8_000.0,
                is_target: false,
            },
        ];
        let series = series_with_error_bumps(&flashes, |f| if f.is_target { 1.0 } else { 0.2 });
        let features = interference(&series, &flashes, Some(2), Some(2));
        assert!(features.valid);
        assert!((features.target_increase - 0.5).abs() < 0.05);
        assert!((features.nontarget_increase - 0.1).abs() < 0.05);
        assert!(features.attention_effect > 0.3);
        assert_eq!(features.true_count, 2);
        assert_eq!(features.answer, Some(2));
    }

    #[test]
    fn needs_both_flash_kinds() {
        let flashes = vec![FlashEvent {
            at_ms: 2_000.0,
            is_target: true,
        }];
        let series = series_with_error_bumps(&flashes, |_| 1.0);
        assert!(!interference(&series, &flashes, None, Some(3)).valid);
    }

    #[test]
    fn flat_zero_error_yields_invalid() {
        let flashes = vec![
            FlashEvent {
                at_ms: 2_000.0,
                is_target: true,
            },
            FlashEvent {
                at_ms: 4_000.0,
                is_target: false,
            },
        ];
        let mut series = series_with_error_bumps(&flashes, |_| 0.0);
        for v in series.cursor_x.iter_mut() {
            *v = 0.0;
        }
        assert!(!interference(&series, &flashes, None, None).valid);
    }
}
