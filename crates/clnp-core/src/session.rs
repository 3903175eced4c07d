// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! The session record appended to the JSONL log after every verification.
//! This is the interface the admin aggregator and downstream ML consumers
//! read; field names are stable.

use crate::scorer::{MetricScore, VerdictClass};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub at_ms: u64,
    pub mode: String,
    pub challenge_id: String,
    pub input_method: String,
    pub score: f64,
    pub verdict: String,
    pub verdict_class: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    pub sample_rate_hz: f64,
    pub sample_count: usize,
    pub valid_metrics: usize,
    pub ip_hash: String,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hover_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_elements: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plausible: Option<bool>,
}

impl SessionRecord {
    /// Converts scorer output into log-ready metric values.
    pub fn metric_map(
        metrics: &BTreeMap<&'static str, MetricScore>,
    ) -> BTreeMap<String, serde_json::Value> {
        metrics
            .iter()
            .map(|(name, metric)| {
                (
                    (*name).to_string(),
                    serde_json::to_value(metric).unwrap_or(serde_json::Value::Null),
                )
            })
            .collect()
    }

    pub fn class_str(class: VerdictClass) -> String {
        class.as_str().to_string()
    }
}
