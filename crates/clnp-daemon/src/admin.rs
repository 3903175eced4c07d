// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! Admin read paths: bearer-token authorization and streaming aggregation
//! over the JSONL session log. The aggregator tolerates malformed history
//! (the log reader already skips bad lines) and never mutates anything.

use crate::error::ApiError;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use clnp_core::session::SessionRecord;
use serde::Serialize;
use std::collections::BTreeMap;

const DAY_MS: u64 = 86_400_000;
const HOUR_MS: u64 = 3_600_000;
const DAY_WINDOW: u64 = 30;
pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 500;

/// Constant-time bearer check. The token may arrive in the Authorization
/// header or as a `?token=` query parameter.
pub fn authorize(
    admin_token: Option<&str>,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<(), ApiError> {
    let Some(expected) = admin_token else {
        return Err(ApiError::admin_not_configured());
    };
    let header_token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let Some(provided) = header_token.or(query_token) else {
        return Err(ApiError::missing_token());
    };
    if !clnp_token::constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
        return Err(ApiError::invalid_token());
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total: usize,
    pub today: usize,
    pub last_hour: usize,
    /// Sessions per UTC day over the trailing 30 days.
    pub days: BTreeMap<String, usize>,
    pub devices: BTreeMap<String, usize>,
    pub verdicts: BTreeMap<String, usize>,
    pub modes: BTreeMap<String, usize>,
    pub score_histogram: [usize; 10],
    /// device type → metric name → mean sub-score.
    pub device_metric_avg: BTreeMap<String, BTreeMap<String, f64>>,
}

pub fn stats(records: &[SessionRecord], now_ms: u64) -> AdminStats {
    let today_key = day_key(now_ms);
    let mut days = BTreeMap::new();
    let mut devices = BTreeMap::new();
    let mut verdicts = BTreeMap::new();
    let mut modes = BTreeMap::new();
    let mut score_histogram = [0usize; 10];
    let mut metric_sums: BTreeMap<String, BTreeMap<String, (f64, usize)>> = BTreeMap::new();
    let mut today = 0usize;
    let mut last_hour = 0usize;

    for record in records {
        let key = day_key(record.at_ms);
        if key == today_key {
            today += 1;
        }
        if record.at_ms + HOUR_MS >= now_ms {
            last_hour += 1;
        }
        if record.at_ms + DAY_WINDOW * DAY_MS >= now_ms {
            *days.entry(key).or_insert(0) += 1;
        }
        *devices.entry(record.input_method.clone()).or_insert(0) += 1;
        *verdicts.entry(record.verdict_class.clone()).or_insert(0) += 1;
        *modes.entry(record.mode.clone()).or_insert(0) += 1;

        let bucket = ((record.score * 10.0).floor() as usize).min(9);
        score_histogram[bucket] += 1;

        let device_sums = metric_sums.entry(record.input_method.clone()).or_default();
        for (name, value) in &record.metrics {
            let score = value
                .get("score")
                .and_then(|v| v.as_f64())
                .or_else(|| value.as_f64());
            if let Some(score) = score {
                let slot = device_sums.entry(name.clone()).or_insert((0.0, 0));
                slot.0 += score;
                slot.1 += 1;
            }
        }
    }

    let device_metric_avg = metric_sums
        .into_iter()
        .map(|(device, sums)| {
            (
                device,
                sums.into_iter()
                    .map(|(name, (sum, count))| (name, sum / count as f64))
                    .collect(),
            )
        })
        .collect();

    AdminStats {
        total: records.len(),
        today,
        last_hour,
        days,
        devices,
        verdicts,
        modes,
        score_histogram,
        device_metric_avg,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    pub id: String,
    pub at_ms: u64,
    pub mode: String,
    pub score: f64,
    pub verdict_class: String,
    pub input_method: String,
}

/// Newest-first page of lightweight rows.
pub fn sessions_page(records: &[SessionRecord], limit: usize, offset: usize) -> Vec<SessionRow> {
    let limit = limit.clamp(1, MAX_PAGE_LIMIT);
    records
        .iter()
        .rev()
        .skip(offset)
        .take(limit)
        .map(|record| SessionRow {
            id: record.id.clone(),
            at_ms: record.at_ms,
            mode: record.mode.clone(),
            score: record.score,
            verdict_class: record.verdict_class.clone(),
            input_method: record.input_method.clone(),
        })
        .collect()
}

/// UTC calendar day for a unix-epoch millisecond timestamp.
pub fn day_key(at_ms: u64) -> String {
    let (year, month, day) = civil_from_days((at_ms / DAY_MS) as i64);
    format!("{year:04}-{month:02}-{day:02}")
}

/// Days-since-epoch to proleptic Gregorian calendar date.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn record(at_ms: u64, device: &str, class: &str, score: f64) -> SessionRecord {
        let mut metrics = Map::new();
        metrics.insert(
            "tremor".to_string(),
            serde_json::json!({"valid": true, "score": score, "features": {}}),
        );
        SessionRecord {
            id: format!("id-{at_ms}"),
            at_ms,
            mode: "standalone".into(),
            challenge_id: "c".repeat(32),
            input_method: device.into(),
            score,
            verdict: String::new(),
            verdict_class: class.into(),
            metrics,
            sample_rate_hz: 60.0,
            sample_count: 1000,
            valid_metrics: 5,
            ip_hash: "hash".into(),
            user_agent: "ua".into(),
            hover_time_ms: None,
            unique_elements: None,
            plausible: None,
        }
    }

    #[test]
    fn authorize_requires_configuration() {
        let headers = HeaderMap::new();
        assert_eq!(
            authorize(None, &headers, Some("anything")),
            Err(ApiError::admin_not_configured())
        );
    }

    #[test]
    fn authorize_paths_and_failures() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            authorize(Some("s3cret"), &headers, None),
            Err(ApiError::missing_token())
        );
        assert_eq!(
            authorize(Some("s3cret"), &headers, Some("wrong-length-token")),
            Err(ApiError::invalid_token())
        );
        assert!(authorize(Some("s3cret"), &headers, Some("s3cret")).is_ok());
        headers.insert(AUTHORIZATION, "Bearer s3cret".parse().unwrap());
        assert!(authorize(Some("s3cret"), &headers, None).is_ok());
    }

    #[test]
    fn day_key_is_utc_calendar() {
        assert_eq!(day_key(0), "1970-01-01");
        assert_eq!(day_key(DAY_MS), "1970-01-02");
        assert_eq!(day_key(DAY_MS * 59 + 1), "1970-03-01");
    }

    #[test]
    fn stats_buckets_counts_and_averages() {
        let now = DAY_MS * 20_000 + HOUR_MS * 5;
        let records = vec![
            record(now - HOUR_MS / 2, "mouse", "biological", 0.9),
            record(now - 2 * HOUR_MS, "mouse", "biological", 0.7),
            record(now - 2 * DAY_MS, "touch", "non-biological", 0.1),
            record(now - 40 * DAY_MS, "trackpad", "uncertain", 0.5),
        ];
        let stats = stats(&records, now);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.today, 2);
        assert_eq!(stats.last_hour, 1);
        assert_eq!(stats.devices["mouse"], 2);
        assert_eq!(stats.verdicts["non-biological"], 1);
        assert_eq!(stats.score_histogram[9], 1);
        assert_eq!(stats.score_histogram[0], 1);
        // The 40-day-old record is outside the day window but still counted
        // in totals.
        assert_eq!(stats.days.values().sum::<usize>(), 3);
        let mouse_avg = &stats.device_metric_avg["mouse"]["tremor"];
        assert!((mouse_avg - 0.8).abs() < 1e-12);
    }

    #[test]
    fn pagination_is_newest_first() {
        let records: Vec<SessionRecord> = (0..10)
            .map(|i| record(1_000 + i, "mouse", "biological", 0.5))
            .collect();
        let page = sessions_page(&records, 3, 0);
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].at_ms, 1_009);
        let next = sessions_page(&records, 3, 3);
        assert_eq!(next[0].at_ms, 1_006);
        let tail = sessions_page(&records, 50, 8);
        assert_eq!(tail.len(), 2);
    }
}
