// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! Challenge synthesis.
//!
//! Every verification session gets a unique parameter set drawn here. The
//! identifiers come from the OS RNG; the perturbation parameters come from a
//! caller-provided generator so tests can seed them. What the client is
//! allowed to see is the [`ClientChallenge`] projection; the scoring-relevant
//! secrets (`target_count`, per-flash target flags) never leave the server.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::Serialize;
use std::f64::consts::PI;

/// Probe frequency pool in Hz. Curated so no entry is an integer multiple
/// of another; transfer-function bins stay disjoint.
pub const PROBE_POOL: [f64; 18] = [
    0.35, 0.45, 0.55, 0.65, 0.85, 0.95, 1.15, 1.25, 1.45, 1.55, 1.85, 2.05, 2.15, 2.35, 2.65,
    2.95, 3.05, 3.35,
];

/// Lissajous frequency pairs (Hz) with small rational ratios.
pub const PATH_PAIRS: [(f64, f64); 7] = [
    (0.08, 0.12),
    (0.09, 0.12),
    (0.06, 0.10),
    (0.08, 0.10),
    (0.10, 0.12),
    (0.07, 0.14),
    (0.10, 0.14),
];

pub const FLASH_COLORS: [&str; 3] = ["#e74c3c", "#2ecc71", "#3498db"];

pub const FREE_MOVE_MS: f64 = 5000.0;
pub const PATH_PADDING: f64 = 0.30;
pub const PROBE_COUNT: usize = 5;
pub const FLASH_TOTAL: usize = 8;
pub const PULSE_MIN_GAP_MS: f64 = 2800.0;
pub const EMBED_PULSE_MIN_GAP_MS: f64 = 1200.0;
pub const EMBED_HOVER_HORIZON_MS: f64 = 12000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Standalone,
    Embed,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Standalone => "standalone",
            Mode::Embed => "embed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub freq_hz: f64,
    pub amp_x: f64,
    pub amp_y: f64,
    pub phase_offset: f64,
}

/// A rectangular target displacement. `at_ms` is milliseconds since
/// tracking start for standalone challenges and cumulative hover
/// milliseconds for embedded ones.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pulse {
    pub at_ms: f64,
    pub amp_x: f64,
    pub amp_y: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LissajousPath {
    pub freq_x: f64,
    pub freq_y: f64,
    pub phase: f64,
    pub padding: f64,
}

#[derive(Debug, Clone)]
pub struct Flash {
    pub at_ms: f64,
    pub color: String,
    pub is_target: bool,
}

#[derive(Debug, Clone)]
pub struct CogTask {
    pub target_color: String,
    pub target_count: u32,
    pub flashes: Vec<Flash>,
}

#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: String,
    pub mode: Mode,
    pub issued_at_ms: u64,
    pub expires_at_ms: u64,
    pub free_move_ms: f64,
    /// Tracking-phase duration (standalone) or the hover-time horizon the
    /// pulse schedule partitions (embed).
    pub tracking_ms: f64,
    pub dualtask_ms: f64,
    pub path: Option<LissajousPath>,
    pub probes: Vec<Probe>,
    pub pulses: Vec<Pulse>,
    pub pulse_hold_ms: f64,
    pub pulse_return_ms: f64,
    pub cog: Option<CogTask>,
}

/// 128-bit hex identifier from the OS RNG.
pub fn fresh_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn draw_probes<R: Rng>(rng: &mut R, embed: bool) -> Vec<Probe> {
    let mut indices: Vec<usize> = (0..PROBE_POOL.len()).collect();
    indices.shuffle(rng);
    indices.truncate(PROBE_COUNT);
    indices.sort_unstable();
    indices
        .into_iter()
        .map(|i| Probe {
            freq_hz: PROBE_POOL[i],
            amp_x: if embed {
                rng.gen_range(0.15..0.35)
            } else {
                rng.gen_range(3..=7) as f64
            },
            amp_y: if embed {
                rng.gen_range(0.05..0.15)
            } else {
                rng.gen_range(1..=3) as f64
            },
            phase_offset: PI / 3.0 + rng.gen_range(-0.3..0.3),
        })
        .collect()
}

/// Bucketed pulse schedule over `[min_gap, horizon)`: one pulse per bucket,
/// jittered into the leading 60% so consecutive offsets stay ordered.
fn draw_pulse_offsets<R: Rng>(rng: &mut R, count: usize, min_gap: f64, horizon: f64) -> Vec<f64> {
    let bucket = (horizon - min_gap) / count as f64;
    (0..count)
        .map(|i| min_gap + i as f64 * bucket + rng.gen_range(0.0..0.6 * bucket))
        .collect()
}

fn pulse_sign(index: usize) -> f64 {
    if index % 3 == 2 {
        -1.0
    } else {
        1.0
    }
}

fn draw_cog_task<R: Rng>(rng: &mut R, dualtask_ms: f64) -> CogTask {
    let target_idx = rng.gen_range(0..FLASH_COLORS.len());
    let target_color = FLASH_COLORS[target_idx].to_string();
    let target_count = rng.gen_range(2..=5u32);

    let mut flashes: Vec<Flash> = Vec::with_capacity(FLASH_TOTAL);
    for _ in 0..target_count {
        flashes.push(Flash {
            at_ms: 0.0,
            color: target_color.clone(),
            is_target: true,
        });
    }
    let distractors: Vec<&str> = FLASH_COLORS
        .iter()
        .copied()
        .filter(|c| *c != target_color)
        .collect();
    for _ in target_count as usize..FLASH_TOTAL {
        let color = distractors[rng.gen_range(0..distractors.len())];
        flashes.push(Flash {
            at_ms: 0.0,
            color: color.to_string(),
            is_target: false,
        });
    }
    flashes.shuffle(rng);

    let cog_gap = dualtask_ms / (FLASH_TOTAL + 1) as f64;
    for (i, flash) in flashes.iter_mut().enumerate() {
        flash.at_ms = cog_gap * (i + 1) as f64 + rng.gen_range(-0.15..0.15) * cog_gap;
    }

    CogTask {
        target_color,
        target_count,
        flashes,
    }
}

/// Draws a full-screen tracking challenge.
pub fn standalone<R: Rng>(rng: &mut R, now_ms: u64, ttl_ms: u64) -> Challenge {
    let tracking_ms = rng.gen_range(18_000.0..22_000.0);
    let dualtask_ms = rng.gen_range(10_000.0..14_000.0);
    let (freq_x, freq_y) = PATH_PAIRS[rng.gen_range(0..PATH_PAIRS.len())];

    let pulse_count = rng.gen_range(4..8usize);
    let pulses = draw_pulse_offsets(rng, pulse_count, PULSE_MIN_GAP_MS, tracking_ms)
        .into_iter()
        .enumerate()
        .map(|(i, at_ms)| Pulse {
            at_ms,
            amp_x: pulse_sign(i) * rng.gen_range(18..=26) as f64,
            amp_y: rng.gen_range(1..=3) as f64,
        })
        .collect();

    Challenge {
        id: fresh_id(),
        mode: Mode::Standalone,
        issued_at_ms: now_ms,
        expires_at_ms: now_ms + ttl_ms,
        free_move_ms: FREE_MOVE_MS,
        tracking_ms,
        dualtask_ms,
        path: Some(LissajousPath {
            freq_x,
            freq_y,
            phase: PI / 4.0 + rng.gen_range(-0.5..0.5),
            padding: PATH_PADDING,
        }),
        probes: draw_probes(rng, false),
        pulses,
        pulse_hold_ms: rng.gen_range(500.0..700.0),
        pulse_return_ms: 200.0,
        cog: Some(draw_cog_task(rng, dualtask_ms)),
    }
}

/// Draws an embedded challenge: sub-perceptual probe amplitudes, pulses
/// indexed by cumulative hover time, double TTL.
pub fn embed<R: Rng>(rng: &mut R, now_ms: u64, base_ttl_ms: u64) -> Challenge {
    let pulse_count = rng.gen_range(4..6usize);
    let pulses = draw_pulse_offsets(
        rng,
        pulse_count,
        EMBED_PULSE_MIN_GAP_MS,
        EMBED_HOVER_HORIZON_MS,
    )
    .into_iter()
    .enumerate()
    .map(|(i, at_ms)| Pulse {
        at_ms,
        amp_x: pulse_sign(i) * rng.gen_range(1.0..2.0),
        amp_y: rng.gen_range(0.1..0.3),
    })
    .collect();

    Challenge {
        id: fresh_id(),
        mode: Mode::Embed,
        issued_at_ms: now_ms,
        expires_at_ms: now_ms + 2 * base_ttl_ms,
        free_move_ms: 0.0,
        tracking_ms: EMBED_HOVER_HORIZON_MS,
        dualtask_ms: 0.0,
        path: None,
        probes: draw_probes(rng, true),
        pulses,
        pulse_hold_ms: rng.gen_range(400.0..600.0),
        pulse_return_ms: 150.0,
        cog: None,
    }
}

/// Client-visible projection: everything needed to render the task and
/// apply the perturbation, nothing that would let a client precompute the
/// expected answer or the score.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientChallenge {
    pub challenge_id: String,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_move_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dualtask_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<LissajousPath>,
    pub probes: Vec<Probe>,
    pub pulses: Vec<Pulse>,
    pub pulse_hold_ms: f64,
    pub pulse_return_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cog: Option<ClientCogTask>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCogTask {
    pub target_color: String,
    pub flashes: Vec<ClientFlash>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFlash {
    pub at_ms: f64,
    pub color: String,
}

pub fn client_view(challenge: &Challenge) -> ClientChallenge {
    let standalone = challenge.mode == Mode::Standalone;
    ClientChallenge {
        challenge_id: challenge.id.clone(),
        mode: challenge.mode,
        free_move_ms: standalone.then_some(challenge.free_move_ms),
        tracking_ms: standalone.then_some(challenge.tracking_ms),
        dualtask_ms: standalone.then_some(challenge.dualtask_ms),
        path: challenge.path,
        probes: challenge.probes.clone(),
        pulses: challenge.pulses.clone(),
        pulse_hold_ms: challenge.pulse_hold_ms,
        pulse_return_ms: challenge.pulse_return_ms,
        cog: challenge.cog.as_ref().map(|cog| ClientCogTask {
            target_color: cog.target_color.clone(),
            flashes: cog
                .flashes
                .iter()
                .map(|f| ClientFlash {
                    at_ms: f.at_ms,
                    color: f.color.clone(),
                })
                .collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    #[test]
    fn probes_ascend_and_come_from_pool() {
        let ch = standalone(&mut rng(7), 0, 180_000);
        assert_eq!(ch.probes.len(), PROBE_COUNT);
        for pair in ch.probes.windows(2) {
            assert!(pair[0].freq_hz < pair[1].freq_hz);
        }
        for probe in &ch.probes {
            assert!(PROBE_POOL.contains(&probe.freq_hz));
        }
    }

    #[test]
    fn pulse_schedule_partitions_tracking_window() {
        let ch = standalone(&mut rng(11), 0, 180_000);
        let count = ch.pulses.len();
        assert!((4..8).contains(&count));
        let bucket = (ch.tracking_ms - PULSE_MIN_GAP_MS) / count as f64;
        for (i, pulse) in ch.pulses.iter().enumerate() {
            let lo = PULSE_MIN_GAP_MS + i as f64 * bucket;
            assert!(pulse.at_ms >= lo && pulse.at_ms < lo + 0.6 * bucket);
        }
        for pair in ch.pulses.windows(2) {
            assert!(pair[1].at_ms - pair[0].at_ms >= 0.4 * bucket - 1e-9);
        }
    }

    #[test]
    fn pulse_sign_follows_index_rule() {
        let ch = standalone(&mut rng(3), 0, 180_000);
        for (i, pulse) in ch.pulses.iter().enumerate() {
            if i % 3 == 2 {
                assert!(pulse.amp_x < 0.0);
            } else {
                assert!(pulse.amp_x > 0.0);
            }
        }
    }

    #[test]
    fn cog_task_flash_counts() {
        let ch = standalone(&mut rng(19), 0, 180_000);
        let cog = ch.cog.unwrap();
        assert_eq!(cog.flashes.len(), FLASH_TOTAL);
        let targets = cog.flashes.iter().filter(|f| f.is_target).count();
        assert_eq!(targets as u32, cog.target_count);
        assert!((2..=5).contains(&cog.target_count));
        for flash in &cog.flashes {
            if flash.is_target {
                assert_eq!(flash.color, cog.target_color);
            } else {
                assert_ne!(flash.color, cog.target_color);
            }
            assert!(flash.at_ms > 0.0 && flash.at_ms < ch.dualtask_ms);
        }
    }

    #[test]
    fn embed_amplitudes_are_sub_perceptual() {
        let ch = embed(&mut rng(5), 0, 180_000);
        let peak_sum: f64 = ch.probes.iter().map(|p| p.amp_x).sum();
        assert!((0.75..=1.75).contains(&peak_sum), "peak {peak_sum}");
        for probe in &ch.probes {
            assert!((0.15..0.35).contains(&probe.amp_x));
            assert!((0.05..0.15).contains(&probe.amp_y));
        }
        assert_eq!(ch.expires_at_ms, 360_000);
        assert!(ch.cog.is_none() && ch.path.is_none());
    }

    #[test]
    fn client_view_hides_scoring_secrets() {
        let ch = standalone(&mut rng(23), 1000, 180_000);
        let json = serde_json::to_string(&client_view(&ch)).unwrap();
        assert!(!json.contains("isTarget"));
        assert!(!json.contains("targetCount"));
        assert!(json.contains("targetColor"));
        assert!(json.contains("\"flashes\""));
    }

    #[test]
    fn ids_are_128_bit_hex() {
        let id = fresh_id();
        assert_eq!(id.len(), 32);
        assert!(id.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(id, fresh_id());
    }

    proptest! {
        #[test]
        fn generator_invariants_hold_for_any_seed(seed in any::<u64>()) {
            let ch = standalone(&mut rng(seed), 0, 180_000);
            prop_assert!((18_000.0..22_000.0).contains(&ch.tracking_ms));
            prop_assert!((10_000.0..14_000.0).contains(&ch.dualtask_ms));
            for pair in ch.probes.windows(2) {
                prop_assert!(pair[0].freq_hz < pair[1].freq_hz);
            }
            for pair in ch.pulses.windows(2) {
                prop_assert!(pair[0].at_ms < pair[1].at_ms);
            }
            prop_assert!(ch.pulses.first().map(|p| p.at_ms >= PULSE_MIN_GAP_MS).unwrap_or(false));
            prop_assert!(ch.pulses.last().map(|p| p.at_ms < ch.tracking_ms).unwrap_or(false));
            prop_assert!((500.0..700.0).contains(&ch.pulse_hold_ms));

            let em = embed(&mut rng(seed ^ 0x9e37_79b9), 0, 180_000);
            prop_assert!((4..6).contains(&em.pulses.len()));
            for pulse in &em.pulses {
                prop_assert!(pulse.amp_x.abs() >= 1.0 && pulse.amp_x.abs() < 2.0);
                prop_assert!(pulse.at_ms >= EMBED_PULSE_MIN_GAP_MS);
                prop_assert!(pulse.at_ms < EMBED_HOVER_HORIZON_MS);
            }
        }
    }
}
