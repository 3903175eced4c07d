// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! Server-authoritative target reconstruction.
//!
//! Given only server-held challenge parameters, the client-reported phase
//! timestamps, and a sample time, these functions rebuild the exact target
//! position and perturbation vector the client was asked to track. Client
//! positions are never trusted; every analysis runs against this ground
//! truth. All math is plain f64 arithmetic in a fixed evaluation order, so
//! repeated calls are bit-identical.

use crate::challenge::{Challenge, LissajousPath, Probe, Pulse};
use std::f64::consts::TAU;

/// Client-reported phase boundaries, milliseconds since navigation start.
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimes {
    pub tracking_start: f64,
    pub dualtask_start: f64,
    pub test_end: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconSample {
    pub target_x: f64,
    pub target_y: f64,
    pub pert_x: f64,
    pub pert_y: f64,
    pub is_pulse: bool,
    pub pulse_idx: Option<usize>,
}

/// Lissajous position at `path_time_ms` on the given canvas.
pub fn smooth_path(path: &LissajousPath, canvas: CanvasSize, path_time_ms: f64) -> (f64, f64) {
    let cx = canvas.width / 2.0;
    let cy = canvas.height / 2.0;
    let ax = canvas.width * path.padding;
    let ay = canvas.height * path.padding;
    let t = path_time_ms / 1000.0;
    (
        cx + ax * (TAU * path.freq_x * t + path.phase).sin(),
        cy + ay * (TAU * path.freq_y * t).sin(),
    )
}

fn probe_sum(probes: &[Probe], elapsed_s: f64) -> (f64, f64) {
    let mut px = 0.0;
    let mut py = 0.0;
    for probe in probes {
        let phase = TAU * probe.freq_hz * elapsed_s;
        px += probe.amp_x * phase.sin();
        py += probe.amp_y * (phase + probe.phase_offset).sin();
    }
    (px, py)
}

/// Pulse contribution at `axis_ms` (same axis the pulse schedule uses):
/// full amplitude through the hold window, then a quadratic ease-out over
/// the return window. Continuous at the hold/return boundary.
fn pulse_sum(
    pulses: &[Pulse],
    hold_ms: f64,
    return_ms: f64,
    axis_ms: f64,
) -> (f64, f64, bool, Option<usize>) {
    let mut px = 0.0;
    let mut py = 0.0;
    let mut active = false;
    let mut idx = None;
    for (i, pulse) in pulses.iter().enumerate() {
        let dt = axis_ms - pulse.at_ms;
        if dt < 0.0 {
            continue;
        }
        if dt < hold_ms {
            px += pulse.amp_x;
            py += pulse.amp_y;
            active = true;
            idx = Some(i);
        } else if dt < hold_ms + return_ms {
            let frac = (dt - hold_ms) / return_ms;
            let ease = 1.0 - frac * frac;
            px += pulse.amp_x * ease;
            py += pulse.amp_y * ease;
            active = true;
            idx = Some(i);
        }
    }
    (px, py, active, idx)
}

/// Path time for a standalone sample: the dual-task phase continues the
/// path as if tracking had run its full configured duration.
pub fn path_time(challenge: &Challenge, phases: &PhaseTimes, t: f64) -> f64 {
    if t < phases.dualtask_start {
        t - phases.tracking_start
    } else {
        challenge.tracking_ms + (t - phases.dualtask_start)
    }
}

/// Reconstructs the standalone target at wall time `t`. Samples before the
/// tracking phase carry no target and return `None`.
pub fn reconstruct_standalone(
    challenge: &Challenge,
    phases: &PhaseTimes,
    canvas: CanvasSize,
    t: f64,
) -> Option<ReconSample> {
    if t < phases.tracking_start {
        return None;
    }
    let path = challenge.path.as_ref()?;
    let (sx, sy) = smooth_path(path, canvas, path_time(challenge, phases, t));
    let elapsed_s = (t - phases.tracking_start) / 1000.0;
    let (probe_x, probe_y) = probe_sum(&challenge.probes, elapsed_s);
    let (pulse_x, pulse_y, is_pulse, pulse_idx) = pulse_sum(
        &challenge.pulses,
        challenge.pulse_hold_ms,
        challenge.pulse_return_ms,
        t - phases.tracking_start,
    );
    let pert_x = probe_x + pulse_x;
    let pert_y = probe_y + pulse_y;
    Some(ReconSample {
        target_x: sx + pert_x,
        target_y: sy + pert_y,
        pert_x,
        pert_y,
        is_pulse,
        pulse_idx,
    })
}

/// Embedded-mode perturbation at cumulative hover time `hover_ms`. There is
/// no smooth path; the target is whatever element the pointer rests on,
/// displaced by this vector.
pub fn embed_perturbation(challenge: &Challenge, hover_ms: f64) -> ReconSample {
    let (probe_x, probe_y) = probe_sum(&challenge.probes, hover_ms / 1000.0);
    let (pulse_x, pulse_y, is_pulse, pulse_idx) = pulse_sum(
        &challenge.pulses,
        challenge.pulse_hold_ms,
        challenge.pulse_return_ms,
        hover_ms,
    );
    let pert_x = probe_x + pulse_x;
    let pert_y = probe_y + pulse_y;
    ReconSample {
        target_x: pert_x,
        target_y: pert_y,
        pert_x,
        pert_y,
        is_pulse,
        pulse_idx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_challenge() -> Challenge {
        challenge::standalone(&mut ChaCha8Rng::seed_from_u64(42), 0, 180_000)
    }

    fn phases() -> PhaseTimes {
        PhaseTimes {
            tracking_start: 5_000.0,
            dualtask_start: 25_000.0,
            test_end: 37_000.0,
        }
    }

    fn canvas() -> CanvasSize {
        CanvasSize {
            width: 800.0,
            height: 600.0,
        }
    }

    #[test]
    fn reconstruction_is_bit_deterministic() {
        let ch = test_challenge();
        for step in 0..200 {
            let t = 5_000.0 + step as f64 * 137.3;
            let a = reconstruct_standalone(&ch, &phases(), canvas(), t).unwrap();
            let b = reconstruct_standalone(&ch, &phases(), canvas(), t).unwrap();
            assert_eq!(a.target_x.to_bits(), b.target_x.to_bits());
            assert_eq!(a.target_y.to_bits(), b.target_y.to_bits());
            assert_eq!(a.pert_x.to_bits(), b.pert_x.to_bits());
            assert_eq!(a.pert_y.to_bits(), b.pert_y.to_bits());
        }
    }

    #[test]
    fn zero_phase_path_starts_at_canvas_center() {
        let path = LissajousPath {
            freq_x: 0.08,
            freq_y: 0.12,
            phase: 0.0,
            padding: 0.30,
        };
        let (x, y) = smooth_path(&path, canvas(), 0.0);
        assert_eq!(x, 400.0);
        assert_eq!(y, 300.0);
    }

    #[test]
    fn samples_before_tracking_are_discarded() {
        let ch = test_challenge();
        assert!(reconstruct_standalone(&ch, &phases(), canvas(), 4_999.9).is_none());
        assert!(reconstruct_standalone(&ch, &phases(), canvas(), 5_000.0).is_some());
    }

    #[test]
    fn pulse_hold_return_boundary_is_continuous() {
        let ch = test_challenge();
        let ph = phases();
        let pulse = ch.pulses[0];
        let boundary = ph.tracking_start + pulse.at_ms + ch.pulse_hold_ms;
        let hold_end =
            reconstruct_standalone(&ch, &ph, canvas(), boundary - 1e-9).unwrap();
        let return_start = reconstruct_standalone(&ch, &ph, canvas(), boundary).unwrap();
        assert!((hold_end.pert_x - return_start.pert_x).abs() < 1e-6);
        assert!((hold_end.pert_y - return_start.pert_y).abs() < 1e-6);
        assert!(return_start.is_pulse);
    }

    #[test]
    fn pulse_fully_releases_after_return_window() {
        let ch = test_challenge();
        let ph = phases();
        let pulse = ch.pulses[0];
        let after = ph.tracking_start + pulse.at_ms + ch.pulse_hold_ms + ch.pulse_return_ms + 1.0;
        let sample = reconstruct_standalone(&ch, &ph, canvas(), after).unwrap();
        // Only probe motion remains; the rectangular displacement is gone.
        let amp_sum: f64 = ch.probes.iter().map(|p| p.amp_x).sum();
        assert!(sample.pert_x.abs() <= amp_sum + 1e-9);
        assert!(!sample.is_pulse || sample.pulse_idx != Some(0));
    }

    #[test]
    fn dualtask_phase_continues_the_path() {
        let ch = test_challenge();
        let ph = phases();
        let t = ph.dualtask_start + 1_000.0;
        assert_eq!(path_time(&ch, &ph, t), ch.tracking_ms + 1_000.0);
        assert_eq!(path_time(&ch, &ph, ph.tracking_start), 0.0);
    }

    #[test]
    fn embed_perturbation_stays_sub_perceptual_between_pulses() {
        let ch = challenge::embed(&mut ChaCha8Rng::seed_from_u64(9), 0, 180_000);
        let sample = embed_perturbation(&ch, 600.0);
        assert!(!sample.is_pulse);
        assert!(sample.pert_x.abs() < 1.75);
        assert!(sample.pert_y.abs() < 0.75);
    }
}
