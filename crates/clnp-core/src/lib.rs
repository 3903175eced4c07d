// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Core liveness-verification logic: challenge synthesis, server-side
//! target reconstruction, the biomechanical analysis battery, and the
//! scoring model. Everything in this crate is pure and deterministic given
//! its inputs; all I/O lives in the daemon.

pub mod analysis;
pub mod challenge;
pub mod dsp;
pub mod error;
pub mod reconstruct;
pub mod scorer;
pub mod session;

pub use error::{AnalysisError, AnalysisResult};
