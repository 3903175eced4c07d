// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! The public error surface: every failure maps to a stable
//! `(HTTP status, error code)` pair, serialized as `{"ok":false,"error":code}`.
//! Codes are part of the wire contract; messages are not exposed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
}

impl ApiError {
    pub const fn new(status: StatusCode, code: &'static str) -> Self {
        Self { status, code }
    }

    pub const fn body_too_large() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "body_too_large")
    }

    pub const fn invalid_json() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_json")
    }

    pub const fn insufficient_pointer_data() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "insufficient_pointer_data")
    }

    pub const fn missing_phases() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "missing_phases")
    }

    pub const fn missing_canvas() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "missing_canvas")
    }

    pub const fn missing_elements() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "missing_elements")
    }

    pub const fn invalid_token() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid_token")
    }

    pub const fn missing_token() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "missing_token")
    }

    pub const fn admin_not_configured() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "admin_not_configured")
    }

    pub const fn challenge_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "challenge_not_found")
    }

    pub const fn session_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "session_not_found")
    }

    pub const fn wrong_challenge_mode() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "wrong_challenge_mode")
    }

    pub const fn challenge_already_used() -> Self {
        Self::new(StatusCode::CONFLICT, "challenge_already_used")
    }

    pub const fn challenge_expired() -> Self {
        Self::new(StatusCode::GONE, "challenge_expired")
    }

    pub const fn analysis_failed() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "analysis_failed")
    }

    pub const fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "ok": false, "error": self.code }))).into_response()
    }
}
