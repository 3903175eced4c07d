// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface.
//!
//! Handlers take raw bytes and delegate to pure `*_impl` functions
//! returning `Result<serde_json::Value, ApiError>`, so the whole
//! validation ladder is testable without a socket. Validation order for
//! verify endpoints: token signature → challenge exists → mode → not used
//! → not expired → shape. Shape failures never consume the challenge;
//! expiry and analysis failure do.

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::header::{self, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use clnp_core::analysis::{self, AccelSample, BatteryInput, ElementRect, EmbedPointerSample,
    PointerSample};
use clnp_core::challenge::{self, Challenge, Mode};
use clnp_core::reconstruct::{CanvasSize, PhaseTimes};
use clnp_core::scorer::{self, ScoringConfig, SessionScore, VerdictClass};
use clnp_core::session::SessionRecord;

use crate::admin;
use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::session_log::SessionLog;
use crate::store::{ChallengeStore, Clock, StoreError};

pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
const MIN_POINTER_STANDALONE: usize = 50;
const MIN_POINTER_EMBED: usize = 30;
const MIN_HOVER_TOUCH_MS: f64 = 4_000.0;
const MIN_HOVER_DEFAULT_MS: f64 = 6_000.0;
const MIN_PLAUSIBLE_ELEMENTS: usize = 2;
const MIN_PLAUSIBLE_PULSES: usize = 2;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<ServiceConfig>,
    pub store: Arc<ChallengeStore>,
    pub log: Arc<SessionLog>,
    pub scoring: Arc<ScoringConfig>,
    pub clock: Arc<dyn Clock>,
    pub started_at_ms: u64,
}

impl AppState {
    pub fn build(cfg: ServiceConfig, clock: Arc<dyn Clock>) -> Self {
        let log = Arc::new(SessionLog::new(&cfg.data_dir));
        Self {
            store: Arc::new(ChallengeStore::new(clock.clone())),
            log,
            scoring: Arc::new(ScoringConfig::default()),
            clock: clock.clone(),
            started_at_ms: clock.now_ms(),
            cfg: Arc::new(cfg),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/challenge", post(create_challenge))
        .route("/api/verify", post(verify))
        .route("/api/embed/challenge", post(create_embed_challenge))
        .route("/api/embed/verify", post(verify_embed))
        .route("/api/health", get(health))
        .route("/api/admin/stats", get(admin_stats))
        .route("/api/admin/sessions", get(admin_sessions))
        .route("/api/admin/session/:id", get(admin_session))
        .fallback(|| async { ApiError::not_found() })
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES * 2))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE, AUTHORIZATION]),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(state)
}

pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
) -> Result<(), std::io::Error> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenClaims {
    challenge_id: String,
    mode: String,
    issued_at_ms: u64,
    expires_at_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptClaims {
    challenge_id: String,
    mode: String,
    verified: bool,
    score: f64,
    verdict: String,
    verified_at_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhasesDto {
    tracking_start: f64,
    dualtask_start: f64,
    test_end: f64,
}

#[derive(Debug, Deserialize)]
struct CanvasDto {
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest {
    #[serde(default)]
    token: String,
    #[serde(default)]
    pointer: Vec<PointerSample>,
    #[serde(default)]
    accel: Vec<AccelSample>,
    phases: Option<PhasesDto>,
    canvas: Option<CanvasDto>,
    input_method: Option<String>,
    cog_answer: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbedVerifyRequest {
    #[serde(default)]
    token: String,
    #[serde(default)]
    pointer: Vec<EmbedPointerSample>,
    #[serde(default)]
    accel: Vec<AccelSample>,
    /// (element index, start wall, end wall, start hover, end hover).
    #[serde(default)]
    hovers: Vec<(i64, f64, f64, f64, f64)>,
    /// (pulse index, hover ms when the client applied it).
    #[serde(default)]
    pulse_log: Vec<(u32, f64)>,
    #[serde(default)]
    elements: Vec<ElementRect>,
    input_method: Option<String>,
    device_profile: Option<String>,
}

async fn create_challenge(State(state): State<AppState>) -> Json<Value> {
    Json(challenge_response(&state, Mode::Standalone))
}

async fn create_embed_challenge(State(state): State<AppState>) -> Json<Value> {
    Json(challenge_response(&state, Mode::Embed))
}

/// Challenge issuance always succeeds: draw, sign, store, return the
/// client-visible projection.
pub fn challenge_response(state: &AppState, mode: Mode) -> Value {
    let now = state.clock.now_ms();
    let ttl = state.cfg.challenge_ttl_ms;
    let mut rng = ChaCha8Rng::from_entropy();
    let ch = match mode {
        Mode::Standalone => challenge::standalone(&mut rng, now, ttl),
        Mode::Embed => challenge::embed(&mut rng, now, ttl),
    };
    let claims = TokenClaims {
        challenge_id: ch.id.clone(),
        mode: mode.as_str().to_string(),
        issued_at_ms: ch.issued_at_ms,
        expires_at_ms: ch.expires_at_ms,
    };
    let payload = serde_json::to_vec(&claims).unwrap_or_default();
    let token = clnp_token::sign(&state.cfg.secret, &payload);
    let view = challenge::client_view(&ch);
    tracing::info!(challenge_id = %ch.id, mode = %mode.as_str(), "challenge issued");
    state.store.insert(ch);
    json!({ "ok": true, "token": token, "challenge": view })
}

async fn verify(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match verify_impl(&state, &headers, &addr.ip().to_string(), &body) {
        Ok(value) => Json(value).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn verify_embed(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match verify_embed_impl(&state, &headers, &addr.ip().to_string(), &body) {
        Ok(value) => Json(value).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Token check plus the store's validation ladder. Returns the challenge
/// without consuming it.
fn validate_token(state: &AppState, token: &str, mode: Mode) -> Result<Challenge, ApiError> {
    let payload =
        clnp_token::verify(&state.cfg.secret, token).ok_or_else(ApiError::invalid_token)?;
    let claims: TokenClaims =
        serde_json::from_slice(&payload).map_err(|_| ApiError::invalid_token())?;
    state
        .store
        .peek(&claims.challenge_id, mode)
        .map_err(store_error)
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound => ApiError::challenge_not_found(),
        StoreError::WrongMode => ApiError::wrong_challenge_mode(),
        StoreError::AlreadyUsed => ApiError::challenge_already_used(),
        StoreError::Expired => ApiError::challenge_expired(),
    }
}

pub fn verify_impl(
    state: &AppState,
    headers: &HeaderMap,
    socket_ip: &str,
    body: &[u8],
) -> Result<Value, ApiError> {
    if body.len() > MAX_BODY_BYTES {
        return Err(ApiError::body_too_large());
    }
    let req: VerifyRequest =
        serde_json::from_slice(body).map_err(|_| ApiError::invalid_json())?;

    let challenge = validate_token(state, &req.token, Mode::Standalone)?;
    if req.pointer.len() < MIN_POINTER_STANDALONE {
        return Err(ApiError::insufficient_pointer_data());
    }
    let phases_dto = req.phases.ok_or_else(ApiError::missing_phases)?;
    let canvas_dto = req.canvas.ok_or_else(ApiError::missing_canvas)?;

    // Shape is good: consume. From here on the challenge is spent even if
    // analysis fails.
    let challenge = state.store.consume(&challenge.id).map_err(store_error)?;

    let phases = PhaseTimes {
        tracking_start: phases_dto.tracking_start,
        dualtask_start: phases_dto.dualtask_start,
        test_end: phases_dto.test_end,
    };
    let canvas = CanvasSize {
        width: canvas_dto.width,
        height: canvas_dto.height,
    };
    let input_method = normalize_input_method(req.input_method.as_deref());

    let series = analysis::build_standalone_series(&challenge, &phases, canvas, &req.pointer)
        .map_err(|err| {
            tracing::warn!(challenge_id = %challenge.id, error = %err, "analysis failed");
            ApiError::analysis_failed()
        })?;
    let input = BatteryInput::standalone(&challenge, &phases, req.accel, req.cog_answer);
    let report = analysis::run_battery(&series, &input, Mode::Standalone);
    let result = scorer::score(&state.scoring, &report, input_method == "touch");

    let verified = result.verdict_class == VerdictClass::Biological;
    let now = state.clock.now_ms();
    let session_id = challenge::fresh_id();
    let record = SessionRecord {
        id: session_id.clone(),
        at_ms: now,
        mode: Mode::Standalone.as_str().to_string(),
        challenge_id: challenge.id.clone(),
        input_method: input_method.clone(),
        score: result.overall,
        verdict: result.verdict.clone(),
        verdict_class: SessionRecord::class_str(result.verdict_class),
        metrics: SessionRecord::metric_map(&result.metrics),
        sample_rate_hz: report.sample_rate_hz,
        sample_count: report.sample_count,
        valid_metrics: result.valid_metrics,
        ip_hash: ip_hash(&state.cfg.secret, &client_ip(headers, socket_ip)),
        user_agent: user_agent(headers),
        hover_time_ms: None,
        unique_elements: None,
        plausible: None,
    };
    append_session(state, &record);

    let receipt = issue_receipt(state, &challenge, Mode::Standalone, verified, &result, now);
    tracing::info!(
        challenge_id = %challenge.id,
        session_id = %session_id,
        score = %format!("{:.3}", result.overall),
        verdict_class = %result.verdict_class.as_str(),
        "verification complete"
    );
    Ok(json!({
        "ok": true,
        "sessionId": session_id,
        "verified": verified,
        "score": round4(result.overall),
        "verdict": result.verdict,
        "verdictClass": result.verdict_class.as_str(),
        "validMetrics": result.valid_metrics,
        "receipt": receipt,
    }))
}

pub fn verify_embed_impl(
    state: &AppState,
    headers: &HeaderMap,
    socket_ip: &str,
    body: &[u8],
) -> Result<Value, ApiError> {
    if body.len() > MAX_BODY_BYTES {
        return Err(ApiError::body_too_large());
    }
    let req: EmbedVerifyRequest =
        serde_json::from_slice(body).map_err(|_| ApiError::invalid_json())?;

    let challenge = validate_token(state, &req.token, Mode::Embed)?;
    if req.pointer.len() < MIN_POINTER_EMBED {
        return Err(ApiError::insufficient_pointer_data());
    }
    if req.elements.is_empty() {
        return Err(ApiError::missing_elements());
    }
    let challenge = state.store.consume(&challenge.id).map_err(store_error)?;

    let input_method = normalize_input_method(req.input_method.as_deref());
    let hover_time_ms: f64 = req
        .hovers
        .iter()
        .map(|&(_, start_wall, end_wall, _, _)| (end_wall - start_wall).max(0.0))
        .sum();
    let unique_elements = {
        let mut ids: Vec<i64> = req.hovers.iter().map(|h| h.0).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    };
    let min_hover = if input_method == "touch" {
        MIN_HOVER_TOUCH_MS
    } else {
        MIN_HOVER_DEFAULT_MS
    };
    let plausible = unique_elements >= MIN_PLAUSIBLE_ELEMENTS
        && hover_time_ms >= min_hover
        && req.pulse_log.len() >= MIN_PLAUSIBLE_PULSES;

    let series = analysis::build_embed_series(&challenge, &req.pointer, &req.elements)
        .map_err(|err| {
            tracing::warn!(challenge_id = %challenge.id, error = %err, "analysis failed");
            ApiError::analysis_failed()
        })?;
    let input = BatteryInput::embed(&challenge, req.accel);
    let report = analysis::run_battery(&series, &input, Mode::Embed);
    let result = scorer::score(&state.scoring, &report, input_method == "touch");

    let verified = result.overall >= state.scoring.embed_verified_threshold;
    let now = state.clock.now_ms();
    let session_id = challenge::fresh_id();
    let record = SessionRecord {
        id: session_id.clone(),
        at_ms: now,
        mode: Mode::Embed.as_str().to_string(),
        challenge_id: challenge.id.clone(),
        input_method,
        score: result.overall,
        verdict: result.verdict.clone(),
        verdict_class: SessionRecord::class_str(result.verdict_class),
        metrics: SessionRecord::metric_map(&result.metrics),
        sample_rate_hz: report.sample_rate_hz,
        sample_count: report.sample_count,
        valid_metrics: result.valid_metrics,
        ip_hash: ip_hash(&state.cfg.secret, &client_ip(headers, socket_ip)),
        user_agent: user_agent(headers),
        hover_time_ms: Some(hover_time_ms),
        unique_elements: Some(unique_elements),
        plausible: Some(plausible),
    };
    append_session(state, &record);

    let receipt = issue_receipt(state, &challenge, Mode::Embed, verified, &result, now);
    tracing::info!(
        challenge_id = %challenge.id,
        session_id = %session_id,
        score = %format!("{:.3}", result.overall),
        plausible = %plausible,
        device_profile = ?req.device_profile,
        "embed verification complete"
    );
    Ok(json!({
        "ok": true,
        "sessionId": session_id,
        "verified": verified,
        "score": round4(result.overall),
        "verdict": result.verdict,
        "verdictClass": result.verdict_class.as_str(),
        "validMetrics": result.valid_metrics,
        "plausible": plausible,
        "uniqueElements": unique_elements,
        "hoverTimeMs": hover_time_ms,
        "receipt": receipt,
    }))
}

fn issue_receipt(
    state: &AppState,
    challenge: &Challenge,
    mode: Mode,
    verified: bool,
    result: &SessionScore,
    now_ms: u64,
) -> String {
    let claims = ReceiptClaims {
        challenge_id: challenge.id.clone(),
        mode: mode.as_str().to_string(),
        verified,
        score: round4(result.overall),
        verdict: result.verdict.clone(),
        verified_at_ms: now_ms,
    };
    let payload = serde_json::to_vec(&claims).unwrap_or_default();
    clnp_token::sign(&state.cfg.secret, &payload)
}

fn append_session(state: &AppState, record: &SessionRecord) {
    if let Err(err) = state.log.append(record) {
        tracing::warn!(error = %err, "failed to append session record");
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime_sec = state.clock.now_ms().saturating_sub(state.started_at_ms) / 1000;
    Json(json!({
        "ok": true,
        "uptimeSec": uptime_sec,
        "pendingChallenges": state.store.pending_count(),
    }))
}

async fn admin_stats(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    match admin_stats_impl(&state, &headers, &query) {
        Ok(value) => Json(value).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn admin_stats_impl(
    state: &AppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Result<Value, ApiError> {
    admin::authorize(
        state.cfg.admin_token.as_deref(),
        headers,
        query.get("token").map(String::as_str),
    )?;
    let records = state.log.read_all();
    let stats = admin::stats(&records, state.clock.now_ms());
    Ok(json!({ "ok": true, "stats": stats }))
}

async fn admin_sessions(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    match admin_sessions_impl(&state, &headers, &query) {
        Ok(value) => Json(value).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn admin_sessions_impl(
    state: &AppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Result<Value, ApiError> {
    admin::authorize(
        state.cfg.admin_token.as_deref(),
        headers,
        query.get("token").map(String::as_str),
    )?;
    let limit = query
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(admin::DEFAULT_PAGE_LIMIT);
    let offset = query
        .get("offset")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let records = state.log.read_all();
    let rows = admin::sessions_page(&records, limit, offset);
    Ok(json!({
        "ok": true,
        "total": records.len(),
        "limit": limit,
        "offset": offset,
        "sessions": rows,
    }))
}

async fn admin_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    match admin_session_impl(&state, &headers, &query, &id) {
        Ok(value) => Json(value).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn admin_session_impl(
    state: &AppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    id: &str,
) -> Result<Value, ApiError> {
    admin::authorize(
        state.cfg.admin_token.as_deref(),
        headers,
        query.get("token").map(String::as_str),
    )?;
    let records = state.log.read_all();
    let record = records
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(ApiError::session_not_found)?;
    Ok(json!({ "ok": true, "session": record }))
}

/// Header precedence: `cf-connecting-ip`, then the first `x-forwarded-for`
/// hop, then the socket peer.
pub fn client_ip(headers: &HeaderMap, socket_ip: &str) -> String {
    if let Some(ip) = headers
        .get("cf-connecting-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return ip.to_string();
    }
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    socket_ip.to_string()
}

/// First 16 hex chars of HMAC-SHA256(ip) keyed by the server secret: stable
/// per deployment, not reversible to an address.
pub fn ip_hash(secret: &[u8], ip: &str) -> String {
    let tag = clnp_token::hmac_sha256(secret, ip.as_bytes());
    hex::encode(tag).chars().take(16).collect()
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

fn normalize_input_method(raw: Option<&str>) -> String {
    match raw {
        Some("mouse") => "mouse",
        Some("trackpad") => "trackpad",
        Some("touch") => "touch",
        _ => "unknown",
    }
    .to_string()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
