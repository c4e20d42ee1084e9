//!
//! pethaven HTTP server
//! --------------------
//! Axum routes for the adoption site with the access gate layered over every
//! page. The page handlers are thin: rendering belongs to the view layer, so
//! each page answers a small JSON document describing what it would show.
//!
//! Responsibilities:
//! - Gate wiring: route policy + identity provider as middleware state.
//! - Sign-in/out endpoints under `/api/auth`, outside the gate.
//! - Startup logging and listener setup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::gate::{access_gate, AccessGate, CookieBridge, QueryParams, RoutePolicy};
use crate::identity::{IdentityProvider, LocalIdentityProvider, LoginRequest, RequestContext, SessionManager, UserStore};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn IdentityProvider>,
    pub config: Arc<ServerConfig>,
}

/// Build the full application: routes, fallback and the access gate.
pub fn app(config: &ServerConfig, provider: Arc<dyn IdentityProvider>) -> AppResult<Router> {
    let policy = RoutePolicy::from_config(&config.gate)?;
    let gate = AccessGate::new(policy, provider.clone());
    let state = AppState { provider, config: Arc::new(config.clone()) };
    Ok(build_router(state, gate))
}

pub fn build_router(state: AppState, gate: AccessGate) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/pets", get(pets))
        .route("/pets/{id}", get(pet_detail))
        .route("/profile", get(profile))
        .route("/adopt", get(adopt))
        .route("/adopt/{pet_id}", get(adopt_pet))
        .route("/auth", get(auth_page))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/health", get(health))
        .fallback(not_found)
        // Added last so it wraps the fallback too: unknown paths are still gated.
        .layer(middleware::from_fn_with_state(gate, access_gate))
        .with_state(state)
}

fn log_startup(config: &ServerConfig) {
    info!(
        target: "startup",
        "pethaven starting: host={}, http_port={}, protected={:?}, auth_prefix={}, prefix_match={:?}, session_ttl_secs={}, refresh_window_secs={}, rotation_grace_secs={}, secure_cookies={}, users_file={:?}, seed_demo_user={}",
        config.host,
        config.http_port,
        config.gate.protected_prefixes,
        config.gate.auth_prefix,
        config.gate.prefix_match,
        config.session_ttl_secs,
        config.refresh_window_secs,
        config.rotation_grace_secs,
        config.cookie_secure,
        config.users_file,
        config.seed_demo_user,
    );
    if !config.cookie_secure {
        warn!(target: "startup", "session cookies are sent without the Secure attribute");
    }
}

/// Credential store for `run`: the users file if given, plus the demo account
/// only when `seed_demo_user` asks for it.
pub fn load_users(config: &ServerConfig) -> anyhow::Result<UserStore> {
    let users = match &config.users_file {
        Some(path) => UserStore::load_json(path)
            .with_context(|| format!("While loading users from {}", path.display()))?,
        None => UserStore::new(),
    };
    if config.seed_demo_user {
        users.ensure_default_user().context("While seeding the default user")?;
    } else if users.is_empty() {
        warn!(target: "startup", "no users configured; sign-in will reject every attempt (pass --users or --seed-demo-user)");
    }
    Ok(users)
}

/// Start the pethaven HTTP server with the given configuration.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    log_startup(&config);

    let users = load_users(&config)?;
    info!(target: "startup", users = users.len(), "credential store ready");

    let sessions = SessionManager::new(
        Duration::from_secs(config.session_ttl_secs),
        Duration::from_secs(config.refresh_window_secs),
    )
    .with_rotation_grace(Duration::from_secs(config.rotation_grace_secs));

    // Background session sweeper
    {
        let sessions = sessions.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SESSION_SWEEP_INTERVAL).await;
                let removed = sessions.sweep_expired();
                if removed > 0 { tracing::debug!(removed = removed, "session_sweep"); }
            }
        });
    }

    let provider: Arc<dyn IdentityProvider> =
        Arc::new(LocalIdentityProvider::new(users, sessions, &config.cookie_name, config.cookie_secure));
    let router = app(&config, provider).context("While building the router")?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.http_port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.http_port))?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;
    raw.split(',').next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers.get("user-agent").and_then(|v| v.to_str().ok()).map(|s| s.to_string())
}

async fn login(State(state): State<AppState>, headers: HeaderMap, Json(payload): Json<LoginPayload>) -> Response {
    let mut cookies = CookieBridge::from_headers(&headers);
    let req = LoginRequest {
        username: payload.username,
        password: payload.password,
        ip: client_ip(&headers),
        user_agent: user_agent(&headers),
    };
    match state.provider.sign_in(&req, &mut cookies).await {
        Ok(session) => {
            let mut resp = (
                StatusCode::OK,
                Json(json!({"status": "ok", "user": session.principal.user_id})),
            )
                .into_response();
            cookies.apply(resp.headers_mut());
            resp
        }
        Err(e) => {
            warn!(target: "pethaven::identity", user = %req.username, "sign-in rejected: {}", e);
            e.into_response()
        }
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut cookies = CookieBridge::from_headers(&headers);
    match state.provider.sign_out(&mut cookies).await {
        Ok(ended) => {
            let mut resp = (StatusCode::OK, Json(json!({"status": "ok", "ended": ended}))).into_response();
            cookies.apply(resp.headers_mut());
            resp
        }
        Err(e) => e.into_response(),
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn home(Extension(ctx): Extension<RequestContext>) -> impl IntoResponse {
    Json(json!({"page": "home", "signed_in": ctx.is_signed_in()}))
}

async fn pets(Extension(ctx): Extension<RequestContext>) -> impl IntoResponse {
    Json(json!({"page": "pets", "signed_in": ctx.is_signed_in()}))
}

async fn pet_detail(Path(id): Path<String>) -> impl IntoResponse {
    Json(json!({"page": "pet", "id": id}))
}

fn require_principal(ctx: &RequestContext) -> AppResult<&crate::identity::Principal> {
    ctx.principal.as_ref().ok_or_else(|| AppError::auth("not_signed_in", "this page requires a session"))
}

async fn profile(Extension(ctx): Extension<RequestContext>) -> Result<Json<serde_json::Value>, AppError> {
    let p = require_principal(&ctx)?;
    Ok(Json(json!({
        "page": "profile",
        "user": p.user_id,
        "display_name": p.display_name,
        "request_id": ctx.request_id,
    })))
}

async fn adopt(Extension(ctx): Extension<RequestContext>) -> Result<Json<serde_json::Value>, AppError> {
    let p = require_principal(&ctx)?;
    Ok(Json(json!({"page": "adopt", "user": p.user_id})))
}

async fn adopt_pet(Extension(ctx): Extension<RequestContext>, Path(pet_id): Path<String>) -> Result<Json<serde_json::Value>, AppError> {
    let p = require_principal(&ctx)?;
    Ok(Json(json!({"page": "adopt", "user": p.user_id, "pet_id": pet_id})))
}

async fn auth_page(State(state): State<AppState>, Query(params): Query<QueryParams>) -> impl IntoResponse {
    let redirect = params.get(&state.config.gate.redirect_param).cloned();
    Json(json!({"page": "auth", "redirect": redirect}))
}

async fn not_found() -> AppError {
    AppError::not_found("no_route", "no such page")
}
