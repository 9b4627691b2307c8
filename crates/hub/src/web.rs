use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::buffer::Span;
use crate::config::BasicAuth;
use crate::context::HubContext;

const INDEX_HTML: &str = include_str!("ui/index.html");
const CHART_HTML: &str = include_str!("ui/chart.html");
const STYLE_CSS: &str = include_str!("ui/style.css");
const FUNCTION_JS: &str = include_str!("ui/function.js");

const REALM: &str = "Basic realm=\"homebot\"";

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(ctx: HubContext) -> Router {
    let mut protected = Router::new()
        .route("/", get(index))
        .route("/chart", get(chart))
        .route("/style.css", get(style))
        .route("/function.js", get(script))
        .route("/data", get(data))
        .route("/all_data", get(all_data))
        .route("/last_data", get(last_data))
        .route("/api/status", get(api_status));

    if ctx.config.web.auth.is_some() {
        protected = protected.route_layer(middleware::from_fn_with_state(ctx.clone(), basic_auth));
    }

    protected
        .route("/logout", get(logout))
        .with_state(ctx)
}

async fn index() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], INDEX_HTML)
}

async fn chart() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], CHART_HTML)
}

async fn style() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], STYLE_CSS)
}

async fn script() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], FUNCTION_JS)
}

/// Newest local reading as a space-separated line; empty before the first
/// sample.
async fn data(State(ctx): State<HubContext>) -> String {
    let room = ctx.config.local_room_id();
    let rooms = ctx.rooms.read().await;
    rooms.last(room).map(|r| r.to_line()).unwrap_or_default()
}

async fn all_data(State(ctx): State<HubContext>) -> String {
    ctx.rooms.read().await.render(Span::All)
}

async fn last_data(State(ctx): State<HubContext>) -> String {
    ctx.rooms.read().await.render(Span::Last)
}

async fn api_status(State(ctx): State<HubContext>) -> impl IntoResponse {
    Json(ctx.status_snapshot().await)
}

/// Always 401 so the browser drops its cached credentials.
async fn logout() -> StatusCode {
    StatusCode::UNAUTHORIZED
}

// ---------------------------------------------------------------------------
// Basic auth
// ---------------------------------------------------------------------------

/// `user:pass` from an `Authorization: Basic ...` header.
fn credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn is_allowed(expected: &BasicAuth, headers: &HeaderMap) -> bool {
    matches!(credentials(headers), Some((u, p)) if u == expected.user && p == expected.pass)
}

async fn basic_auth(State(ctx): State<HubContext>, request: Request, next: Next) -> Response {
    let Some(expected) = ctx.config.web.auth.as_ref() else {
        return next.run(request).await;
    };
    if is_allowed(expected, request.headers()) {
        return next.run(request).await;
    }
    tracing::debug!(path = %request.uri().path(), "web: rejected credentials");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, REALM)],
        "authentication required",
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;
    tracing::info!("web ui listening on http://{addr}");
    Ok(listener)
}

pub async fn serve(ctx: HubContext, listener: TcpListener) -> Result<()> {
    axum::serve(listener, router(ctx))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
