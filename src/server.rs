//!
//! dumbdo HTTP server
//! ------------------
//! Axum router for the list application and its authentication surface.
//!
//! Responsibilities:
//! - Public auth endpoints: PIN status / verification, auth status, OIDC login flow.
//! - The access gateway in front of every other route (pages, static files, list API).
//! - Background sweeping of lockout records, API rate windows and identity sessions.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::identity::{
    AttemptTracker, Clock, CookieSpec, IdentityGate, PinAuthenticator, RequestContext, SameSite, SystemClock,
    SESSION_COOKIE, SESSION_TTL, SWEEP_INTERVAL,
};

pub mod auth_routes;
pub mod gateway;
pub mod items;
pub mod rate_limit;
pub mod static_files;

use items::ItemStore;
use rate_limit::ApiLimiter;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pin: Arc<PinAuthenticator>,
    pub identity: IdentityGate,
    pub api_limiter: Arc<ApiLimiter>,
    pub items: Arc<ItemStore>,
    /// Domain attribute for the identity session cookie (production only).
    pub cookie_domain: Option<String>,
}

impl AppState {
    pub fn new(config: Config, identity: IdentityGate, clock: Arc<dyn Clock>) -> Self {
        let attempts = Arc::new(AttemptTracker::with_clock(clock.clone()));
        Self {
            pin: Arc::new(PinAuthenticator::new(config.pin.clone(), attempts)),
            api_limiter: Arc::new(ApiLimiter::with_clock(clock)),
            items: Arc::new(ItemStore::new(config.data_dir.clone())),
            identity,
            cookie_domain: config.cookie_domain(),
            config: Arc::new(config),
        }
    }

    pub fn pin_cookie(&self) -> CookieSpec<'_> {
        CookieSpec { name: &self.config.cookie_name, same_site: SameSite::Strict, secure: self.config.production, domain: None, max_age_secs: None }
    }

    pub fn session_cookie(&self) -> CookieSpec<'_> {
        CookieSpec {
            name: SESSION_COOKIE,
            same_site: SameSite::Lax,
            secure: self.config.production,
            domain: self.cookie_domain.as_deref(),
            max_age_secs: Some(SESSION_TTL.as_secs()),
        }
    }

    pub fn request_context(&self, parts: &Parts) -> RequestContext {
        let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|c| c.0);
        RequestContext::from_parts(&parts.headers, &parts.uri, peer, &self.config.cookie_name, self.config.trust_proxy)
    }

    /// One sweep over every piece of expiring in-memory state.
    pub fn sweep(&self) -> usize {
        self.pin.attempts().sweep() + self.api_limiter.sweep() + self.identity.sweep()
    }
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(state.request_context(parts))
    }
}

/// 302 to a location, as browsers expect from a login redirect.
pub fn found(location: &str) -> Response {
    let mut resp = StatusCode::FOUND.into_response();
    if let Ok(v) = HeaderValue::from_str(location) {
        resp.headers_mut().insert(header::LOCATION, v);
    }
    resp
}

/// Build the full router. Routes merged before the gateway layer stay public.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/pin-required", get(auth_routes::pin_required))
        .route("/api/verify-pin", post(auth_routes::verify_pin))
        .route("/api/auth-status", get(auth_routes::auth_status))
        .route("/api/config", get(items::site_config))
        .route("/auth/login", get(auth_routes::auth_login))
        .route("/auth/callback", get(auth_routes::auth_callback))
        .route("/logout", get(auth_routes::logout))
        .route("/login.js", get(static_files::login_js))
        .route("/styles.css", get(static_files::styles_css))
        .route("/favicon.svg", get(static_files::favicon_svg))
        .route("/manifest.json", get(static_files::manifest_json))
        .route("/asset-manifest.json", get(static_files::asset_manifest_json));

    let protected = Router::new()
        .route("/", get(static_files::index_page))
        .route("/login", get(auth_routes::login_page))
        .route("/api/status", get(items::status))
        .route("/api/items", get(items::get_items).post(items::save_items))
        .route("/api/shared/{id}", get(items::shared_item))
        .fallback(static_files::public_file)
        .layer(from_fn_with_state(state.clone(), gateway::access_gateway));

    public.merge(protected).with_state(state)
}

fn spawn_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        tick.tick().await;
        loop {
            tick.tick().await;
            let removed = state.sweep();
            if removed > 0 { debug!(removed = removed, "auth_sweep"); }
        }
    });
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        target: "startup",
        "dumbdo starting: port={}, pin_enabled={}, oidc_configured={}, production={}, data_dir={:?}, public_dir={:?}",
        config.port, config.pin.is_some(), config.oidc.is_some(), config.production, config.data_dir, config.public_dir
    );
    let identity = IdentityGate::from_config(&config).await;
    let state = AppState::new(config, identity, Arc::new(SystemClock));
    state.items.init().await.with_context(|| format!("While initialising data dir {:?}", state.config.data_dir))?;

    spawn_sweeper(state.clone());

    let addr: SocketAddr = format!("0.0.0.0:{}", state.config.port).parse()?;
    if state.config.trust_proxy {
        warn!(
            "TRUST_PROXY is on: client addresses come from X-Forwarded-For. Without a reverse proxy \
             setting that header, clients can evade the PIN lockout; set TRUST_PROXY=false"
        );
    }
    info!("PIN protection: {}", if state.pin.is_enabled() { "enabled" } else { "disabled" });
    info!("OIDC: {}", if state.identity.is_enabled() { "enabled" } else { "disabled" });
    info!("Starting server on {}", addr);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
