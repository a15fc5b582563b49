pub mod error;
pub mod extract;
pub mod handlers;
pub mod util;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::{entitlement::EntitlementGate, rate_limit::RateLimiter};
use bugbridge_core::{
    ConnectionLifecycle, CredentialStore, HealthProbe, RequestExecutor, TrackerConfig,
};

/// Shared application state handed to every handler.
pub struct AppContext<S>
where
    S: CredentialStore + 'static,
{
    pub tracker: TrackerConfig,
    pub http: reqwest::Client,
    pub store: Arc<S>,
    pub executor: Arc<RequestExecutor<S>>,
    pub probe: Arc<HealthProbe<S>>,
    pub lifecycle: Arc<ConnectionLifecycle<S>>,
    pub entitlements: Arc<dyn EntitlementGate>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Where the browser is sent after a completed authorization.
    pub app_base_url: String,
}

pub type SharedContext<S> = Arc<AppContext<S>>;

pub fn router<S>(context: SharedContext<S>) -> Router
where
    S: CredentialStore + 'static,
{
    Router::new()
        .route("/tracker/connect", get(handlers::connect::begin::<S>))
        .route("/tracker/callback", get(handlers::callback::complete::<S>))
        .route("/tracker/status", get(handlers::status::get_status::<S>))
        .route(
            "/tracker/connection",
            delete(handlers::connect::disconnect::<S>),
        )
        .route("/tracker/meta", get(handlers::meta::get_meta::<S>))
        .route("/tracker/issues", post(handlers::issues::create_issue::<S>))
        .route(
            "/tracker/issues/{issue_key}/attachments",
            post(handlers::attachments::upload::<S>),
        )
        // The attachment handler enforces the documented 10 MB encoded-payload
        // guard itself; disable axum's 2 MB default so that guard is reachable
        // and returns IMAGE_TOO_LARGE rather than a bare 413.
        .layer(DefaultBodyLimit::disable())
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(context)
}
