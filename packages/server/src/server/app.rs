//! Application setup (C14, §4.12): shared state and the axum router
//! assembly. Grounded in the teacher's `server/app.rs` shape (CORS,
//! `TraceLayer`, `GovernorLayer` on mutating routes, an `Extension<AppState>`
//! layered last) but stripped to the thin plumbing §4.12 calls for: no
//! GraphQL, no seesaw engine, no auth middleware — "the core never
//! authorizes" (§7).

use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::PgPool;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::server::routes::{endpoints, health::health_handler, jobs, runs, sessions, usage};
use crate::store::{BaseEndpointStore, BaseJobStore, BaseRunStore, BaseSessionStore};

/// Shared application state (§4.12). Routes depend on `Arc<dyn Base*>`
/// rather than concrete Postgres types so the same router assembly works
/// against `store::memory::MemoryStore` in tests.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub job_store: Arc<dyn BaseJobStore>,
    pub endpoint_store: Arc<dyn BaseEndpointStore>,
    pub run_store: Arc<dyn BaseRunStore>,
    pub session_store: Arc<dyn BaseSessionStore>,
}

/// Builds the management API router. `state` is layered as an
/// `axum::Extension` rather than threaded through `with_state` so handlers
/// can mix it with other extractors (path, query, json) without a custom
/// `FromRef` impl, matching the teacher's `AxumAppState` convention.
pub fn build_app(state: AppState) -> Router {
    // §1: "rate-limit middleware on the public API (simple sliding
    // window; not systems-hard)" — one GovernorLayer on the
    // mutating routes only; reads are left unlimited.
    let rate_limit_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .finish()
            .expect("rate limiter configuration is valid and should never fail"),
    );

    let mutating_routes = Router::new()
        .merge(jobs::mutating_routes())
        .merge(endpoints::mutating_routes())
        .layer(GovernorLayer {
            config: rate_limit_config,
        });

    let read_routes = Router::new()
        .merge(jobs::read_routes())
        .merge(endpoints::read_routes())
        .merge(runs::routes())
        .merge(sessions::routes())
        .merge(usage::routes());

    Router::new()
        .route("/health", get(health_handler))
        .merge(read_routes)
        .merge(mutating_routes)
        .layer(axum::Extension(state))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE]),
        )
        .layer(TraceLayer::new_for_http())
}
