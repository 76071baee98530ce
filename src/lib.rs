//! FerreJunior API Library
//!
//! Hardware store backend: catalog, stock-reserving carts, checkout and
//! courier delivery tracking with order notifications.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod lifecycle;
pub mod middleware_helpers;
pub mod services;
pub mod tracing;

use axum::{extract::FromRef, http::HeaderValue, routing::get, Router};
use sea_orm::DatabaseConnection;
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::auth::AuthService;
use crate::config::AppConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub services: handlers::AppServices,
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Every `/api/v1` route.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        // Catalog, cart and checkout
        .merge(handlers::commerce::products_routes())
        .merge(handlers::commerce::carts_routes())
        .merge(handlers::commerce::checkout_routes())
        // Orders and the customer's address book
        .merge(handlers::orders::orders_routes())
        .merge(handlers::addresses::addresses_routes())
        // Delivery tracking and notifications
        .merge(handlers::tracking::tracking_routes())
        .merge(handlers::notifications::notifications_routes())
        // Customer support
        .merge(handlers::tickets::tickets_routes())
}

/// CORS from the configured origin list. Without one, development is
/// permissive and every other environment allows no cross-origin calls.
pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if config.is_development() {
        ::tracing::info!("Using permissive CORS because no origins are configured (development)");
        CorsLayer::permissive()
    } else {
        ::tracing::warn!("No CORS origins configured; cross-origin requests will be rejected");
        CorsLayer::new()
    }
}

/// Full application router with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "ferrejunior up" }))
        .nest("/api/v1", api_v1_routes())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors_layer(&state.config))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

pub mod prelude {
    pub use crate::auth::{AuthUser, Role};
    pub use crate::db::*;
    pub use crate::errors::*;
    pub use crate::services::*;
}
