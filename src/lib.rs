// Library exports for fitcheck
// Integration tests build the same routers the binary serves.

pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod logging;
pub mod routes;
pub mod state;
pub mod tickets;
pub mod validate;
pub mod wardrobe;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Service;
use crate::state::AppState;

/// The full application for whichever service `state` belongs to.
pub fn app(state: AppState) -> Router {
    let routes = match state.service {
        Service::Wardrobe => wardrobe::router(&state.config),
        Service::Tickets => tickets::router(),
    };

    routes
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
