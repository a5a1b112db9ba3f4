pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Assembles the full router. Split out from `main` so integration tests can
/// build the same app against fake collaborators without binding a socket.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::routes(state.clone()))
        .merge(routes::models::routes(state.clone()))
        .merge(routes::chat::routes(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
