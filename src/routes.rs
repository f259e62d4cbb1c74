use axum::Router;
use axum::routing::get;
use crate::state::AppState;

pub fn configure_routes() -> Router<AppState> {
    Router::new().merge(health_routes())
}

fn health_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(|| async { "ok" }))
}
