pub mod browse;
pub mod health;
pub mod queries;
pub mod repos;
pub mod run;
pub mod search;
pub mod stats;
pub mod tasks;
pub mod types;

use axum::routing::{get, post};
use axum::{Extension, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::application::application::Application;

pub fn router(app: Application) -> Router {
    let api = Router::new()
        .route("/health", get(health::health))
        .route("/repos", get(repos::list).post(repos::create))
        .route("/repos/:id", get(repos::detail).delete(repos::delete))
        .route("/repos/:id/check", post(repos::check))
        .route("/repos/:id/sync", post(repos::sync_repo))
        .route("/stats", get(stats::stats))
        .route("/tree", get(browse::tree))
        .route("/files/*path", get(browse::file_detail))
        .route("/chunks/:id", get(browse::chunk_detail))
        .route("/search", get(search::search))
        .route("/run/query", post(run::run_query))
        .route("/run/:stage", post(run::run_stage))
        .route("/query", post(run::query_sync))
        .route("/queries", get(queries::list))
        .route("/queries/:id", get(queries::detail))
        .route("/strategies", get(queries::strategies))
        .route("/tasks", get(tasks::list))
        .route("/tasks/:id", get(tasks::detail))
        .route("/tasks/:id/stream", get(tasks::stream));

    let mut router = Router::new().nest("/api", api);

    // thin dashboard SPA, served when the bundle is present
    let dashboard = std::path::Path::new("dashboard");
    if dashboard.is_dir() {
        router = router.nest_service("/ui", ServeDir::new(dashboard));
    }

    router
        .layer(Extension(app))
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::new())
}
