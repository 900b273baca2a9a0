pub mod handlers;
pub mod state;

use std::path::Path;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

pub use state::AppState;

use crate::{config::PUBLIC_ROUTE, storage::Bucket};

/// Builds the HTTP surface. Only the artifact buckets under `data_dir` are
/// served publicly; records and catalog documents stay private.
pub fn router(state: AppState, data_dir: &Path, max_upload_bytes: usize) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::hello))
        .route(
            "/generate",
            post(handlers::generate).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/categories", get(handlers::categories))
        .route("/category", get(handlers::category))
        .route("/history", get(handlers::history))
        .route("/gallery", get(handlers::gallery));
    for bucket in [Bucket::Faces, Bucket::Targets, Bucket::Results] {
        router = router.nest_service(
            &format!("{PUBLIC_ROUTE}/{}", bucket.dir()),
            ServeDir::new(data_dir.join(bucket.dir())),
        );
    }
    router.layer(TraceLayer::new_for_http()).with_state(state)
}
