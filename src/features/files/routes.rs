use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::features::files::handlers;
use crate::features::files::services::FileService;

/// Owner-scoped file routes
///
/// Note: These routes require authentication
pub fn routes(service: Arc<FileService>) -> Router {
    let single_limit = usize::try_from(service.policy().single_request_limit()).unwrap_or(usize::MAX);
    let batch_limit = usize::try_from(service.policy().batch_request_limit()).unwrap_or(usize::MAX);

    Router::new()
        .route(
            "/api/files/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(single_limit)),
        )
        .route(
            "/api/files/upload/batch",
            post(handlers::upload_files).layer(DefaultBodyLimit::max(batch_limit)),
        )
        .route("/api/files/list", get(handlers::list_files))
        .route("/api/files/categories", get(handlers::list_categories))
        .route(
            "/api/files/{id}",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        .route("/api/files/{id}/download", get(handlers::download_file))
        .with_state(service)
}

/// Unauthenticated preview route
pub fn public_routes(service: Arc<FileService>) -> Router {
    Router::new()
        .route(
            "/api/files/public/{user_id}/{year}/{month}/{day}/{file_name}",
            get(handlers::preview_public_file),
        )
        .with_state(service)
}
