use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::{self, AppState};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Editor helpers
        .route("/operations", get(handlers::get_operations))
        .route("/values/cast", post(handlers::cast_value))
        // Flags
        .route("/flags", get(handlers::list_flags::<S>))
        .route("/flags/draft", post(handlers::draft_flag::<S>))
        .route("/flags/save", post(handlers::save_flag_session::<S>))
        .route(
            "/flags/:flag_id",
            get(handlers::get_flag::<S>).delete(handlers::delete_flag::<S>),
        )
        // Segments
        .route("/segments", get(handlers::list_segments::<S>))
        .route("/segments/draft", post(handlers::draft_segment))
        .route("/segments/save", post(handlers::save_segment_session::<S>))
        .route(
            "/segments/:segment_id",
            get(handlers::get_segment::<S>).delete(handlers::delete_segment::<S>),
        )
}
