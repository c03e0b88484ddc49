pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{ModelError, ModelResult};

// Export the editing and save surface
pub use logic::{
    cast, infer_cast, save_flag, save_segment, ChangeLog, EntityKind, FlagDefaults, FlagSession,
    SaveReport, SegmentSession, ValidationPolicy, VariantIdRemap,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, Store};

/// Builds the application router over `store` with the loaded settings.
pub fn build_app<S: Store + 'static>(
    store: std::sync::Arc<S>,
    config: &crate::config::AppConfig,
) -> axum::Router {
    let state = api::handlers::ServiceState::new(store, config.editor, config.validation);
    api::routes::create_router().with_state(std::sync::Arc::new(state))
}
