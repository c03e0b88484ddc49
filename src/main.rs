use axum::serve;
use flagdesk::build_app;
use flagdesk::config::AppConfig;
use flagdesk::store::MemoryStore;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new().filter_level(LevelFilter::Info).init();

    let config = AppConfig::load()?;
    log::info!(
        "configuration loaded: server={}:{}, new flags default to {} x{}, validation={:?}",
        config.server.host,
        config.server.port,
        config.editor.flag_type,
        config.editor.variant_count,
        config.validation
    );

    let store = Arc::new(MemoryStore::new());
    let app = build_app(store, &config);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("flagdesk server running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
