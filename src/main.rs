use std::sync::Arc;

use axum::{routing::get, Router};
use cofound_chat::{
    chat::{self, dispatcher::Dispatcher, rooms::RoomManager, store::MessageStore},
    db,
    identity::MemoryIdentityResolver,
    AppState,
};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db_url = dotenv::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:cofound.db?mode=rwc".to_owned());
    let db_pool = db::connect_pool(&db_url).await?;
    db::run_migrations(&db_pool).await?;

    let store = MessageStore::new(db_pool.clone());
    let dispatcher = Dispatcher::new(store.clone(), RoomManager::new());
    let app_state = AppState {
        db_pool,
        store,
        dispatcher,
        identity: Arc::new(MemoryIdentityResolver::new()),
    };

    let app = Router::new()
        .route("/health", get(db::health))
        .merge(chat::router())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let bind = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("listening on {bind}");
    axum::serve(listener, app).await?;
    Ok(())
}
