pub mod conversation;
pub mod dispatcher;
pub mod event;
pub mod inbox;
pub mod rooms;
pub mod store;
pub mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::chat_ws))
        .route("/api/conversations", get(inbox::conversations))
        .route("/api/messages", get(inbox::messages))
}
