use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};

use super::{
    dispatcher::{Connection, Dispatcher},
    event::{ClientEvent, ServerEvent},
    rooms::ConnectionHandle,
};

#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(
    State(dispatcher): State<Dispatcher>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, dispatcher))
}

async fn handle_socket(socket: WebSocket, dispatcher: Dispatcher) {
    let (mut sender, mut receiver) = socket.split();
    let (handle, mut rx) = ConnectionHandle::new();

    let forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg.into()).await.is_err() {
                break;
            }
        }
    });

    let mut conn = Connection::new(handle);
    while let Some(Ok(frame)) = receiver.next().await {
        let Message::Text(text) = frame else {
            continue;
        };

        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => dispatcher.handle_event(&mut conn, event).await,
            Err(_) => conn.handle.send(&ServerEvent::error("malformed event")),
        }
    }

    dispatcher.disconnect(&conn).await;
    forward_task.abort();
}
