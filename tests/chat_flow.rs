use cofound_chat::{
    chat::{
        dispatcher::{Connection, Dispatcher},
        event::ClientEvent,
        rooms::{ConnectionHandle, RoomManager},
        store::MessageStore,
    },
    db,
};
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::sync::mpsc::UnboundedReceiver;

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory db");
    db::run_migrations(&pool).await.expect("run migrations");
    pool
}

async fn dispatcher() -> Dispatcher {
    Dispatcher::new(MessageStore::new(memory_pool().await), RoomManager::new())
}

fn connect() -> (Connection, UnboundedReceiver<String>) {
    let (handle, rx) = ConnectionHandle::new();
    (Connection::new(handle), rx)
}

fn event(json: &str) -> ClientEvent {
    serde_json::from_str(json).expect("valid client event")
}

fn next_event(rx: &mut UnboundedReceiver<String>) -> Value {
    let text = rx.try_recv().expect("expected a queued event");
    serde_json::from_str(&text).expect("valid server event")
}

fn assert_no_event(rx: &mut UnboundedReceiver<String>) {
    assert!(rx.try_recv().is_err(), "expected no further events");
}

async fn register(dispatcher: &Dispatcher, conn: &mut Connection, user_id: &str) {
    dispatcher
        .handle_event(
            conn,
            event(&format!(r#"{{"event":"register","data":{{"user_id":"{user_id}"}}}}"#)),
        )
        .await;
}

async fn load_conversation(dispatcher: &Dispatcher, conn: &mut Connection, u1: &str, u2: &str) {
    dispatcher
        .handle_event(
            conn,
            event(&format!(
                r#"{{"event":"load_conversation","data":{{"user1_id":"{u1}","user2_id":"{u2}"}}}}"#
            )),
        )
        .await;
}

async fn send_message(dispatcher: &Dispatcher, conn: &mut Connection, u1: &str, u2: &str, text: &str) {
    dispatcher
        .handle_event(
            conn,
            event(&format!(
                r#"{{"event":"send_message","data":{{"user1_id":"{u1}","user2_id":"{u2}","text":"{text}","sender_name":"Alice"}}}}"#
            )),
        )
        .await;
}

// The end-to-end walkthrough: empty history, send, delivery, reload.
#[tokio::test]
async fn conversation_roundtrip() {
    let dispatcher = dispatcher().await;
    let (mut alice, mut alice_rx) = connect();

    register(&dispatcher, &mut alice, "u1").await;
    assert_no_event(&mut alice_rx);

    load_conversation(&dispatcher, &mut alice, "u1", "u2").await;
    let history = next_event(&mut alice_rx);
    assert_eq!(history["event"], "conversation_history");
    assert_eq!(history["data"]["conversation_id"], "u1-u2");
    assert_eq!(history["data"]["messages"], Value::Array(vec![]));

    send_message(&dispatcher, &mut alice, "u1", "u2", "hi").await;
    // Alice sits in the conversation room, so she gets her own message back.
    let delivery = next_event(&mut alice_rx);
    assert_eq!(delivery["event"], "receive_message");
    assert_eq!(delivery["data"]["conversation_id"], "u1-u2");
    assert_eq!(delivery["data"]["sender_id"], "u1");
    assert_eq!(delivery["data"]["sender_name"], "Alice");
    assert_eq!(delivery["data"]["text"], "hi");
    assert_no_event(&mut alice_rx);

    load_conversation(&dispatcher, &mut alice, "u2", "u1").await;
    let history = next_event(&mut alice_rx);
    assert_eq!(history["data"]["conversation_id"], "u1-u2");
    assert_eq!(history["data"]["messages"].as_array().unwrap().len(), 1);
    assert_eq!(history["data"]["messages"][0]["text"], "hi");
}

#[tokio::test]
async fn recipient_in_conversation_room_receives_exactly_once() {
    let dispatcher = dispatcher().await;
    let (mut alice, _alice_rx) = connect();
    let (mut bob, mut bob_rx) = connect();

    register(&dispatcher, &mut bob, "u2").await;
    load_conversation(&dispatcher, &mut bob, "u2", "u1").await;
    next_event(&mut bob_rx); // history reply

    send_message(&dispatcher, &mut alice, "u1", "u2", "hello bob").await;

    // Bob is in both the conversation room and his personal room; one copy.
    let delivery = next_event(&mut bob_rx);
    assert_eq!(delivery["event"], "receive_message");
    assert_eq!(delivery["data"]["text"], "hello bob");
    assert_no_event(&mut bob_rx);
}

#[tokio::test]
async fn registered_recipient_receives_via_personal_room() {
    let dispatcher = dispatcher().await;
    let (mut alice, mut alice_rx) = connect();
    let (mut bob, mut bob_rx) = connect();

    register(&dispatcher, &mut bob, "u2").await;
    send_message(&dispatcher, &mut alice, "u1", "u2", "hello").await;

    let delivery = next_event(&mut bob_rx);
    assert_eq!(delivery["event"], "receive_message");
    assert_eq!(delivery["data"]["conversation_id"], "u1-u2");
    assert_no_event(&mut bob_rx);
    // The sender never joined a target room and is not echoed to.
    assert_no_event(&mut alice_rx);
}

#[tokio::test]
async fn empty_text_is_rejected_without_persisting() {
    let dispatcher = dispatcher().await;
    let (mut alice, mut alice_rx) = connect();
    let (mut bob, mut bob_rx) = connect();
    register(&dispatcher, &mut bob, "u2").await;

    send_message(&dispatcher, &mut alice, "u1", "u2", "   ").await;

    let reply = next_event(&mut alice_rx);
    assert_eq!(reply["event"], "error");
    assert_no_event(&mut bob_rx);

    load_conversation(&dispatcher, &mut alice, "u1", "u2").await;
    let history = next_event(&mut alice_rx);
    assert_eq!(history["data"]["messages"], Value::Array(vec![]));
}

#[tokio::test]
async fn missing_participant_is_rejected() {
    let dispatcher = dispatcher().await;
    let (mut alice, mut alice_rx) = connect();

    dispatcher
        .handle_event(
            &mut alice,
            event(r#"{"event":"send_message","data":{"user1_id":"u1","text":"hi"}}"#),
        )
        .await;
    let reply = next_event(&mut alice_rx);
    assert_eq!(reply["event"], "error");
    assert_eq!(reply["data"]["msg"], "missing user1_id, user2_id, or text");

    dispatcher
        .handle_event(
            &mut alice,
            event(r#"{"event":"load_conversation","data":{"user1_id":"u1"}}"#),
        )
        .await;
    let reply = next_event(&mut alice_rx);
    assert_eq!(reply["event"], "error");
}

#[tokio::test]
async fn storage_failure_reaches_sender_only_and_never_broadcasts() {
    let pool = memory_pool().await;
    let dispatcher = Dispatcher::new(MessageStore::new(pool.clone()), RoomManager::new());
    let (mut alice, mut alice_rx) = connect();
    let (mut bob, mut bob_rx) = connect();

    register(&dispatcher, &mut alice, "u1").await;
    register(&dispatcher, &mut bob, "u2").await;
    pool.close().await;

    send_message(&dispatcher, &mut alice, "u1", "u2", "hi").await;

    let reply = next_event(&mut alice_rx);
    assert_eq!(reply["event"], "error");
    assert_eq!(reply["data"]["msg"], "failed to store message");
    assert_no_event(&mut bob_rx);
}

#[tokio::test]
async fn register_without_user_id_is_ignored() {
    let dispatcher = dispatcher().await;
    let (mut conn, mut rx) = connect();

    register(&dispatcher, &mut conn, "").await;
    assert_no_event(&mut rx);
    assert_eq!(conn.user_id(), None);
}

#[tokio::test]
async fn reregister_same_id_is_noop() {
    let dispatcher = dispatcher().await;
    let (mut bob, mut bob_rx) = connect();
    let (mut alice, _alice_rx) = connect();

    register(&dispatcher, &mut bob, "u2").await;
    register(&dispatcher, &mut bob, "u2").await;

    send_message(&dispatcher, &mut alice, "u1", "u2", "hi").await;
    next_event(&mut bob_rx);
    assert_no_event(&mut bob_rx);
}

#[tokio::test]
async fn reregister_replaces_personal_room() {
    let dispatcher = dispatcher().await;
    let (mut conn, mut rx) = connect();
    let (mut alice, _alice_rx) = connect();

    register(&dispatcher, &mut conn, "u2").await;
    register(&dispatcher, &mut conn, "u3").await;
    assert_eq!(conn.user_id(), Some("u3"));

    // The old personal room no longer reaches the connection.
    send_message(&dispatcher, &mut alice, "u1", "u2", "for u2").await;
    assert_no_event(&mut rx);

    send_message(&dispatcher, &mut alice, "u1", "u3", "for u3").await;
    let delivery = next_event(&mut rx);
    assert_eq!(delivery["data"]["text"], "for u3");
}

#[tokio::test]
async fn disconnect_removes_connection_from_all_rooms() {
    let dispatcher = dispatcher().await;
    let (mut bob, mut bob_rx) = connect();
    let (mut alice, mut alice_rx) = connect();

    register(&dispatcher, &mut bob, "u2").await;
    load_conversation(&dispatcher, &mut bob, "u1", "u2").await;
    next_event(&mut bob_rx); // history reply

    dispatcher.disconnect(&bob).await;

    send_message(&dispatcher, &mut alice, "u1", "u2", "anyone there?").await;
    assert_no_event(&mut bob_rx);

    // The message is still durable for the next history load.
    load_conversation(&dispatcher, &mut alice, "u1", "u2").await;
    let history = next_event(&mut alice_rx);
    assert_eq!(history["data"]["messages"][0]["text"], "anyone there?");
}
