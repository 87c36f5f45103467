use anyhow::Context;
use axum::{extract::State, http::StatusCode};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

pub async fn connect_pool(db_url: &str) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(db_url)
        .await
        .with_context(|| format!("connect to sqlite via {db_url}"))?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let stmts = [
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            seq          INTEGER PRIMARY KEY AUTOINCREMENT,
            id           TEXT NOT NULL UNIQUE,
            sender_id    TEXT NOT NULL,
            sender_name  TEXT NOT NULL,
            recipient_id TEXT NOT NULL,
            text         TEXT NOT NULL,
            timestamp    INTEGER NOT NULL
        );"#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages (sender_id, recipient_id, timestamp);"#,
    ];
    for s in &stmts {
        sqlx::query(s)
            .execute(pool)
            .await
            .with_context(|| format!("apply migration: {}", &s[..s.len().min(60)].replace('\n', " ")))?;
    }
    Ok(())
}

pub async fn health(State(pool): State<SqlitePool>) -> StatusCode {
    match pool.acquire().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
