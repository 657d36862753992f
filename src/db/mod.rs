mod models;

pub use models::*;

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

pub type DbPool = SqlitePool;

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    // Drop comment lines before splitting; a ';' inside a comment must not
    // become a statement boundary
    let stripped: String = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    for statement in stripped.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

pub async fn init(data_dir: &Path) -> Result<DbPool> {
    let db_path = data_dir.join("clockwork.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    info!("Initializing database at {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    configure_and_migrate(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// Open an in-memory database. Used by integration tests.
pub async fn init_in_memory() -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    configure_and_migrate(&pool).await?;
    Ok(pool)
}

async fn configure_and_migrate(pool: &SqlitePool) -> Result<()> {
    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    run_migrations(pool).await
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: Users, refresh tokens, settings
    execute_sql(pool, include_str!("../../migrations/001_identity.sql")).await?;

    // Migration 002: Sessions, laps, images
    let has_sessions_table: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='sessions'",
    )
    .fetch_optional(pool)
    .await?;
    if has_sessions_table.is_none() {
        execute_sql(pool, include_str!("../../migrations/002_tracking.sql")).await?;
    }

    info!("Migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn comment_semicolons_do_not_split_statements() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let sql = "-- fixture table; the semicolon in this prose is not a boundary\n\
                   CREATE TABLE fixtures (id TEXT PRIMARY KEY);\n\
                   -- seed rows; again with a semicolon\n\
                   INSERT INTO fixtures (id) VALUES ('a');\n\
                   INSERT INTO fixtures (id) VALUES ('b');";
        execute_sql(&pool, sql).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM fixtures")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn shipped_migrations_apply_cleanly() {
        // The real migration files contain prose comments with punctuation
        let pool = init_in_memory().await.unwrap();
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('users', 'refresh_tokens', 'user_settings', 'sessions', 'laps', 'images')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 6);
    }
}
