//! Ownership tree behavior at the schema level: deletes cascade down the
//! session -> lap -> image chain, and rows are always scoped by user.

use axum::extract::{Path, State};
use axum::Json;
use clockwork::api::auth::AuthUser;
use clockwork::api::sessions::create_lap;
use clockwork::config::Config;
use clockwork::db::{self, CreateLapRequest, DbPool};
use clockwork::AppState;
use std::sync::Arc;
use uuid::Uuid;

async fn insert_user(db: &DbPool) -> String {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO users (id, username, password_hash, created_at, updated_at) VALUES (?, ?, 'x', ?, ?)",
    )
    .bind(&id)
    .bind(format!("user-{}", id))
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await
    .unwrap();
    id
}

async fn insert_session(db: &DbPool, user_id: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO sessions (id, user_id, started_at, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(&now)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await
    .unwrap();
    id
}

async fn insert_lap(db: &DbPool, user_id: &str, session_id: &str, number: i64) -> String {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO laps (id, user_id, session_id, lap_number, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(session_id)
    .bind(number)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await
    .unwrap();
    id
}

async fn insert_image(db: &DbPool, user_id: &str, session_id: &str, lap_id: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let key = format!("{}/{}/{}_{}.png", user_id, session_id, lap_id, id);
    sqlx::query(
        "INSERT INTO images (id, user_id, session_id, lap_id, object_key, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(session_id)
    .bind(lap_id)
    .bind(&key)
    .bind(&now)
    .execute(db)
    .await
    .unwrap();
    id
}

async fn count(db: &DbPool, sql: &str, bind: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(sql).bind(bind).fetch_one(db).await.unwrap();
    n
}

#[tokio::test]
async fn deleting_a_session_cascades_to_laps_and_images() {
    let db = db::init_in_memory().await.unwrap();
    let user = insert_user(&db).await;
    let session = insert_session(&db, &user).await;
    let lap = insert_lap(&db, &user, &session, 1).await;
    insert_image(&db, &user, &session, &lap).await;
    insert_image(&db, &user, &session, &lap).await;

    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(&session)
        .execute(&db)
        .await
        .unwrap();

    assert_eq!(count(&db, "SELECT COUNT(*) FROM laps WHERE session_id = ?", &session).await, 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM images WHERE session_id = ?", &session).await, 0);
}

#[tokio::test]
async fn deleting_a_lap_cascades_to_its_images_only() {
    let db = db::init_in_memory().await.unwrap();
    let user = insert_user(&db).await;
    let session = insert_session(&db, &user).await;
    let lap_one = insert_lap(&db, &user, &session, 1).await;
    let lap_two = insert_lap(&db, &user, &session, 2).await;
    insert_image(&db, &user, &session, &lap_one).await;
    let survivor = insert_image(&db, &user, &session, &lap_two).await;

    sqlx::query("DELETE FROM laps WHERE id = ?")
        .bind(&lap_one)
        .execute(&db)
        .await
        .unwrap();

    assert_eq!(count(&db, "SELECT COUNT(*) FROM images WHERE lap_id = ?", &lap_one).await, 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM images WHERE id = ?", &survivor).await, 1);
}

#[tokio::test]
async fn deleting_a_user_removes_the_whole_tree() {
    let db = db::init_in_memory().await.unwrap();
    let user = insert_user(&db).await;
    let session = insert_session(&db, &user).await;
    let lap = insert_lap(&db, &user, &session, 1).await;
    insert_image(&db, &user, &session, &lap).await;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&user)
        .execute(&db)
        .await
        .unwrap();

    assert_eq!(count(&db, "SELECT COUNT(*) FROM sessions WHERE user_id = ?", &user).await, 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM laps WHERE user_id = ?", &user).await, 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM images WHERE user_id = ?", &user).await, 0);
}

#[tokio::test]
async fn concurrent_lap_creations_get_distinct_numbers() {
    let db = db::init_in_memory().await.unwrap();
    let user = insert_user(&db).await;
    let session = insert_session(&db, &user).await;
    let state = Arc::new(AppState::new(Config::default(), db.clone()));

    let spawn_create = |state: Arc<AppState>, user: String, session: String| {
        tokio::spawn(async move {
            create_lap(
                State(state),
                AuthUser { id: user },
                Path(session),
                Json(CreateLapRequest {
                    name: None,
                    started_at: None,
                    is_break: None,
                }),
            )
            .await
        })
    };

    let a = spawn_create(state.clone(), user.clone(), session.clone());
    let b = spawn_create(state.clone(), user.clone(), session.clone());
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let numbers: Vec<(i64,)> =
        sqlx::query_as("SELECT lap_number FROM laps WHERE session_id = ? ORDER BY lap_number")
            .bind(&session)
            .fetch_all(&db)
            .await
            .unwrap();
    assert_eq!(numbers, vec![(1,), (2,)]);
}

#[tokio::test]
async fn user_scoped_queries_do_not_see_other_tenants() {
    let db = db::init_in_memory().await.unwrap();
    let owner = insert_user(&db).await;
    let other = insert_user(&db).await;
    let session = insert_session(&db, &owner).await;

    let found: Option<(String,)> =
        sqlx::query_as("SELECT id FROM sessions WHERE id = ? AND user_id = ?")
            .bind(&session)
            .bind(&other)
            .fetch_optional(&db)
            .await
            .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn duplicate_usernames_are_rejected() {
    let db = db::init_in_memory().await.unwrap();
    let now = chrono::Utc::now().to_rfc3339();
    for attempt in 0..2 {
        let result = sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at, updated_at) VALUES (?, 'taken', 'x', ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&now)
        .bind(&now)
        .execute(&db)
        .await;
        if attempt == 0 {
            assert!(result.is_ok());
        } else {
            assert!(result.is_err());
        }
    }
}
