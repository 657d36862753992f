//! End-to-end refresh token lifecycle against an in-memory database.

use clockwork::config::AuthConfig;
use clockwork::crypto;
use clockwork::db::{self, DbPool};
use clockwork::token::{AuthError, TokenService};
use uuid::Uuid;

fn test_service() -> TokenService {
    TokenService::new(&AuthConfig {
        jwt_secret: "integration-test-secret".to_string(),
        access_ttl_minutes: 30,
        refresh_ttl_days: 30,
        // Low iteration count keeps the test fast; production uses 100k
        pbkdf2_iterations: 1_000,
    })
}

async fn create_user(db: &DbPool, svc: &TokenService, username: &str, password: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let hash = crypto::hash_password(password, svc.pbkdf2_iterations());
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO users (id, username, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(username)
    .bind(&hash)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await
    .unwrap();
    id
}

#[tokio::test]
async fn login_issues_valid_pair() {
    let db = db::init_in_memory().await.unwrap();
    let svc = test_service();
    let user_id = create_user(&db, &svc, "alice", "correct horse battery").await;

    let (user, pair) = svc.login(&db, "alice", "correct horse battery").await.unwrap();
    assert_eq!(user.id, user_id);
    assert_eq!(svc.validate_access(&pair.access).unwrap(), user_id);

    // The refresh token must not pass access validation
    assert!(matches!(
        svc.validate_access(&pair.refresh),
        Err(AuthError::TokenInvalid)
    ));
}

#[tokio::test]
async fn login_rejects_bad_credentials_uniformly() {
    let db = db::init_in_memory().await.unwrap();
    let svc = test_service();
    create_user(&db, &svc, "alice", "correct horse battery").await;

    // Wrong password and unknown user produce the same error
    assert!(matches!(
        svc.login(&db, "alice", "wrong password!").await,
        Err(AuthError::AuthenticationFailed)
    ));
    assert!(matches!(
        svc.login(&db, "nobody", "correct horse battery").await,
        Err(AuthError::AuthenticationFailed)
    ));
}

#[tokio::test]
async fn refresh_rotates_and_replay_kills_the_chain() {
    let db = db::init_in_memory().await.unwrap();
    let svc = test_service();
    create_user(&db, &svc, "alice", "correct horse battery").await;

    let (_, first) = svc.login(&db, "alice", "correct horse battery").await.unwrap();

    // Normal rotation succeeds and yields a usable pair
    let second = svc.refresh(&db, &first.refresh).await.unwrap();
    assert_ne!(first.refresh, second.refresh);
    assert!(svc.validate_access(&second.access).is_ok());

    // Replaying the rotated token is reuse
    assert!(matches!(
        svc.refresh(&db, &first.refresh).await,
        Err(AuthError::TokenReuse)
    ));

    // Reuse revoked the whole chain, including the successor
    assert!(matches!(
        svc.refresh(&db, &second.refresh).await,
        Err(AuthError::TokenInvalid)
    ));
}

#[tokio::test]
async fn concurrent_refreshes_have_a_single_winner() {
    // Two callers presenting the same token race on the conditional rotate;
    // exactly one may win, the other observes reuse (or a dead token if the
    // chain was already revoked by then)
    for _ in 0..10 {
        let db = db::init_in_memory().await.unwrap();
        let svc = test_service();
        create_user(&db, &svc, "alice", "correct horse battery").await;
        let (_, pair) = svc.login(&db, "alice", "correct horse battery").await.unwrap();

        let race = |svc: TokenService, db: DbPool, token: String| {
            tokio::spawn(async move { svc.refresh(&db, &token).await })
        };
        let a = race(svc.clone(), db.clone(), pair.refresh.clone());
        let b = race(svc.clone(), db.clone(), pair.refresh.clone());
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "exactly one refresh may rotate the token");

        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(
            loser,
            Err(AuthError::TokenReuse) | Err(AuthError::TokenInvalid)
        ));
    }
}

#[tokio::test]
async fn reuse_does_not_cross_chains() {
    let db = db::init_in_memory().await.unwrap();
    let svc = test_service();
    create_user(&db, &svc, "alice", "correct horse battery").await;

    // Two independent logins, two independent chains
    let (_, chain_a) = svc.login(&db, "alice", "correct horse battery").await.unwrap();
    let (_, chain_b) = svc.login(&db, "alice", "correct horse battery").await.unwrap();

    let rotated_a = svc.refresh(&db, &chain_a.refresh).await.unwrap();
    assert!(matches!(
        svc.refresh(&db, &chain_a.refresh).await,
        Err(AuthError::TokenReuse)
    ));
    assert!(matches!(
        svc.refresh(&db, &rotated_a.refresh).await,
        Err(AuthError::TokenInvalid)
    ));

    // The other device's chain is untouched
    assert!(svc.refresh(&db, &chain_b.refresh).await.is_ok());
}

#[tokio::test]
async fn logout_revokes_and_is_idempotent() {
    let db = db::init_in_memory().await.unwrap();
    let svc = test_service();
    create_user(&db, &svc, "alice", "correct horse battery").await;

    let (_, pair) = svc.login(&db, "alice", "correct horse battery").await.unwrap();

    svc.logout(&db, &pair.refresh).await.unwrap();
    assert!(matches!(
        svc.refresh(&db, &pair.refresh).await,
        Err(AuthError::TokenInvalid)
    ));

    // Second logout of the same token is fine
    svc.logout(&db, &pair.refresh).await.unwrap();
    // So is logging out a token we never issued
    svc.logout(&db, "not-a-token").await.unwrap();
}

#[tokio::test]
async fn tampered_refresh_token_is_invalid() {
    let db = db::init_in_memory().await.unwrap();
    let svc = test_service();
    create_user(&db, &svc, "alice", "correct horse battery").await;

    let (_, pair) = svc.login(&db, "alice", "correct horse battery").await.unwrap();

    let mut tampered = pair.refresh.clone();
    tampered.pop();
    tampered.push('x');
    assert!(matches!(
        svc.refresh(&db, &tampered).await,
        Err(AuthError::TokenInvalid)
    ));
}

#[tokio::test]
async fn refresh_token_signed_elsewhere_is_rejected() {
    let db = db::init_in_memory().await.unwrap();
    let svc = test_service();
    create_user(&db, &svc, "alice", "correct horse battery").await;
    let (_, pair) = svc.login(&db, "alice", "correct horse battery").await.unwrap();

    let other = TokenService::new(&AuthConfig {
        jwt_secret: "different-secret".to_string(),
        access_ttl_minutes: 30,
        refresh_ttl_days: 30,
        pbkdf2_iterations: 1_000,
    });
    assert!(matches!(
        other.refresh(&db, &pair.refresh).await,
        Err(AuthError::TokenInvalid)
    ));
}

#[tokio::test]
async fn login_collects_expired_rows() {
    let db = db::init_in_memory().await.unwrap();
    let svc = test_service();
    let user_id = create_user(&db, &svc, "alice", "correct horse battery").await;

    // Plant an expired row directly
    let past = (chrono::Utc::now() - chrono::Duration::days(1)).to_rfc3339();
    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, chain_id, issued_at, expires_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&user_id)
    .bind("stale-hash")
    .bind(Uuid::new_v4().to_string())
    .bind(&past)
    .bind(&past)
    .execute(&db)
    .await
    .unwrap();

    svc.login(&db, "alice", "correct horse battery").await.unwrap();

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens WHERE token_hash = 'stale-hash'")
            .fetch_one(&db)
            .await
            .unwrap();
    assert_eq!(count, 0);
}
