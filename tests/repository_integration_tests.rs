use registration_gate::{
    models::{RosterMode, RosterQuery},
    repository::{PostgresRepository, Repository},
};
use serial_test::serial;
use sqlx::{PgPool, postgres::PgPoolOptions};

// Runs against DATABASE_URL. Each test truncates the tables it uses.
async fn setup() -> (PgPool, PostgresRepository) {
    dotenv::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("Failed to connect to Postgres");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate");
    sqlx::query("TRUNCATE users, user_meta, site_options RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .unwrap();
    (pool.clone(), PostgresRepository::new(pool))
}

async fn seed_user(pool: &PgPool, email: &str, site_id: i64) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO users (email, display_name, roles, site_id) \
         VALUES ($1, $1, ARRAY['subscriber'], $2) RETURNING id",
    )
    .bind(email)
    .bind(site_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Postgres"]
async fn test_flag_round_trip_moves_user_between_rosters() {
    let (pool, repo) = setup().await;
    let id = seed_user(&pool, "a@example.org", 1).await;
    let query = RosterQuery::default();

    assert_eq!(repo.list_user_ids(RosterMode::Pending, &query).await, vec![id]);

    repo.set_authenticated(id).await.unwrap();
    assert!(repo.get_user(id).await.unwrap().authenticated);
    assert!(repo.list_user_ids(RosterMode::Pending, &query).await.is_empty());
    assert_eq!(repo.list_user_ids(RosterMode::Authenticated, &query).await, vec![id]);

    repo.clear_authenticated(id).await.unwrap();
    assert!(!repo.get_user(id).await.unwrap().authenticated);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Postgres"]
async fn test_batched_flagging_and_site_filter() {
    let (pool, repo) = setup().await;
    let a = seed_user(&pool, "a@example.org", 1).await;
    let b = seed_user(&pool, "b@example.org", 1).await;
    let c = seed_user(&pool, "c@example.org", 2).await;

    let written = repo.mark_users_authenticated(&[a, b]).await.unwrap();
    assert_eq!(written, 2);

    let site_one = RosterQuery {
        site_id: Some(1),
        ..Default::default()
    };
    assert_eq!(repo.list_user_ids(RosterMode::Authenticated, &site_one).await, vec![a, b]);
    assert!(repo.list_user_ids(RosterMode::Pending, &site_one).await.is_empty());
    assert_eq!(
        repo.list_user_ids(RosterMode::Pending, &RosterQuery::default()).await,
        vec![c]
    );

    // Re-flagging an approved user is an upsert, not a conflict.
    repo.mark_users_authenticated(&[a]).await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Postgres"]
async fn test_delete_user_removes_meta() {
    let (pool, repo) = setup().await;
    let id = seed_user(&pool, "gone@example.org", 1).await;
    repo.set_authenticated(id).await.unwrap();

    assert!(repo.delete_user(id).await.unwrap());
    assert!(!repo.delete_user(id).await.unwrap());
    assert!(repo.get_user(id).await.is_none());

    let meta_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_meta WHERE user_id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(meta_rows, 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Postgres"]
async fn test_option_store_semantics() {
    let (_pool, repo) = setup().await;

    assert!(repo.add_option("k", serde_json::json!("first")).await.unwrap());
    assert!(!repo.add_option("k", serde_json::json!("second")).await.unwrap());
    assert_eq!(repo.get_option("k").await.unwrap(), Some(serde_json::json!("first")));

    repo.update_option("k", serde_json::json!({"x": 1})).await.unwrap();
    assert_eq!(repo.get_option("k").await.unwrap(), Some(serde_json::json!({"x": 1})));

    assert!(repo.delete_option("k").await.unwrap());
    assert!(!repo.delete_option("k").await.unwrap());
    assert_eq!(repo.get_option("k").await.unwrap(), None);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Postgres"]
async fn test_flag_writes_report_unknown_users() {
    let (pool, repo) = setup().await;
    let id = seed_user(&pool, "known@example.org", 1).await;

    assert!(repo.set_authenticated(id).await.unwrap());
    assert!(!repo.set_authenticated(id + 1000).await.unwrap());
    assert!(repo.clear_authenticated(id).await.unwrap());
    assert!(!repo.clear_authenticated(id + 1000).await.unwrap());

    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_meta WHERE user_id <> $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(orphans, 0);
    assert!(!repo.get_user(id).await.unwrap().authenticated);
}
