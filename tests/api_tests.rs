use chrono::Utc;
use registration_gate::{
    AppConfig, AppState, InMemoryRepository, MockMailer, create_router,
    hooks::Hooks,
    models::{AdminPage, BulkActionResponse, User},
    repository::RepositoryState,
};
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct TestApp {
    pub address: String,
    pub mailer: MockMailer,
    pub gate_key: String,
}

fn user(id: i64, roles: &[&str], authenticated: bool) -> User {
    User {
        id,
        email: format!("user{id}@example.org"),
        display_name: format!("User {id}"),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        site_id: 1,
        registered_at: Utc::now(),
        authenticated,
    }
}

/// Serves the full router (auth layer included) on an ephemeral port, backed by memory.
async fn spawn_app() -> TestApp {
    let repo = Arc::new(InMemoryRepository::with_users(vec![
        user(1, &["administrator"], true),
        user(2, &["subscriber"], false),
        user(3, &["subscriber"], true),
    ])) as RepositoryState;
    let mailer = MockMailer::new();
    let config = AppConfig::default();
    let gate_key = config.gate_api_key.clone();

    let state = AppState {
        repo,
        mailer: Arc::new(mailer.clone()),
        hooks: Arc::new(Hooks::builder().with_audit_log().build()),
        config,
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        mailer,
        gate_key,
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .get(&format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_admin_routes_require_a_session() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/admin/registrations", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_gate_requires_the_service_key() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let url = format!("{}/auth/gate", app.address);
    let body = serde_json::json!({ "user_id": 3 });

    let anonymous = client.post(&url).json(&body).send().await.unwrap();
    assert_eq!(anonymous.status(), 401);

    let wrong_key = client
        .post(&url)
        .bearer_auth("not-the-key")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_key.status(), 401);

    // The admin bypass header does not open the gate either.
    let bypass = client
        .post(&url)
        .header("x-user-id", "1")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(bypass.status(), 401);

    let service = client
        .post(&url)
        .bearer_auth(&app.gate_key)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(service.status(), 200);
}

#[tokio::test]
async fn test_approval_flow_end_to_end() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // 1. Pending user is refused at the gate.
    let denied = client
        .post(&format!("{}/auth/gate", app.address))
        .bearer_auth(&app.gate_key)
        .json(&serde_json::json!({ "user_id": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);
    let body: serde_json::Value = denied.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("confirmed by an administrator"));

    // 2. Admin opens the pending tab (local x-user-id bypass) and gets a token.
    let page: AdminPage = client
        .get(&format!("{}/admin/registrations?tab=pending", app.address))
        .header("x-user-id", "1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let AdminPage::Pending(page) = page else {
        panic!("expected the pending tab");
    };
    assert_eq!(page.users.len(), 1);

    // 3. Approve.
    let result: BulkActionResponse = client
        .post(&format!("{}/admin/registrations/bulk", app.address))
        .header("x-user-id", "1")
        .json(&serde_json::json!({ "action": "auth", "users": ["2"], "token": page.token }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result.notice.as_deref(), Some("1 user authenticated"));
    assert_eq!(app.mailer.sent().len(), 1);

    // 4. The gate now lets the user through.
    let allowed = client
        .post(&format!("{}/auth/gate", app.address))
        .bearer_auth(&app.gate_key)
        .json(&serde_json::json!({ "user_id": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);
    let user: User = allowed.json().await.unwrap();
    assert!(user.authenticated);
}
