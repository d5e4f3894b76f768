use chrono::Utc;
use registration_gate::{
    GateError,
    gate,
    hooks::Hooks,
    models::{Settings, SiteMetadata, User},
};

fn site() -> SiteMetadata {
    SiteMetadata {
        name: "Example".to_string(),
        url: "https://example.org".to_string(),
        admin_email: "admin@example.org".to_string(),
    }
}

fn user(id: i64, authenticated: bool) -> User {
    User {
        id,
        email: format!("user{id}@example.org"),
        display_name: format!("User {id}"),
        roles: vec!["subscriber".to_string()],
        site_id: 1,
        registered_at: Utc::now(),
        authenticated,
    }
}

#[test]
fn test_approved_user_passes_unchanged() {
    let settings = Settings::defaults(&site());
    let hooks = Hooks::default();
    let approved = user(5, true);

    let result = gate::authorize(approved.clone(), &settings, &hooks).expect("login allowed");

    assert_eq!(result, approved);
}

#[test]
fn test_pending_users_are_denied_with_configured_message() {
    let settings = Settings {
        error: "Wait for approval".to_string(),
        ..Settings::defaults(&site())
    };
    let hooks = Hooks::default();

    for id in 1..=5 {
        match gate::authorize(user(id, false), &settings, &hooks) {
            Err(GateError::Unauthenticated(message)) => assert_eq!(message, "Wait for approval"),
            other => panic!("expected denial, got {other:?}"),
        }
    }
}

#[test]
fn test_denial_message_passes_through_filters_in_order() {
    let settings = Settings {
        error: "pending".to_string(),
        ..Settings::defaults(&site())
    };
    let hooks = Hooks::builder()
        .filter_error_message(|m| format!("{m}!"))
        .filter_error_message(|m| m.to_uppercase())
        .build();

    let err = gate::authorize(user(1, false), &settings, &hooks).unwrap_err();

    assert_eq!(err.to_string(), "PENDING!");
}

#[test]
fn test_gate_is_idempotent() {
    let settings = Settings::defaults(&site());
    let hooks = Hooks::default();
    let pending = user(9, false);

    let first = gate::authorize(pending.clone(), &settings, &hooks).unwrap_err();
    let second = gate::authorize(pending, &settings, &hooks).unwrap_err();

    assert_eq!(first.to_string(), second.to_string());
}
