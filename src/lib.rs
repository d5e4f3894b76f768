use axum::{
    extract::{FromRef, Request},
    http::HeaderName,
    Router,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Seams to the host platform.
pub mod auth;
pub mod config;
pub mod errors;
pub mod hooks;
pub mod mailer;
pub mod models;
pub mod repository;

// Moderation logic.
pub mod bootstrap;
pub mod bulk;
pub mod gate;
pub mod notify;
pub mod roster;
pub mod settings;
pub mod token;

// HTTP surface.
pub mod handlers;
pub mod routes;
use routes::{admin, public};
use auth::AuthUser;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use errors::GateError;
pub use hooks::{Hooks, HooksState};
pub use mailer::{HttpMailer, MailerState, MockMailer};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::gate_check, handlers::get_admin_page, handlers::bulk_action,
        handlers::save_settings
    ),
    components(
        schemas(
            models::User, models::Settings, models::GateRequest, models::BulkActionRequest,
            models::BulkActionResponse, models::SaveSettingsRequest, models::SaveSettingsResponse,
            models::AdminPage, models::RosterPage, models::RosterRow, models::SettingsPage,
            models::RawUserId,
        )
    ),
    tags(
        (name = "registration-gate", description = "Registration moderation API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Every service a request may need, shared immutably across all requests.
#[derive(Clone)]
pub struct AppState {
    /// User store and option store.
    pub repo: RepositoryState,
    /// Mail transport for approval notices.
    pub mailer: MailerState,
    /// Event listeners and filters, registered at startup.
    pub hooks: HooksState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for HooksState {
    fn from_ref(app_state: &AppState) -> HooksState {
        app_state.hooks.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects the request with 401 unless `AuthUser` can be extracted.
async fn auth_middleware(
    _auth_user: AuthUser,
    request: Request,
    next: Next,
) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routes, the authentication layer for `/admin`, and the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    x_request_id.clone(),
                    MakeRequestUuid,
                ))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, correlated by the `x-request-id` header.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
