use crate::{
    AppState,
    auth::{AuthUser, Capability, GateClient},
    bulk::{BulkAction, Dispatcher},
    errors::GateError,
    gate,
    models::{
        AdminPage, AdminTab, BulkActionRequest, BulkActionResponse, GateRequest, RosterMode,
        RosterPage, RosterQuery, RosterRow, SaveSettingsRequest, SaveSettingsResponse, Settings,
        SettingsPage, User,
    },
    roster,
    settings::SettingsStore,
    token,
};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

// --- Query Structs ---

/// AdminPageParams
///
/// Query parameters of GET /admin/registrations.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct AdminPageParams {
    /// `pending` (default), `authed` or `settings`.
    pub tab: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// --- Helpers ---

fn settings_store(state: &AppState) -> SettingsStore {
    SettingsStore::new(state.repo.clone(), state.hooks.clone())
}

async fn current_settings(state: &AppState) -> Result<Settings, GateError> {
    settings_store(state).read_or_default(&state.config.site).await
}

/// The capability that opens the admin page: network user management in network mode,
/// user promotion otherwise.
fn require_page_access(user: &AuthUser, state: &AppState) -> Result<(), GateError> {
    let needed = if state.config.multisite {
        Capability::ManageNetworkUsers
    } else {
        Capability::PromoteUsers
    };
    if user.can(needed) {
        Ok(())
    } else {
        Err(GateError::Forbidden)
    }
}

// --- Handlers ---

/// gate_check
///
/// [Service Route] The host login pipeline calls this once a user's credentials have been
/// verified, presenting its `GATE_API_KEY` as a bearer token. Approved accounts come back
/// unchanged; pending or blocked ones are refused with the configured message.
#[utoipa::path(
    post,
    path = "/auth/gate",
    request_body = GateRequest,
    responses(
        (status = 200, description = "Login allowed", body = User),
        (status = 401, description = "Missing or wrong service key"),
        (status = 403, description = "Account pending approval"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn gate_check(
    _client: GateClient,
    State(state): State<AppState>,
    Json(payload): Json<GateRequest>,
) -> Result<Json<User>, GateError> {
    let user = state
        .repo
        .get_user(payload.user_id)
        .await
        .ok_or(GateError::NotFound)?;
    let settings = current_settings(&state).await?;
    gate::authorize(user, &settings, &state.hooks).map(Json)
}

/// get_admin_page
///
/// [Admin Route] Renders one tab of the moderation page. The pending and authenticated tabs
/// list users (ordered by id) with a fresh `bulk-action` token; the settings tab returns the
/// record with a `save-settings` token.
#[utoipa::path(
    get,
    path = "/admin/registrations",
    params(AdminPageParams),
    responses(
        (status = 200, description = "Admin page", body = AdminPage),
        (status = 403, description = "Missing capability")
    )
)]
pub async fn get_admin_page(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<AdminPageParams>,
) -> Result<Json<AdminPage>, GateError> {
    require_page_access(&auth, &state)?;

    let tab = AdminTab::from_param(params.tab.as_deref());
    if tab == AdminTab::Settings {
        let settings = current_settings(&state).await?;
        let token = token::issue_token(&state.config.csrf_secret, token::SAVE_SETTINGS, auth.id);
        return Ok(Json(AdminPage::Settings(SettingsPage { settings, token })));
    }

    let (mode, title, action) = match tab {
        AdminTab::Pending => (RosterMode::Pending, "Authenticate Users", BulkAction::Authenticate),
        _ => (RosterMode::Authenticated, "Block Users", BulkAction::Block),
    };

    // Negative paging values are clamped to zero.
    let query = RosterQuery {
        limit: params.limit.map(|limit| limit.max(0)),
        offset: params.offset.map(|offset| offset.max(0)),
        site_id: None,
    };
    let users = roster::users(state.repo.as_ref(), &state.config, mode, query)
        .await
        .into_iter()
        .map(|user| RosterRow {
            selectable: user.id != auth.id,
            user,
        })
        .collect();

    let page = RosterPage {
        title: title.to_string(),
        bulk_action: action.tag().to_string(),
        allow_delete: auth.can(Capability::DeleteUsers) && !state.config.multisite,
        token: token::issue_token(&state.config.csrf_secret, token::BULK_ACTION, auth.id),
        users,
    };

    Ok(Json(match tab {
        AdminTab::Pending => AdminPage::Pending(page),
        _ => AdminPage::Authed(page),
    }))
}

/// bulk_action
///
/// [Admin Route] Applies `auth`, `block` or `delete` to the selected users.
///
/// A token mismatch, an unknown action, a missing capability or an empty selection leave
/// everything untouched and return no notice. Selecting one's own account for `block` or
/// `delete` is rejected with 400.
#[utoipa::path(
    post,
    path = "/admin/registrations/bulk",
    request_body = BulkActionRequest,
    responses(
        (status = 200, description = "Applied or ignored", body = BulkActionResponse),
        (status = 400, description = "Acting account selected for block/delete")
    )
)]
pub async fn bulk_action(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<BulkActionRequest>,
) -> Result<Json<BulkActionResponse>, GateError> {
    require_page_access(&auth, &state)?;

    if !token::verify_token(
        &state.config.csrf_secret,
        token::BULK_ACTION,
        auth.id,
        &payload.token,
    ) {
        tracing::warn!(actor = auth.id, "bulk action ignored: token mismatch");
        return Ok(Json(BulkActionResponse::default()));
    }

    let Ok(action) = payload.action.parse::<BulkAction>() else {
        tracing::debug!(action = %payload.action, "unknown bulk action ignored");
        return Ok(Json(BulkActionResponse::default()));
    };

    let settings = current_settings(&state).await?;
    let dispatcher = Dispatcher {
        repo: state.repo.as_ref(),
        mailer: state.mailer.as_ref(),
        hooks: &state.hooks,
        settings: &settings,
    };

    match dispatcher.dispatch(&auth, action, &payload.users).await {
        Ok(Some(outcome)) => Ok(Json(BulkActionResponse {
            notice: Some(outcome.notice()),
            processed: outcome.processed.len(),
        })),
        Ok(None) | Err(GateError::Forbidden) => Ok(Json(BulkActionResponse::default())),
        Err(e) => Err(e),
    }
}

/// save_settings
///
/// [Admin Route] Replaces the whole settings record. A token mismatch is ignored silently.
#[utoipa::path(
    post,
    path = "/admin/registrations/settings",
    request_body = SaveSettingsRequest,
    responses((status = 200, description = "Saved or ignored", body = SaveSettingsResponse))
)]
pub async fn save_settings(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<SaveSettingsRequest>,
) -> Result<Json<SaveSettingsResponse>, GateError> {
    require_page_access(&auth, &state)?;

    let result = settings_store(&state)
        .write(
            payload.settings,
            &state.config.csrf_secret,
            auth.id,
            &payload.token,
        )
        .await;

    match result {
        Ok(_) => Ok(Json(SaveSettingsResponse {
            saved: true,
            notice: Some("Saved".to_string()),
        })),
        Err(GateError::InvalidToken) => Ok(Json(SaveSettingsResponse::default())),
        Err(e) => Err(e),
    }
}
