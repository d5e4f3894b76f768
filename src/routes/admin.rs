use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// The moderation panel. Mounted under `/admin` behind the authentication layer; the page
/// capability (`promote_users`, or `manage_network_users` in network mode) is checked by
/// each handler.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/registrations?tab=pending|authed|settings
        // Pending and authenticated rosters, or the settings record.
        .route("/registrations", get(handlers::get_admin_page))
        // POST /admin/registrations/bulk
        // Approve, block or delete a selection of users.
        .route("/registrations/bulk", post(handlers::bulk_action))
        // POST /admin/registrations/settings
        // Replace the settings record.
        .route("/registrations/settings", post(handlers::save_settings))
}
