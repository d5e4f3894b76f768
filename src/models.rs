use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// A registered account as stored in the `users` table. The `authenticated` field is not a
/// column: it is projected from the `user_meta` row `authentication = '1'`, so a missing row
/// and a blocked account both read as `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    // Role slugs, e.g. 'subscriber', 'administrator', 'super_admin'.
    pub roles: Vec<String>,
    // Tenant the account registered on. Ignored by roster queries in network mode.
    pub site_id: i64,
    #[ts(type = "string")]
    pub registered_at: DateTime<Utc>,
    #[sqlx(default)]
    pub authenticated: bool,
}

/// Settings
///
/// The unified settings record, persisted as one JSON value under the
/// `confirm-user-registration` option key. Always written as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Settings {
    /// Contact address of the administrator.
    pub administrator: String,
    /// Message shown at the login form to accounts that are still pending.
    pub error: String,
    /// Value of the `From` header on approval mails.
    pub from: String,
    pub subject: String,
    pub message: String,
}

/// SiteMetadata
///
/// The handful of site facts the default settings are derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SiteMetadata {
    pub name: String,
    pub url: String,
    pub admin_email: String,
}

/// RosterMode
///
/// Which side of the flag a roster query returns. Every user is in exactly one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum RosterMode {
    /// No `authentication = '1'` row.
    Pending,
    /// Carries `authentication = '1'`.
    Authenticated,
}

/// RosterQuery
///
/// Optional refinements for roster queries. Results are always ordered by id ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Restricts the query to one tenant. `None` spans the whole network.
    pub site_id: Option<i64>,
}

/// AdminTab
///
/// The three tabs of the admin page, selected through `?tab=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum AdminTab {
    Pending,
    Authed,
    Settings,
}

impl AdminTab {
    /// Missing or empty selects the pending tab; unknown values fall back to the
    /// authenticated list, matching how the page has always rendered them.
    pub fn from_param(tab: Option<&str>) -> Self {
        match tab.map(str::trim) {
            None | Some("") | Some("pending") => AdminTab::Pending,
            Some("settings") => AdminTab::Settings,
            Some(_) => AdminTab::Authed,
        }
    }
}

/// RawUserId
///
/// A user identifier as submitted in a bulk action. Clients send either JSON numbers or
/// strings; anything that is not a positive integer is skipped by the dispatcher.
/// `Other` soaks up every remaining JSON value so one bad entry never rejects the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(untagged)]
#[ts(export)]
pub enum RawUserId {
    Number(i64),
    Text(String),
    Other(serde_json::Value),
}

impl RawUserId {
    /// Returns the id when the value is numeric, `None` otherwise.
    pub fn as_id(&self) -> Option<i64> {
        let id = match self {
            RawUserId::Number(n) => *n,
            RawUserId::Text(s) => s.trim().parse::<i64>().ok()?,
            RawUserId::Other(_) => return None,
        };
        (id > 0).then_some(id)
    }
}

impl From<i64> for RawUserId {
    fn from(id: i64) -> Self {
        RawUserId::Number(id)
    }
}

impl From<&str> for RawUserId {
    fn from(value: &str) -> Self {
        RawUserId::Text(value.to_string())
    }
}

/// OutgoingMail
///
/// A fully rendered message handed to the mail transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub headers: String,
}

// --- Request Payloads (Input Schemas) ---

/// GateRequest
///
/// Sent by the host login pipeline once credentials have been verified (POST /auth/gate).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GateRequest {
    pub user_id: i64,
}

/// BulkActionRequest
///
/// Input payload for POST /admin/registrations/bulk.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BulkActionRequest {
    /// One of `auth`, `block`, `delete`.
    pub action: String,
    #[serde(default)]
    pub users: Vec<RawUserId>,
    /// The `bulk-action` token handed out with the admin page.
    pub token: String,
}

/// SaveSettingsRequest
///
/// Input payload for POST /admin/registrations/settings. Carries the full record.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SaveSettingsRequest {
    pub token: String,
    #[serde(flatten)]
    pub settings: Settings,
}

// --- Admin Page Schemas (Output) ---

/// RosterRow
///
/// One row of the pending/authenticated tables.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RosterRow {
    pub user: User,
    /// False for the acting administrator's own account.
    pub selectable: bool,
}

/// AdminPage
///
/// Response of GET /admin/registrations, shaped by the selected tab.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(tag = "tab", rename_all = "lowercase")]
#[ts(export)]
pub enum AdminPage {
    Pending(RosterPage),
    Authed(RosterPage),
    Settings(SettingsPage),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RosterPage {
    /// "Authenticate Users" or "Block Users".
    pub title: String,
    /// The bulk action offered for this tab: `auth` or `block`.
    pub bulk_action: String,
    /// Whether `delete` is offered as a second bulk action.
    pub allow_delete: bool,
    pub token: String,
    pub users: Vec<RosterRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SettingsPage {
    pub settings: Settings,
    pub token: String,
}

/// BulkActionResponse
///
/// `notice` is absent when the request was ignored (bad token, missing capability,
/// empty selection).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BulkActionResponse {
    pub notice: Option<String>,
    pub processed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SaveSettingsResponse {
    pub saved: bool,
    pub notice: Option<String>,
}
