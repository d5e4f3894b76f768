use serde::Deserialize;

use crate::{
    errors::GateError,
    hooks::HooksState,
    models::{Settings, SiteMetadata},
    repository::RepositoryState,
    token,
};

/// Option key of the unified settings record.
pub const SETTINGS_KEY: &str = "confirm-user-registration";

pub const DEFAULT_ERROR_MESSAGE: &str = "<strong>ERROR:</strong> Your account has to be confirmed \
     by an administrator before you can login";

impl Settings {
    /// The record seeded on first activation.
    pub fn defaults(site: &SiteMetadata) -> Self {
        Self {
            administrator: site.admin_email.clone(),
            error: DEFAULT_ERROR_MESSAGE.to_string(),
            from: format!("{} <{}>", site.name, site.admin_email),
            subject: format!("Account Confirmation: {}", site.name),
            message: format!(
                "Your account has been approved by an administrator!\nLogin @ {}/login\n\n\
                 This message is auto generated\n",
                site.url.trim_end_matches('/')
            ),
        }
    }
}

/// The persisted record as found in the option store, every field optional.
#[derive(Deserialize)]
struct StoredSettings {
    administrator: Option<String>,
    error: Option<String>,
    from: Option<String>,
    subject: Option<String>,
    message: Option<String>,
}

impl StoredSettings {
    fn fill(self, defaults: Settings) -> Settings {
        Settings {
            administrator: self.administrator.unwrap_or(defaults.administrator),
            error: self.error.unwrap_or(defaults.error),
            from: self.from.unwrap_or(defaults.from),
            subject: self.subject.unwrap_or(defaults.subject),
            message: self.message.unwrap_or(defaults.message),
        }
    }
}

/// SettingsStore
///
/// Reads and replaces the unified settings record. There is no merge and no version check:
/// the last write wins.
#[derive(Clone)]
pub struct SettingsStore {
    repo: RepositoryState,
    hooks: HooksState,
}

impl SettingsStore {
    pub fn new(repo: RepositoryState, hooks: HooksState) -> Self {
        Self { repo, hooks }
    }

    /// `None` until the record has been seeded by activation.
    ///
    /// Fields missing from the stored record take their value from the defaults for `site`;
    /// a record that is not an object at all is replaced by the defaults.
    pub async fn read(&self, site: &SiteMetadata) -> Result<Option<Settings>, GateError> {
        let Some(value) = self.repo.get_option(SETTINGS_KEY).await? else {
            return Ok(None);
        };

        let defaults = Settings::defaults(site);
        match serde_json::from_value::<StoredSettings>(value) {
            Ok(stored) => Ok(Some(stored.fill(defaults))),
            Err(e) => {
                tracing::warn!(error = %e, "stored settings unreadable, using defaults");
                Ok(Some(defaults))
            }
        }
    }

    /// The stored record, or the defaults for `site` when nothing has been stored yet.
    pub async fn read_or_default(&self, site: &SiteMetadata) -> Result<Settings, GateError> {
        Ok(self
            .read(site)
            .await?
            .unwrap_or_else(|| Settings::defaults(site)))
    }

    /// write
    ///
    /// Verifies the `save-settings` token of the acting session, runs the settings filters and
    /// replaces the whole record. Returns what was persisted.
    pub async fn write(
        &self,
        record: Settings,
        secret: &str,
        session: i64,
        submitted_token: &str,
    ) -> Result<Settings, GateError> {
        if !token::verify_token(secret, token::SAVE_SETTINGS, session, submitted_token) {
            tracing::warn!(session, "settings save ignored: token mismatch");
            return Err(GateError::InvalidToken);
        }

        let record = self.hooks.filter_settings(record);
        self.repo
            .update_option(SETTINGS_KEY, serde_json::to_value(&record)?)
            .await?;

        tracing::info!(session, "settings saved");
        Ok(record)
    }
}
