use serde_json::Value;

use crate::{
    config::AppConfig,
    errors::GateError,
    models::{RosterMode, RosterQuery, Settings},
    repository::Repository,
    roster,
    settings::SETTINGS_KEY,
};

/// The five option keys of the pre-2.0 layout.
pub const LEGACY_KEYS: [&str; 5] = [
    "cur_administrator",
    "cur_error",
    "cur_from",
    "cur_subject",
    "cur_message",
];

/// Presence of this key alone marks an install as still on the legacy layout.
pub const LEGACY_TRACER: &str = "cur_from";

/// MigrationState
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// No legacy keys and no unified record.
    Fresh,
    /// Tracer key present.
    Legacy,
    /// Unified record present, legacy keys gone.
    AlreadyMigrated,
}

/// ActivationOutcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    FirstActivation { grandfathered: u64 },
    Upgraded,
    NoOp,
}

pub async fn detect(repo: &dyn Repository) -> Result<MigrationState, GateError> {
    if repo.get_option(LEGACY_TRACER).await?.is_some() {
        return Ok(MigrationState::Legacy);
    }
    if repo.get_option(SETTINGS_KEY).await?.is_some() {
        return Ok(MigrationState::AlreadyMigrated);
    }
    Ok(MigrationState::Fresh)
}

/// activate
///
/// Brings the store to the terminal state (unified record present, legacy keys absent).
/// Safe to run on every startup.
pub async fn activate(
    repo: &dyn Repository,
    config: &AppConfig,
) -> Result<ActivationOutcome, GateError> {
    match detect(repo).await? {
        MigrationState::Fresh => {
            let grandfathered = grandfather_existing_users(repo, config).await?;
            let defaults = Settings::defaults(&config.site);
            repo.add_option(SETTINGS_KEY, serde_json::to_value(&defaults)?)
                .await?;
            tracing::info!(
                grandfathered,
                "first activation: existing users approved, defaults seeded"
            );
            Ok(ActivationOutcome::FirstActivation { grandfathered })
        }
        MigrationState::Legacy => {
            upgrade_legacy_settings(repo, config).await?;
            tracing::info!("legacy settings migrated to the unified record");
            Ok(ActivationOutcome::Upgraded)
        }
        MigrationState::AlreadyMigrated => {
            tracing::debug!("settings already migrated");
            Ok(ActivationOutcome::NoOp)
        }
    }
}

/// grandfather_existing_users
///
/// Approves every account that exists before the gate is switched on, in one batched write.
async fn grandfather_existing_users(
    repo: &dyn Repository,
    config: &AppConfig,
) -> Result<u64, GateError> {
    let pending = roster::user_ids(repo, config, RosterMode::Pending, RosterQuery::default()).await;
    if pending.is_empty() {
        return Ok(0);
    }
    repo.mark_users_authenticated(&pending).await
}

/// upgrade_legacy_settings
///
/// Copies the five legacy keys into the unified record (never overwriting an existing one),
/// then deletes them. A missing or non-string legacy value falls back to its default.
async fn upgrade_legacy_settings(
    repo: &dyn Repository,
    config: &AppConfig,
) -> Result<(), GateError> {
    let defaults = Settings::defaults(&config.site);

    let mut values = Vec::with_capacity(LEGACY_KEYS.len());
    for key in LEGACY_KEYS {
        let value = repo
            .get_option(key)
            .await?
            .and_then(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            });
        values.push(value);
    }

    let mut values = values.into_iter();
    let mut next = |fallback: String| values.next().flatten().unwrap_or(fallback);
    let record = Settings {
        administrator: next(defaults.administrator),
        error: next(defaults.error),
        from: next(defaults.from),
        subject: next(defaults.subject),
        message: next(defaults.message),
    };

    repo.add_option(SETTINGS_KEY, serde_json::to_value(&record)?)
        .await?;

    for key in LEGACY_KEYS {
        repo.delete_option(key).await?;
    }
    Ok(())
}
