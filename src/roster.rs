use crate::{
    config::AppConfig,
    models::{RosterMode, RosterQuery, User},
    repository::Repository,
};

/// scope
///
/// Applies the tenant rule to a caller's query: in network mode the site filter is dropped
/// so the roster covers every site sharing the user store; otherwise it is pinned to the
/// configured site.
pub fn scope(config: &AppConfig, query: RosterQuery) -> RosterQuery {
    RosterQuery {
        site_id: if config.multisite {
            None
        } else {
            Some(config.site_id)
        },
        ..query
    }
}

/// Users on one side of the flag, ordered by id ascending.
pub async fn users(
    repo: &dyn Repository,
    config: &AppConfig,
    mode: RosterMode,
    query: RosterQuery,
) -> Vec<User> {
    repo.list_users(mode, &scope(config, query)).await
}

/// Same selection as [`users`], ids only.
pub async fn user_ids(
    repo: &dyn Repository,
    config: &AppConfig,
    mode: RosterMode,
    query: RosterQuery,
) -> Vec<i64> {
    repo.list_user_ids(mode, &scope(config, query)).await
}
