use crate::{
    errors::GateError,
    models::{RosterMode, RosterQuery, User},
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Meta key carrying the approval flag.
pub const FLAG_KEY: &str = "authentication";
/// The only value that counts as approved.
pub const FLAG_VALUE: &str = "1";

// Three binds per row keeps each batched insert well below Postgres' 65535 parameter cap.
const FLAG_BATCH_ROWS: usize = 10_000;

/// Repository Trait
///
/// The seam to the host platform's user store and option store. Reads swallow and log store
/// errors (an empty roster is a valid answer); writes report them, because a bulk action must
/// stop at the first failed write.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i64) -> Option<User>;
    // Ordered by id ascending.
    async fn list_users(&self, mode: RosterMode, query: &RosterQuery) -> Vec<User>;
    // Same selection as `list_users`, projected to ids.
    async fn list_user_ids(&self, mode: RosterMode, query: &RosterQuery) -> Vec<i64>;

    // --- Flag ---
    /// False (and nothing written) when the user does not exist.
    async fn set_authenticated(&self, id: i64) -> Result<bool, GateError>;
    /// False when the user does not exist.
    async fn clear_authenticated(&self, id: i64) -> Result<bool, GateError>;
    /// Sets the flag for every id in as few statements as possible. Returns rows written.
    async fn mark_users_authenticated(&self, ids: &[i64]) -> Result<u64, GateError>;

    /// Permanently removes the account and its meta rows. False if it did not exist.
    async fn delete_user(&self, id: i64) -> Result<bool, GateError>;

    // --- Options ---
    async fn get_option(&self, key: &str) -> Result<Option<Value>, GateError>;
    /// Inserts only when the key is absent. Returns whether a row was written.
    async fn add_option(&self, key: &str, value: Value) -> Result<bool, GateError>;
    async fn update_option(&self, key: &str, value: Value) -> Result<(), GateError>;
    async fn delete_option(&self, key: &str) -> Result<bool, GateError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_SELECT: &str = r#"
    SELECT
        u.id, u.email, u.display_name, u.roles, u.site_id, u.registered_at,
        EXISTS (
            SELECT 1 FROM user_meta m
            WHERE m.user_id = u.id AND m.meta_key = 'authentication' AND m.meta_value = '1'
        ) AS authenticated
    FROM users u
"#;

/// push_roster_filter
///
/// Appends the flag predicate, the optional tenant scope, ordering and pagination.
fn push_roster_filter(
    builder: &mut QueryBuilder<'_, Postgres>,
    mode: RosterMode,
    query: &RosterQuery,
) {
    let exists = match mode {
        RosterMode::Pending => " WHERE NOT EXISTS",
        RosterMode::Authenticated => " WHERE EXISTS",
    };
    builder.push(exists);
    builder.push(" (SELECT 1 FROM user_meta f WHERE f.user_id = u.id AND f.meta_key = ");
    builder.push_bind(FLAG_KEY);
    builder.push(" AND f.meta_value = ");
    builder.push_bind(FLAG_VALUE);
    builder.push(")");

    if let Some(site_id) = query.site_id {
        builder.push(" AND u.site_id = ");
        builder.push_bind(site_id);
    }

    builder.push(" ORDER BY u.id ASC");

    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }
    if let Some(offset) = query.offset {
        builder.push(" OFFSET ");
        builder.push_bind(offset);
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: i64) -> Option<User> {
        let sql = format!("{USER_SELECT} WHERE u.id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_user error: {:?}", e);
                None
            })
    }

    /// list_users
    ///
    /// Built with QueryBuilder so the optional tenant scope and pagination stay parameterized.
    async fn list_users(&self, mode: RosterMode, query: &RosterQuery) -> Vec<User> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(USER_SELECT);
        push_roster_filter(&mut builder, mode, query);

        match builder.build_query_as::<User>().fetch_all(&self.pool).await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!("list_users error: {:?}", e);
                vec![]
            }
        }
    }

    async fn list_user_ids(&self, mode: RosterMode, query: &RosterQuery) -> Vec<i64> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT u.id FROM users u");
        push_roster_filter(&mut builder, mode, query);

        match builder.build_query_scalar::<i64>().fetch_all(&self.pool).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("list_user_ids error: {:?}", e);
                vec![]
            }
        }
    }

    /// set_authenticated
    ///
    /// The INSERT selects from `users`, so an unknown id writes no row instead of tripping
    /// the foreign key.
    async fn set_authenticated(&self, id: i64) -> Result<bool, GateError> {
        let res = sqlx::query(
            "INSERT INTO user_meta (user_id, meta_key, meta_value) \
             SELECT u.id, $2, $3 FROM users u WHERE u.id = $1 \
             ON CONFLICT (user_id, meta_key) DO UPDATE SET meta_value = EXCLUDED.meta_value",
        )
        .bind(id)
        .bind(FLAG_KEY)
        .bind(FLAG_VALUE)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn clear_authenticated(&self, id: i64) -> Result<bool, GateError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "WITH target AS (SELECT id FROM users WHERE id = $1), \
             cleared AS ( \
                 DELETE FROM user_meta \
                 WHERE user_id IN (SELECT id FROM target) AND meta_key = $2 \
             ) \
             SELECT EXISTS (SELECT 1 FROM target)",
        )
        .bind(id)
        .bind(FLAG_KEY)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// mark_users_authenticated
    ///
    /// One multi-row INSERT per batch instead of one round trip per user.
    async fn mark_users_authenticated(&self, ids: &[i64]) -> Result<u64, GateError> {
        let mut written = 0;
        for chunk in ids.chunks(FLAG_BATCH_ROWS) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO user_meta (user_id, meta_key, meta_value) ");
            builder.push_values(chunk, |mut row, id| {
                row.push_bind(*id).push_bind(FLAG_KEY).push_bind(FLAG_VALUE);
            });
            builder.push(
                " ON CONFLICT (user_id, meta_key) DO UPDATE SET meta_value = EXCLUDED.meta_value",
            );
            written += builder.build().execute(&self.pool).await?.rows_affected();
        }
        Ok(written)
    }

    async fn delete_user(&self, id: i64) -> Result<bool, GateError> {
        // user_meta rows go with it through ON DELETE CASCADE.
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn get_option(&self, key: &str) -> Result<Option<Value>, GateError> {
        let value = sqlx::query_scalar::<_, Value>(
            "SELECT option_value FROM site_options WHERE option_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn add_option(&self, key: &str, value: Value) -> Result<bool, GateError> {
        let res = sqlx::query(
            "INSERT INTO site_options (option_key, option_value) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn update_option(&self, key: &str, value: Value) -> Result<(), GateError> {
        sqlx::query(
            "INSERT INTO site_options (option_key, option_value) VALUES ($1, $2) \
             ON CONFLICT (option_key) DO UPDATE SET option_value = EXCLUDED.option_value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_option(&self, key: &str) -> Result<bool, GateError> {
        let res = sqlx::query("DELETE FROM site_options WHERE option_key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

// --- In-memory implementation ---

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    meta: BTreeMap<(i64, String), String>,
    options: BTreeMap<String, Value>,
    flag_batches: usize,
}

impl MemoryState {
    fn is_authenticated(&self, id: i64) -> bool {
        self.meta
            .get(&(id, FLAG_KEY.to_string()))
            .is_some_and(|v| v == FLAG_VALUE)
    }

    fn select(&self, mode: RosterMode, query: &RosterQuery) -> Vec<User> {
        let wanted = mode == RosterMode::Authenticated;
        // BTreeMap iteration is already id-ascending.
        let matching = self
            .users
            .values()
            .filter(|u| query.site_id.is_none_or(|site| u.site_id == site))
            .filter(|u| self.is_authenticated(u.id) == wanted)
            .map(|u| User {
                authenticated: wanted,
                ..u.clone()
            });

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        match query.limit {
            Some(limit) => matching.skip(offset).take(limit.max(0) as usize).collect(),
            None => matching.skip(offset).collect(),
        }
    }
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in memory, for tests and local demos. `failing_on` makes every
/// write that touches the given user id fail, to exercise partially applied bulk actions.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
    fail_on: Option<i64>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let repo = Self::default();
        for user in users {
            repo.insert_user(user);
        }
        repo
    }

    pub fn failing_on(mut self, user_id: i64) -> Self {
        self.fail_on = Some(user_id);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_write(&self, id: i64) -> Result<(), GateError> {
        if self.fail_on == Some(id) {
            return Err(GateError::Store(format!("simulated write failure for user {id}")));
        }
        Ok(())
    }

    /// Inserts or replaces an account. A `true` `authenticated` field also sets the flag.
    pub fn insert_user(&self, user: User) {
        let mut state = self.lock();
        if user.authenticated {
            state
                .meta
                .insert((user.id, FLAG_KEY.to_string()), FLAG_VALUE.to_string());
        }
        state.users.insert(user.id, user);
    }

    /// Writes a raw meta row, bypassing the flag semantics.
    pub fn set_meta(&self, user_id: i64, key: &str, value: &str) {
        self.lock()
            .meta
            .insert((user_id, key.to_string()), value.to_string());
    }

    pub fn meta(&self, user_id: i64, key: &str) -> Option<String> {
        self.lock().meta.get(&(user_id, key.to_string())).cloned()
    }

    /// Number of batched flag writes issued so far.
    pub fn flag_batches(&self) -> usize {
        self.lock().flag_batches
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: i64) -> Option<User> {
        let state = self.lock();
        state.users.get(&id).map(|u| User {
            authenticated: state.is_authenticated(id),
            ..u.clone()
        })
    }

    async fn list_users(&self, mode: RosterMode, query: &RosterQuery) -> Vec<User> {
        self.lock().select(mode, query)
    }

    async fn list_user_ids(&self, mode: RosterMode, query: &RosterQuery) -> Vec<i64> {
        self.lock().select(mode, query).into_iter().map(|u| u.id).collect()
    }

    async fn set_authenticated(&self, id: i64) -> Result<bool, GateError> {
        self.check_write(id)?;
        let mut state = self.lock();
        if !state.users.contains_key(&id) {
            return Ok(false);
        }
        state
            .meta
            .insert((id, FLAG_KEY.to_string()), FLAG_VALUE.to_string());
        Ok(true)
    }

    async fn clear_authenticated(&self, id: i64) -> Result<bool, GateError> {
        self.check_write(id)?;
        let mut state = self.lock();
        if !state.users.contains_key(&id) {
            return Ok(false);
        }
        state.meta.remove(&(id, FLAG_KEY.to_string()));
        Ok(true)
    }

    async fn mark_users_authenticated(&self, ids: &[i64]) -> Result<u64, GateError> {
        for id in ids {
            self.check_write(*id)?;
        }
        let mut state = self.lock();
        state.flag_batches += 1;
        for id in ids {
            state
                .meta
                .insert((*id, FLAG_KEY.to_string()), FLAG_VALUE.to_string());
        }
        Ok(ids.len() as u64)
    }

    async fn delete_user(&self, id: i64) -> Result<bool, GateError> {
        self.check_write(id)?;
        let mut state = self.lock();
        state.meta.retain(|(user_id, _), _| *user_id != id);
        Ok(state.users.remove(&id).is_some())
    }

    async fn get_option(&self, key: &str) -> Result<Option<Value>, GateError> {
        Ok(self.lock().options.get(key).cloned())
    }

    async fn add_option(&self, key: &str, value: Value) -> Result<bool, GateError> {
        let mut state = self.lock();
        if state.options.contains_key(key) {
            return Ok(false);
        }
        state.options.insert(key.to_string(), value);
        Ok(true)
    }

    async fn update_option(&self, key: &str, value: Value) -> Result<(), GateError> {
        self.lock().options.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete_option(&self, key: &str) -> Result<bool, GateError> {
        Ok(self.lock().options.remove(key).is_some())
    }
}
