use std::str::FromStr;

use crate::{
    auth::{AuthUser, Capability},
    errors::GateError,
    hooks::{Hooks, UserEvent},
    mailer::Mailer,
    models::{RawUserId, Settings},
    notify,
    repository::Repository,
};

/// BulkAction
///
/// The three operations the admin tables can apply to a selection of accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Authenticate,
    Block,
    Delete,
}

impl FromStr for BulkAction {
    type Err = ();

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "auth" => Ok(BulkAction::Authenticate),
            "block" => Ok(BulkAction::Block),
            "delete" => Ok(BulkAction::Delete),
            _ => Err(()),
        }
    }
}

impl BulkAction {
    pub fn tag(self) -> &'static str {
        match self {
            BulkAction::Authenticate => "auth",
            BulkAction::Block => "block",
            BulkAction::Delete => "delete",
        }
    }

    pub fn required_capability(self) -> Capability {
        match self {
            BulkAction::Authenticate | BulkAction::Block => Capability::PromoteUsers,
            BulkAction::Delete => Capability::DeleteUsers,
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            BulkAction::Authenticate => "authenticated",
            BulkAction::Block => "blocked",
            BulkAction::Delete => "deleted",
        }
    }
}

/// confirmation
///
/// "1 user authenticated", "3 users blocked", ...
pub fn confirmation(action: BulkAction, count: usize) -> String {
    if count == 1 {
        format!("1 user {}", action.past_tense())
    } else {
        format!("{} users {}", count, action.past_tense())
    }
}

/// BulkOutcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    pub action: BulkAction,
    /// Ids the action was applied to, in submission order.
    pub processed: Vec<i64>,
}

impl BulkOutcome {
    pub fn notice(&self) -> String {
        confirmation(self.action, self.processed.len())
    }
}

/// Dispatcher
///
/// Applies a bulk action id by id. There is no transaction around the set: when a write fails
/// the earlier ids stay changed and the rest are left untouched.
pub struct Dispatcher<'a> {
    pub repo: &'a dyn Repository,
    pub mailer: &'a dyn Mailer,
    pub hooks: &'a Hooks,
    /// Used to render approval notices.
    pub settings: &'a Settings,
}

impl Dispatcher<'_> {
    /// dispatch
    ///
    /// * empty selection: `Ok(None)`, nothing happens.
    /// * caller lacks the action's capability: `Err(Forbidden)`, nothing happens.
    /// * `block`/`delete` selecting the caller's own account: `Err(SelfTarget)`, nothing happens.
    /// * non-numeric entries and ids with no account are skipped and not counted.
    pub async fn dispatch(
        &self,
        actor: &AuthUser,
        action: BulkAction,
        raw_ids: &[RawUserId],
    ) -> Result<Option<BulkOutcome>, GateError> {
        if raw_ids.is_empty() {
            return Ok(None);
        }

        if !actor.can(action.required_capability()) {
            tracing::warn!(
                actor = actor.id,
                action = action.tag(),
                "bulk action without capability ignored"
            );
            return Err(GateError::Forbidden);
        }

        let ids: Vec<i64> = raw_ids.iter().filter_map(RawUserId::as_id).collect();
        let skipped = raw_ids.len() - ids.len();
        if skipped > 0 {
            tracing::debug!(skipped, "non-numeric user ids skipped");
        }

        if action != BulkAction::Authenticate && ids.contains(&actor.id) {
            return Err(GateError::SelfTarget {
                action: action.tag(),
                user_id: actor.id,
            });
        }

        let mut processed = Vec::with_capacity(ids.len());
        for id in ids {
            let applied = match action {
                BulkAction::Authenticate => self.repo.set_authenticated(id).await?,
                BulkAction::Block => self.repo.clear_authenticated(id).await?,
                BulkAction::Delete => self.repo.delete_user(id).await?,
            };
            if !applied {
                tracing::debug!(user_id = id, action = action.tag(), "unknown user skipped");
                continue;
            }

            match action {
                BulkAction::Authenticate => {
                    self.hooks.emit(UserEvent::Authenticated(id));
                    if let Err(e) = notify::send_approval_notice(
                        self.repo,
                        self.mailer,
                        self.hooks,
                        self.settings,
                        id,
                    )
                    .await
                    {
                        tracing::warn!(user_id = id, error = %e, "approval notice not delivered");
                    }
                }
                BulkAction::Block => self.hooks.emit(UserEvent::Blocked(id)),
                BulkAction::Delete => self.hooks.emit(UserEvent::Deleted(id)),
            }
            processed.push(id);
        }

        let outcome = BulkOutcome { action, processed };
        tracing::info!(
            actor = actor.id,
            action = action.tag(),
            count = outcome.processed.len(),
            "bulk action applied"
        );
        Ok(Some(outcome))
    }
}
