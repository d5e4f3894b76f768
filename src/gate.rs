use crate::{
    errors::GateError,
    hooks::Hooks,
    models::{Settings, User},
};

/// authorize
///
/// Runs after the host has verified the credentials. An approved account passes through
/// unchanged; anything else is denied with the configured (and filtered) message.
/// Pure: reads nothing but its arguments and writes nothing.
pub fn authorize(user: User, settings: &Settings, hooks: &Hooks) -> Result<User, GateError> {
    if user.authenticated {
        return Ok(user);
    }

    let message = hooks.filter_error_message(settings.error.clone());
    tracing::info!(user_id = user.id, "login denied: account pending approval");
    Err(GateError::Unauthenticated(message))
}
