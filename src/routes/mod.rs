/// Router Module Index
///
/// Routing is split by access level so the authentication layer is applied per module,
/// never per handler.

/// Routes reachable without an admin session: health and the login gate hook point.
pub mod public;

/// Moderation routes. Every request passes the `AuthUser` extractor; capability checks
/// happen inside the handlers.
pub mod admin;
