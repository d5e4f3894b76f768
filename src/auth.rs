use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AppConfig, Env},
    repository::RepositoryState,
    token,
};

/// Claims
///
/// Payload expected inside an administrator's bearer JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the numeric user id.
    pub sub: i64,
    /// Expiration Time (exp).
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

/// Capability
///
/// Permissions checked by the admin surface. Derived from the account's roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Approve and block accounts.
    PromoteUsers,
    DeleteUsers,
    /// Required to open the admin page in network mode.
    ManageNetworkUsers,
}

/// AuthUser
///
/// The resolved identity of the acting administrator.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn can(&self, capability: Capability) -> bool {
        self.roles.iter().any(|role| match role.as_str() {
            "super_admin" => true,
            "administrator" => capability != Capability::ManageNetworkUsers,
            "moderator" => capability == Capability::PromoteUsers,
            _ => false,
        })
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local` an `x-user-id` header naming an existing user is accepted.
/// 2. Bearer token extraction and HS256 validation (expiry always checked).
/// 3. The token subject is resolved against the repository so deleted accounts lose access
///    and roles are always current.
///
/// Rejection: `401 Unauthorized` on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<i64>().ok());

            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await {
                    return Ok(AuthUser {
                        id: user.id,
                        roles: user.roles,
                    });
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::debug!("rejected admin token: {:?}", e.kind());
            StatusCode::UNAUTHORIZED
        })?;

        let user = repo
            .get_user(token_data.claims.sub)
            .await
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(AuthUser {
            id: user.id,
            roles: user.roles,
        })
    }
}

/// GateClient
///
/// The host login pipeline, identified by the `GATE_API_KEY` bearer key. There is no local
/// bypass: the gate answers with account data.
///
/// Rejection: `401 Unauthorized` when the key is missing or wrong.
#[derive(Debug, Clone, Copy)]
pub struct GateClient;

impl<S> FromRequestParts<S> for GateClient
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);

        let presented = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        if token::service_key_matches(&config.gate_api_key, presented) {
            Ok(GateClient)
        } else {
            tracing::warn!("gate request with an invalid service key");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
