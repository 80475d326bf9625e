//! Identity extraction from a Bearer JWT.
//!
//! The token supplies id, email, and role. Dispatcher capability is never
//! taken from the token: it is resolved from the `dispatchers` table on
//! every request, so deactivating a dispatcher takes effect immediately.

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use firewatch_core::identity::Identity;
use firewatch_core::roles::Role;

use crate::auth::jwt::{validate_token, Claims};
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller.
///
/// Rejects the request with 401 when the token is missing or invalid. Use
/// `Option<AuthIdentity>` where an anonymous caller gets a decision rather
/// than an error.
#[derive(Debug, Clone)]
pub struct AuthIdentity(pub Identity);

impl FromRequestParts<AppState> for AuthIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthenticated("Missing Authorization header".into()))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthenticated(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            )
        })?;

        let claims = validate_token(token, &state.config.jwt)
            .map_err(|_| AppError::Unauthenticated("Invalid or expired token".into()))?;

        resolve_identity(state, claims).await.map(AuthIdentity)
    }
}

impl OptionalFromRequestParts<AppState> for AuthIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        match <AuthIdentity as FromRequestParts<AppState>>::from_request_parts(parts, state).await
        {
            Ok(identity) => Ok(Some(identity)),
            Err(AppError::Unauthenticated(_)) => Ok(None),
            Err(other) => Err(other),
        }
    }
}

/// Build an [`Identity`] from verified claims plus the dispatcher linkage.
pub async fn resolve_identity(state: &AppState, claims: Claims) -> Result<Identity, AppError> {
    let role = claims
        .role
        .parse::<Role>()
        .map_err(|_| AppError::Unauthenticated(format!("Unknown role '{}'", claims.role)))?;

    let mut identity = Identity::new(claims.sub, claims.email, role);
    if let Some(name) = claims.name {
        identity = identity.with_full_name(name);
    }
    if let Some(phone) = claims.phone {
        identity = identity.with_phone(phone);
    }

    if let Some(dispatcher) = state.store.find_dispatcher_by_user(identity.id).await? {
        identity = identity.with_dispatcher(&dispatcher);
    }
    Ok(identity)
}
