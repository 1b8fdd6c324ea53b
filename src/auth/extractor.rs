// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request authorization context and Axum extractors.
//!
//! The middleware attaches an [`Authorization`] extension to each request it
//! lets through with claims. Handlers read it with the extractors below:
//!
//! ```rust,ignore
//! async fn me(Auth(claims): Auth) -> Json<Claims> {
//!     Json(claims)
//! }
//! ```

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use super::claims::Claims;
use super::error::AuthError;
use super::middleware::JwtAuthentication;

/// Claims attached to a request.
///
/// `verified` is false when the claims come from the decode-only
/// middleware and no signature was checked.
#[derive(Debug, Clone, PartialEq)]
pub struct Authorization {
    pub claims: Claims,
    pub verified: bool,
}

impl Authorization {
    pub fn verified(claims: Claims) -> Self {
        Self {
            claims,
            verified: true,
        }
    }

    pub fn decoded(claims: Claims) -> Self {
        Self {
            claims,
            verified: false,
        }
    }
}

/// Extractor for verified claims.
///
/// Uses the claims attached by [`authenticate`](super::middleware::authenticate)
/// when present. Otherwise verifies the request's bearer token itself with
/// the [`JwtAuthentication`] found in the router state. Unverified claims
/// from the decode-only middleware are never accepted.
pub struct Auth(pub Claims);

impl<S> FromRequestParts<S> for Auth
where
    JwtAuthentication: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // First check if middleware already verified the token
        if let Some(authorization) = parts.extensions.get::<Authorization>() {
            if authorization.verified {
                return Ok(Auth(authorization.claims.clone()));
            }
        }

        let auth = JwtAuthentication::from_ref(state);
        let claims = auth
            .authorize(parts)
            .await?
            .ok_or(AuthError::MissingCredential)?;

        parts
            .extensions
            .insert(Authorization::verified(claims.clone()));
        Ok(Auth(claims))
    }
}

/// Optional authentication extractor.
///
/// Returns `None` if no valid authentication is present, instead of rejecting.
pub struct OptionalAuth(pub Option<Claims>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    JwtAuthentication: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Auth::from_request_parts(parts, state).await {
            Ok(Auth(claims)) => Ok(OptionalAuth(Some(claims))),
            Err(_) => Ok(OptionalAuth(None)),
        }
    }
}
