// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Two middleware functions are provided:
//!
//! - [`authenticate`]: verifies the bearer token and stops the request with
//!   401/403 on failure. Configured through a [`JwtAuthentication`] state.
//! - [`decode_authorization`]: decodes the bearer token without verifying
//!   it and never stops the request.
//!
//! ```rust,ignore
//! let auth = JwtAuthentication::with_secret(secret, VerifyOptions::new([Algorithm::HS256]))?
//!     .ignore_paths(["/health"]);
//!
//! let app = Router::new()
//!     .route("/v1/me", get(me))
//!     .layer(axum::middleware::from_fn_with_state(auth, authenticate));
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::claims::Claims;
use super::error::AuthError;
use super::extractor::Authorization;
use super::token::{self, bearer_token};
use super::verifier::{Verifier, VerifyOptions};
use crate::error::ConfigError;

/// Future returned by an authorization check.
pub type CheckFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

type CheckFn = dyn Fn(&Claims, &Parts) -> CheckFuture + Send + Sync;

/// Configuration of the [`authenticate`] middleware.
#[derive(Clone)]
pub struct JwtAuthentication {
    verifier: Verifier,
    check: Option<Arc<CheckFn>>,
    continue_on_unauthorized: bool,
    ignore_paths: Arc<[String]>,
}

impl JwtAuthentication {
    pub fn new(verifier: Verifier) -> Self {
        Self {
            verifier,
            check: None,
            continue_on_unauthorized: false,
            ignore_paths: Arc::default(),
        }
    }

    /// Authenticate with a shared HMAC secret.
    pub fn with_secret(secret: impl AsRef<[u8]>, options: VerifyOptions) -> Result<Self, ConfigError> {
        Ok(Self::new(Verifier::with_secret(secret, options)?))
    }

    /// Authorization policy run after a token verifies.
    ///
    /// Returning `false` rejects the request with 403. The returned future
    /// must own what it needs from the claims and request parts.
    pub fn with_check<F, Fut>(mut self, check: F) -> Self
    where
        F: Fn(&Claims, &Parts) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.check = Some(Arc::new(move |claims: &Claims, parts: &Parts| {
            Box::pin(check(claims, parts)) as CheckFuture
        }));
        self
    }

    /// Let requests with a missing or invalid token through without claims.
    ///
    /// Check denials still stop the request.
    pub fn continue_on_unauthorized(mut self, enabled: bool) -> Self {
        self.continue_on_unauthorized = enabled;
        self
    }

    /// Exact request paths that skip authentication.
    pub fn ignore_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.ignore_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    fn is_ignored(&self, path: &str) -> bool {
        self.ignore_paths.iter().any(|ignored| ignored == path)
    }

    /// Decide what to do with a request.
    ///
    /// - `Ok(Some(claims))`: verified and allowed
    /// - `Ok(None)`: let through without claims (ignored path, or a failure
    ///   while continuing on unauthorized)
    /// - `Err(_)`: stop the request
    pub async fn authorize(&self, parts: &Parts) -> Result<Option<Claims>, AuthError> {
        if self.is_ignored(parts.uri.path()) {
            return Ok(None);
        }

        let claims = match self.verifier.verify(bearer_token(&parts.headers)).await {
            Ok(claims) => claims,
            Err(err) if self.continue_on_unauthorized => {
                debug!(error = %err, path = %parts.uri.path(), "Continuing without credentials");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        if let Some(check) = &self.check {
            if !check(&claims, parts).await {
                warn!(sub = ?claims.sub(), path = %parts.uri.path(), "Authorization check denied request");
                return Err(AuthError::PolicyDenied);
            }
        }

        Ok(Some(claims))
    }
}

/// Authentication middleware function.
///
/// Attaches [`Authorization`] with the verified claims and runs the next
/// stage, or answers with the failure's status without running it.
pub async fn authenticate(
    State(auth): State<JwtAuthentication>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    match auth.authorize(&parts).await {
        Ok(Some(claims)) => {
            parts.extensions.insert(Authorization::verified(claims));
        }
        Ok(None) => {}
        Err(err) => return err.into_response(),
    }

    next.run(Request::from_parts(parts, body)).await
}

/// Decode-only middleware function.
///
/// Attaches the token's payload as unverified [`Authorization`] when it
/// decodes, and always runs the next stage.
pub async fn decode_authorization(mut request: Request, next: Next) -> Response {
    if let Some(token) = bearer_token(request.headers()) {
        match token::decode(token) {
            Ok(decoded) => {
                request
                    .extensions_mut()
                    .insert(Authorization::decoded(decoded.payload));
            }
            Err(err) => debug!(error = %err, "Ignoring undecodable bearer token"),
        }
    }

    next.run(request).await
}
