// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every way a request can fail authentication ends in exactly one
//! [`AuthError`]. Variants are grouped into the coarse [`FailureKind`]s the
//! middleware reasons about; the kind decides the HTTP status.

use axum::{
    http::{
        header::{CACHE_CONTROL, PRAGMA},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Coarse classification of an authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No bearer credential was supplied
    NoCredential,
    /// The token is not a structurally valid compact JWS
    MalformedToken,
    /// Key material for the token could not be obtained
    VerificationError,
    /// Signature mismatch or a standard claim check failed
    InvalidSignatureOrClaim,
    /// The application `check` predicate rejected a verified token
    PolicyDenied,
    /// Anything unexpected
    InternalError,
}

impl FailureKind {
    /// HTTP status the middleware assigns for this kind of failure.
    pub fn status_code(self) -> StatusCode {
        match self {
            FailureKind::NoCredential
            | FailureKind::MalformedToken
            | FailureKind::VerificationError
            | FailureKind::InternalError => StatusCode::UNAUTHORIZED,
            FailureKind::InvalidSignatureOrClaim | FailureKind::PolicyDenied => {
                StatusCode::FORBIDDEN
            }
        }
    }
}

/// Authentication error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization: Bearer` header present
    #[error("Bearer token is required")]
    MissingCredential,
    /// Token is malformed
    #[error("Token is malformed: {0}")]
    MalformedToken(String),
    /// Remote key discovery is impossible for this token
    #[error("Unsupported token issuer: {0}")]
    UnsupportedIssuer(String),
    /// Discovery document or JWKS could not be fetched
    #[error("Failed to discover signing keys: {0}")]
    KeyDiscovery(String),
    /// No key in the issuer's JWKS matches the token's `kid`
    #[error("No matching key found in JWKS")]
    NoMatchingKey,
    /// Token `alg` is not in the configured allow-list
    #[error("Token algorithm is not allowed: {0}")]
    DisallowedAlgorithm(String),
    /// Token signature is invalid
    #[error("Token signature is invalid")]
    InvalidSignature,
    /// Token has expired
    #[error("Token has expired")]
    TokenExpired,
    /// Token is not yet valid
    #[error("Token is not yet valid")]
    TokenNotYetValid,
    /// Token is older than the configured maximum age
    #[error("Token exceeds the maximum allowed age")]
    MaxAgeExceeded,
    /// Token issuer is invalid
    #[error("Token issuer is invalid")]
    InvalidIssuer,
    /// Token audience is invalid
    #[error("Token audience is invalid")]
    InvalidAudience,
    /// Token subject is invalid
    #[error("Token subject is invalid")]
    InvalidSubject,
    /// A claim is present but has the wrong shape
    #[error("Token claim is invalid: {0}")]
    InvalidClaim(String),
    /// Application policy rejected the token
    #[error("Insufficient permissions for this operation")]
    PolicyDenied,
    /// Internal error
    #[error("Internal authentication error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the failure kind for this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            AuthError::MissingCredential => FailureKind::NoCredential,
            AuthError::MalformedToken(_) => FailureKind::MalformedToken,
            AuthError::UnsupportedIssuer(_)
            | AuthError::KeyDiscovery(_)
            | AuthError::NoMatchingKey => FailureKind::VerificationError,
            AuthError::DisallowedAlgorithm(_)
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::TokenNotYetValid
            | AuthError::MaxAgeExceeded
            | AuthError::InvalidIssuer
            | AuthError::InvalidAudience
            | AuthError::InvalidSubject
            | AuthError::InvalidClaim(_) => FailureKind::InvalidSignatureOrClaim,
            AuthError::PolicyDenied => FailureKind::PolicyDenied,
            AuthError::Internal(_) => FailureKind::InternalError,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::UnsupportedIssuer(_) => "unsupported_issuer",
            AuthError::KeyDiscovery(_) => "key_discovery_error",
            AuthError::NoMatchingKey => "no_matching_key",
            AuthError::DisallowedAlgorithm(_) => "disallowed_algorithm",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::MaxAgeExceeded => "max_age_exceeded",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::InvalidSubject => "invalid_subject",
            AuthError::InvalidClaim(_) => "invalid_claim",
            AuthError::PolicyDenied => "insufficient_permissions",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => AuthError::MalformedToken(err.to_string()),
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                AuthError::DisallowedAlgorithm(err.to_string())
            }
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            ErrorKind::InvalidSubject => AuthError::InvalidSubject,
            _ => AuthError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        response
    }
}
