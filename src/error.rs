// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Startup configuration errors.
//!
//! Request-time failures are [`AuthError`](crate::auth::AuthError)s; these
//! only happen while building an authenticator.

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("At least one signature algorithm must be allowed")]
    NoAlgorithms,

    #[error("Invalid key material: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("No key source configured: set JWT_SECRET or JWT_REMOTE_JWKS=true")]
    MissingKeySource,

    #[error("JWT_SECRET and JWT_REMOTE_JWKS are mutually exclusive")]
    ConflictingKeySources,

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_value_names_the_variable() {
        let err = ConfigError::InvalidValue {
            var: "PORT",
            value: "eighty".into(),
        };
        assert_eq!(err.to_string(), r#"Invalid value for PORT: "eighty""#);
    }
}
