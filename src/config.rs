// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the settings the binary builds
//! its authenticator from. Configuration is loaded from the environment at
//! startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `JWT_SECRET` | Shared HMAC secret for static verification | - |
//! | `JWT_REMOTE_JWKS` | Resolve keys through the token issuer's JWKS | `false` |
//! | `JWT_ALGORITHMS` | Comma-separated algorithm allow-list | `HS256` (secret), `RS256,ES256` (remote) |
//! | `JWT_AUDIENCE` | Comma-separated accepted audiences | Optional |
//! | `JWT_ISSUER` | Comma-separated accepted (and trusted) issuers | Optional |
//! | `JWT_CLOCK_TOLERANCE_SECS` | Clock skew tolerance | `0` |
//! | `JWT_MAX_TOKEN_AGE_SECS` | Maximum age based on `iat` | Optional |
//! | `JWT_CONTINUE_ON_UNAUTHORIZED` | Let unauthenticated requests through | `false` |
//! | `JWKS_CACHE_SIZE` | Maximum number of cached issuers | `500` |
//! | `JWKS_CACHE_TTL_SECS` | Cached issuer lifetime | `3600` |
//! | `JWKS_FETCH_TIMEOUT_SECS` | Discovery/JWKS request timeout | `10` |
//! | `JWKS_ALLOW_HTTP_LOOPBACK` | Accept `http://localhost` issuers | `false` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! Exactly one of `JWT_SECRET` and `JWT_REMOTE_JWKS=true` must be set.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;

use crate::auth::cache::{DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL};
use crate::auth::middleware::JwtAuthentication;
use crate::auth::resolver::{KeyResolver, RemoteJwksResolver, StaticKey, DEFAULT_FETCH_TIMEOUT};
use crate::auth::verifier::{Verifier, VerifyOptions};
use crate::error::ConfigError;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the shared HMAC secret.
///
/// Selects static key resolution.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

/// Environment variable name enabling remote JWKS resolution.
///
/// When true, keys are discovered from each token's `iss` via
/// `{iss}/.well-known/openid-configuration`.
pub const JWT_REMOTE_JWKS_ENV: &str = "JWT_REMOTE_JWKS";

pub const JWT_ALGORITHMS_ENV: &str = "JWT_ALGORITHMS";
pub const JWT_AUDIENCE_ENV: &str = "JWT_AUDIENCE";

/// Environment variable name for accepted issuers.
///
/// With remote JWKS, discovery only runs for these issuers.
pub const JWT_ISSUER_ENV: &str = "JWT_ISSUER";

pub const JWT_CLOCK_TOLERANCE_ENV: &str = "JWT_CLOCK_TOLERANCE_SECS";
pub const JWT_MAX_TOKEN_AGE_ENV: &str = "JWT_MAX_TOKEN_AGE_SECS";
pub const JWT_CONTINUE_ON_UNAUTHORIZED_ENV: &str = "JWT_CONTINUE_ON_UNAUTHORIZED";
pub const JWKS_CACHE_SIZE_ENV: &str = "JWKS_CACHE_SIZE";
pub const JWKS_CACHE_TTL_ENV: &str = "JWKS_CACHE_TTL_SECS";
pub const JWKS_FETCH_TIMEOUT_ENV: &str = "JWKS_FETCH_TIMEOUT_SECS";

/// Environment variable name allowing plain-HTTP loopback issuers.
///
/// For local development against a mock identity provider only.
pub const JWKS_ALLOW_HTTP_LOOPBACK_ENV: &str = "JWKS_ALLOW_HTTP_LOOPBACK";

/// Environment variable name for the log output format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Algorithms accepted by default with a static secret.
pub const DEFAULT_SECRET_ALGORITHMS: &[Algorithm] = &[Algorithm::HS256];

/// Algorithms accepted by default with remote JWKS.
pub const DEFAULT_REMOTE_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256, Algorithm::ES256];

/// Listen address settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: lookup(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_var(&lookup, PORT_ENV)?.unwrap_or(DEFAULT_PORT),
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                var: HOST_ENV,
                value: self.host.clone(),
            })
    }
}

/// Where verification keys come from.
#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    Secret(String),
    RemoteJwks,
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Secret(_) => f.write_str("Secret(<redacted>)"),
            KeySource::RemoteJwks => f.write_str("RemoteJwks"),
        }
    }
}

/// Authenticator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSettings {
    pub key_source: KeySource,
    pub algorithms: Vec<Algorithm>,
    pub audience: Vec<String>,
    pub issuer: Vec<String>,
    pub clock_tolerance: Duration,
    pub max_token_age: Option<Duration>,
    pub continue_on_unauthorized: bool,
    pub cache_size: usize,
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
    pub allow_http_loopback: bool,
}

impl AuthSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its
    /// value. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let secret = lookup(JWT_SECRET_ENV);
        let remote = parse_bool(&lookup, JWT_REMOTE_JWKS_ENV)?.unwrap_or(false);
        let key_source = match (secret, remote) {
            (Some(_), true) => return Err(ConfigError::ConflictingKeySources),
            (Some(secret), false) => KeySource::Secret(secret),
            (None, true) => KeySource::RemoteJwks,
            (None, false) => return Err(ConfigError::MissingKeySource),
        };

        let algorithms = match lookup(JWT_ALGORITHMS_ENV) {
            Some(value) => parse_algorithms(&value)?,
            None => match key_source {
                KeySource::Secret(_) => DEFAULT_SECRET_ALGORITHMS.to_vec(),
                KeySource::RemoteJwks => DEFAULT_REMOTE_ALGORITHMS.to_vec(),
            },
        };

        Ok(Self {
            key_source,
            algorithms,
            audience: lookup(JWT_AUDIENCE_ENV).map(|v| split_list(&v)).unwrap_or_default(),
            issuer: lookup(JWT_ISSUER_ENV).map(|v| split_list(&v)).unwrap_or_default(),
            clock_tolerance: Duration::from_secs(
                parse_var(&lookup, JWT_CLOCK_TOLERANCE_ENV)?.unwrap_or(0),
            ),
            max_token_age: parse_var(&lookup, JWT_MAX_TOKEN_AGE_ENV)?.map(Duration::from_secs),
            continue_on_unauthorized: parse_bool(&lookup, JWT_CONTINUE_ON_UNAUTHORIZED_ENV)?
                .unwrap_or(false),
            cache_size: parse_var(&lookup, JWKS_CACHE_SIZE_ENV)?.unwrap_or(DEFAULT_CACHE_SIZE),
            cache_ttl: parse_var(&lookup, JWKS_CACHE_TTL_ENV)?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CACHE_TTL),
            fetch_timeout: parse_var(&lookup, JWKS_FETCH_TIMEOUT_ENV)?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT),
            allow_http_loopback: parse_bool(&lookup, JWKS_ALLOW_HTTP_LOOPBACK_ENV)?.unwrap_or(false),
        })
    }

    pub fn verify_options(&self) -> VerifyOptions {
        let mut options = VerifyOptions::new(self.algorithms.iter().copied())
            .with_clock_tolerance(self.clock_tolerance);
        if let Some(max_age) = self.max_token_age {
            options = options.with_max_token_age(max_age);
        }
        for audience in &self.audience {
            options = options.with_audience(audience.clone());
        }
        for issuer in &self.issuer {
            options = options.with_issuer(issuer.clone());
        }
        options
    }

    pub fn key_resolver(&self) -> Result<KeyResolver, ConfigError> {
        match &self.key_source {
            KeySource::Secret(secret) => Ok(StaticKey::from_secret(secret).into()),
            KeySource::RemoteJwks => {
                let builder = RemoteJwksResolver::builder()
                    .cache_size(self.cache_size)
                    .cache_ttl(self.cache_ttl)
                    .fetch_timeout(self.fetch_timeout)
                    .allow_http_loopback(self.allow_http_loopback);
                let builder = self
                    .issuer
                    .iter()
                    .fold(builder, |builder, issuer| builder.trusted_issuer(issuer.clone()));
                Ok(builder.build()?.into())
            }
        }
    }

    /// Build the authentication middleware state.
    pub fn build(&self) -> Result<JwtAuthentication, ConfigError> {
        let verifier = Verifier::new(self.key_resolver()?, self.verify_options())?;
        Ok(JwtAuthentication::new(verifier).continue_on_unauthorized(self.continue_on_unauthorized))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let algorithms = split_list(value)
        .iter()
        .map(|name| {
            Algorithm::from_str(name).map_err(|_| ConfigError::InvalidValue {
                var: JWT_ALGORITHMS_ENV,
                value: name.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if algorithms.is_empty() {
        return Err(ConfigError::NoAlgorithms);
    }
    Ok(algorithms)
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { var, value })
        })
        .transpose()
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<bool>, ConfigError> {
    lookup(var)
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { var, value }),
        })
        .transpose()
}
