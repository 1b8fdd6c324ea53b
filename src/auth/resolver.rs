// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key resolution.
//!
//! A [`KeyResolver`] turns an (unverified) decoded token into the key that
//! must have signed it. Two variants exist:
//!
//! - [`StaticKey`]: a secret or public key fixed at startup
//! - [`RemoteJwksResolver`]: OpenID Connect discovery on the token's `iss`,
//!   then a JWKS lookup by the token's `kid`, cached per issuer in a
//!   [`KeyCache`]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use jsonwebtoken::DecodingKey;
use tracing::info;

use super::cache::{CacheEntry, KeyCache, DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL};
use super::error::AuthError;
use super::jwks::{discover_jwks_uri, is_supported_url, RemoteJwkSet, DEFAULT_MIN_REFRESH_INTERVAL};
use super::token::DecodedToken;
use crate::error::ConfigError;

/// Default timeout for discovery and JWKS requests.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Pre-configured verification key.
#[derive(Clone)]
pub struct StaticKey {
    key: DecodingKey,
}

impl StaticKey {
    /// Shared secret for the HMAC algorithms.
    pub fn from_secret(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
        }
    }

    /// RSA public key in PEM format.
    pub fn from_rsa_pem(pem: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
        Ok(Self {
            key: DecodingKey::from_rsa_pem(pem.as_ref()).map_err(ConfigError::InvalidKey)?,
        })
    }

    /// EC public key in PEM format.
    pub fn from_ec_pem(pem: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
        Ok(Self {
            key: DecodingKey::from_ec_pem(pem.as_ref()).map_err(ConfigError::InvalidKey)?,
        })
    }

    /// Ed25519 public key in PEM format.
    pub fn from_ed_pem(pem: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
        Ok(Self {
            key: DecodingKey::from_ed_pem(pem.as_ref()).map_err(ConfigError::InvalidKey)?,
        })
    }

    pub fn key(&self) -> &DecodingKey {
        &self.key
    }
}

impl From<DecodingKey> for StaticKey {
    fn from(key: DecodingKey) -> Self {
        Self { key }
    }
}

/// Builder for [`RemoteJwksResolver`].
pub struct RemoteJwksResolverBuilder {
    cache: Option<Arc<KeyCache>>,
    cache_size: usize,
    cache_ttl: Duration,
    fetch_timeout: Duration,
    min_refresh_interval: Duration,
    trusted_issuers: Vec<String>,
    allow_http_loopback: bool,
    client: Option<reqwest::Client>,
}

impl Default for RemoteJwksResolverBuilder {
    fn default() -> Self {
        Self {
            cache: None,
            cache_size: DEFAULT_CACHE_SIZE,
            cache_ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            trusted_issuers: Vec::new(),
            allow_http_loopback: false,
            client: None,
        }
    }
}

impl RemoteJwksResolverBuilder {
    /// Maximum number of cached issuers (default 500).
    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    /// Maximum age of a cached issuer entry (default 1 hour).
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Share an existing cache instead of creating one. Overrides
    /// `cache_size` and `cache_ttl`.
    pub fn cache(mut self, cache: Arc<KeyCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Timeout for each discovery or JWKS request (default 10 seconds).
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Minimum time between refetches caused by unknown key IDs.
    pub fn min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Only run discovery for these issuers. Empty means any HTTPS issuer.
    pub fn trusted_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.trusted_issuers.push(issuer.into());
        self
    }

    /// Accept `http://` issuers on loopback hosts. For local testing only.
    pub fn allow_http_loopback(mut self, allow: bool) -> Self {
        self.allow_http_loopback = allow;
        self
    }

    /// Use a custom HTTP client. `fetch_timeout` is ignored.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<RemoteJwksResolver, ConfigError> {
        let client = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(self.fetch_timeout)
                .build()
                .map_err(ConfigError::HttpClient)?,
        };
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(KeyCache::new(self.cache_size, self.cache_ttl)));

        Ok(RemoteJwksResolver {
            cache,
            client,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            trusted_issuers: self.trusted_issuers.into(),
            allow_http_loopback: self.allow_http_loopback,
            min_refresh_interval: self.min_refresh_interval,
        })
    }
}

/// Per-issuer discovery lock; concurrent cold lookups wait on one fetch.
type Flight = Arc<tokio::sync::Mutex<()>>;

/// Resolves keys through the token issuer's OpenID Connect discovery
/// document and JWKS.
#[derive(Clone)]
pub struct RemoteJwksResolver {
    cache: Arc<KeyCache>,
    client: reqwest::Client,
    in_flight: Arc<Mutex<HashMap<String, Flight>>>,
    trusted_issuers: Arc<[String]>,
    allow_http_loopback: bool,
    min_refresh_interval: Duration,
}

impl RemoteJwksResolver {
    pub fn builder() -> RemoteJwksResolverBuilder {
        RemoteJwksResolverBuilder::default()
    }

    /// The issuer cache backing this resolver.
    pub fn cache(&self) -> &Arc<KeyCache> {
        &self.cache
    }

    /// Find the key for a token using its `iss` and `kid`.
    pub async fn resolve(&self, token: &DecodedToken) -> Result<DecodingKey, AuthError> {
        let issuer = token
            .payload
            .iss()
            .ok_or_else(|| AuthError::UnsupportedIssuer("token has no iss claim".into()))?;
        let kid = token
            .header
            .kid
            .as_deref()
            .ok_or_else(|| AuthError::UnsupportedIssuer("token header has no kid".into()))?;

        if !is_supported_url(issuer, self.allow_http_loopback) {
            return Err(AuthError::UnsupportedIssuer(format!(
                "issuer is not an HTTPS URL: {issuer}"
            )));
        }
        if !self.trusted_issuers.is_empty() && !self.trusted_issuers.iter().any(|t| t == issuer) {
            return Err(AuthError::UnsupportedIssuer(format!(
                "issuer is not trusted: {issuer}"
            )));
        }

        let entry = self.key_set_for(issuer).await?;
        entry.key_set.find(kid).await
    }

    async fn key_set_for(&self, issuer: &str) -> Result<CacheEntry, AuthError> {
        if let Some(entry) = self.cache.get(issuer) {
            return Ok(entry);
        }

        let flight = self.flight(issuer);
        let result = {
            let _guard = flight.lock().await;
            // Another request may have finished discovery while we waited
            match self.cache.get(issuer) {
                Some(entry) => Ok(entry),
                None => self.discover(issuer).await,
            }
        };

        self.land(issuer, flight);
        result
    }

    async fn discover(&self, issuer: &str) -> Result<CacheEntry, AuthError> {
        let jwks_uri = discover_jwks_uri(&self.client, issuer, self.allow_http_loopback).await?;
        info!(issuer = %issuer, jwks_uri = %jwks_uri, "Discovered JWKS endpoint");

        let key_set = RemoteJwkSet::new(jwks_uri, self.client.clone(), self.cache.ttl())
            .with_min_refresh_interval(self.min_refresh_interval);
        Ok(self.cache.insert(issuer, Arc::new(key_set)))
    }

    fn flight(&self, issuer: &str) -> Flight {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.entry(issuer.to_string()).or_default().clone()
    }

    /// Forget the flight once its last waiter is done.
    ///
    /// Clones of a flight are only created and dropped under the map lock,
    /// so the reference count read here is exact.
    fn land(&self, issuer: &str, flight: Flight) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let is_current = in_flight
            .get(issuer)
            .is_some_and(|current| Arc::ptr_eq(current, &flight));
        // One reference in the map, one held by the caller
        if is_current && Arc::strong_count(&flight) <= 2 {
            in_flight.remove(issuer);
        }
        drop(flight);
    }
}

/// Source of verification keys.
#[derive(Clone)]
pub enum KeyResolver {
    Static(StaticKey),
    Remote(RemoteJwksResolver),
}

impl KeyResolver {
    /// Produce the key material that must have signed `token`.
    pub async fn resolve(&self, token: &DecodedToken) -> Result<DecodingKey, AuthError> {
        match self {
            KeyResolver::Static(key) => Ok(key.key().clone()),
            KeyResolver::Remote(remote) => remote.resolve(token).await,
        }
    }
}

impl From<StaticKey> for KeyResolver {
    fn from(key: StaticKey) -> Self {
        KeyResolver::Static(key)
    }
}

impl From<RemoteJwksResolver> for KeyResolver {
    fn from(remote: RemoteJwksResolver) -> Self {
        KeyResolver::Remote(remote)
    }
}
