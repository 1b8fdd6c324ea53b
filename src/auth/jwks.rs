// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OpenID Connect discovery and JWKS (JSON Web Key Set) fetching.
//!
//! ## Security
//!
//! - Issuers and `jwks_uri`s must be HTTPS (plain HTTP only for loopback
//!   hosts, and only when explicitly allowed)
//! - Keys are cached with a TTL; an unknown `kid` triggers one refetch,
//!   rate-limited by a minimum refresh interval

use std::net::IpAddr;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::{Host, Url};

use super::error::AuthError;

/// Path of the discovery document, relative to the issuer.
pub const OIDC_CONFIGURATION_PATH: &str = "/.well-known/openid-configuration";

/// Minimum time between two refetches triggered by unknown key IDs.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Response payload of the issuer's `.well-known/openid-configuration` endpoint.
///
/// Only covers those fields that are relevant in our context.
#[derive(Debug, Deserialize)]
pub struct OpenIdConfiguration {
    /// The URI where to retrieve the issuer's signing keys.
    pub jwks_uri: String,
}

/// Check that `url` is acceptable as an issuer or JWKS location.
///
/// HTTPS with a host is always accepted. Plain HTTP is accepted only for
/// `localhost` and loopback addresses, and only if `allow_http_loopback`.
pub fn is_supported_url(url: &str, allow_http_loopback: bool) -> bool {
    let Ok(url) = Url::parse(url) else {
        return false;
    };
    match url.scheme() {
        "https" => url.host().is_some(),
        "http" => allow_http_loopback && url.host().is_some_and(is_loopback),
        _ => false,
    }
}

fn is_loopback(host: Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => domain.eq_ignore_ascii_case("localhost"),
        Host::Ipv4(ip) => IpAddr::V4(ip).is_loopback(),
        Host::Ipv6(ip) => IpAddr::V6(ip).is_loopback(),
    }
}

/// Fetch the issuer's discovery document and return its `jwks_uri`.
pub async fn discover_jwks_uri(
    client: &reqwest::Client,
    issuer: &str,
    allow_http_loopback: bool,
) -> Result<String, AuthError> {
    let url = format!("{}{OIDC_CONFIGURATION_PATH}", issuer.trim_end_matches('/'));
    debug!(issuer = %issuer, url = %url, "Fetching OpenID configuration");

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| AuthError::KeyDiscovery(format!("discovery request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(AuthError::KeyDiscovery(format!(
            "HTTP {} from discovery endpoint",
            response.status()
        )));
    }

    let OpenIdConfiguration { jwks_uri } = response
        .json()
        .await
        .map_err(|e| AuthError::KeyDiscovery(format!("invalid discovery document: {e}")))?;

    if !is_supported_url(&jwks_uri, allow_http_loopback) {
        return Err(AuthError::KeyDiscovery(format!(
            "jwks_uri is not an HTTPS URL: {jwks_uri}"
        )));
    }

    Ok(jwks_uri)
}

/// JWKS cache entry.
struct CacheEntry {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// Key lookup bound to one `jwks_uri`.
///
/// Fetches lazily on the first [`find`](RemoteJwkSet::find) and keeps the
/// set for `cache_ttl`.
pub struct RemoteJwkSet {
    /// JWKS URL
    jwks_url: String,
    /// Cache TTL
    cache_ttl: Duration,
    /// Minimum interval between refetches caused by unknown key IDs
    min_refresh_interval: Duration,
    /// Cached JWKS
    cache: RwLock<Option<CacheEntry>>,
    /// Held while fetching, so concurrent misses share one request
    fetch_lock: Mutex<()>,
    /// HTTP client
    client: reqwest::Client,
}

impl RemoteJwkSet {
    /// Create a key set for `jwks_url`. Nothing is fetched yet.
    pub fn new(jwks_url: impl Into<String>, client: reqwest::Client, cache_ttl: Duration) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            cache_ttl,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            cache: RwLock::new(None),
            fetch_lock: Mutex::new(()),
            client,
        }
    }

    /// Override the minimum interval between refetches for unknown key IDs.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Get the JWKS URL.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Cached JWKS, if still within the TTL.
    async fn cached(&self) -> Option<JwkSet> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
            .map(|entry| entry.jwks.clone())
    }

    /// Fetch JWKS (with caching).
    ///
    /// Concurrent misses wait for a single fetch.
    async fn get_jwks(&self) -> Result<JwkSet, AuthError> {
        if let Some(jwks) = self.cached().await {
            return Ok(jwks);
        }

        let _fetching = self.fetch_lock.lock().await;
        // Filled by another caller while we waited
        if let Some(jwks) = self.cached().await {
            return Ok(jwks);
        }
        self.fetch_and_store().await
    }

    /// Fetch JWKS from the endpoint and replace the cached copy.
    pub async fn refresh(&self) -> Result<JwkSet, AuthError> {
        let _fetching = self.fetch_lock.lock().await;
        self.fetch_and_store().await
    }

    /// Callers must hold `fetch_lock`.
    async fn fetch_and_store(&self) -> Result<JwkSet, AuthError> {
        let jwks = self.fetch_jwks().await?;
        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        Ok(jwks)
    }

    /// Fetch JWKS from the endpoint.
    async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        info!(jwks_url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::KeyDiscovery(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyDiscovery(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::KeyDiscovery(format!("invalid JWKS document: {e}")))
    }

    /// Whether enough time has passed since the last fetch to refetch for
    /// an unknown key ID.
    async fn may_refresh(&self) -> bool {
        let cache = self.cache.read().await;
        match &*cache {
            Some(entry) => entry.fetched_at.elapsed() >= self.min_refresh_interval,
            None => true,
        }
    }

    /// Check if JWKS is currently cached and valid.
    pub async fn is_cached(&self) -> bool {
        self.cached().await.is_some()
    }

    /// Get a decoding key for the given key ID.
    ///
    /// An unknown `kid` causes a single refetch (keys may have rotated)
    /// before failing with [`AuthError::NoMatchingKey`].
    pub async fn find(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        let jwks = self.get_jwks().await?;
        if let Some(jwk) = jwks.find(kid) {
            return jwk_to_decoding_key(jwk);
        }

        let _fetching = self.fetch_lock.lock().await;
        // A concurrent refetch may already have brought the key in
        let latest = self.cached().await;
        if let Some(jwk) = latest.as_ref().and_then(|jwks| jwks.find(kid)) {
            return jwk_to_decoding_key(jwk);
        }

        if !self.may_refresh().await {
            warn!(jwks_url = %self.jwks_url, kid = %kid, "Unknown kid, JWKS refresh rate limited");
            return Err(AuthError::NoMatchingKey);
        }

        debug!(jwks_url = %self.jwks_url, kid = %kid, "Unknown kid, refreshing JWKS");
        let jwks = self.fetch_and_store().await?;
        jwks.find(kid)
            .ok_or(AuthError::NoMatchingKey)
            .and_then(jwk_to_decoding_key)
    }
}

/// Convert a JWK to a DecodingKey.
fn jwk_to_decoding_key(jwk: &jsonwebtoken::jwk::Jwk) -> Result<DecodingKey, AuthError> {
    DecodingKey::from_jwk(jwk)
        .map_err(|e| AuthError::KeyDiscovery(format!("unusable key in JWKS: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    /// Shared secret whose base64 and base64url encodings coincide.
    pub(crate) const REMOTE_SECRET: &[u8] = b"remote-signing-key-for-tests-0123";
    pub(crate) const REMOTE_SECRET_B64: &str = "cmVtb3RlLXNpZ25pbmcta2V5LWZvci10ZXN0cy0wMTIz";

    pub(crate) fn oct_jwks(kid: &str) -> serde_json::Value {
        json!({
            "keys": [{
                "kty": "oct",
                "kid": kid,
                "alg": "HS256",
                "use": "sig",
                "k": REMOTE_SECRET_B64,
            }]
        })
    }

    async fn jwks_server(kid: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(oct_jwks(kid)))
            .mount(&server)
            .await;
        server
    }

    async fn requests_to(server: &MockServer, route: &str) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == route)
            .count()
    }

    #[test]
    fn https_issuers_are_supported() {
        assert!(is_supported_url("https://issuer.example", false));
        assert!(is_supported_url("https://issuer.example/tenant/", false));
    }

    #[test]
    fn non_https_issuers_are_rejected() {
        assert!(!is_supported_url("http://issuer.example", false));
        assert!(!is_supported_url("http://issuer.example", true));
        assert!(!is_supported_url("ftp://issuer.example", true));
        assert!(!is_supported_url("issuer.example", true));
        assert!(!is_supported_url("", true));
    }

    #[test]
    fn loopback_http_needs_opt_in() {
        assert!(!is_supported_url("http://127.0.0.1:8080", false));
        assert!(is_supported_url("http://127.0.0.1:8080", true));
        assert!(is_supported_url("http://localhost:3000", true));
        assert!(is_supported_url("http://[::1]:3000", true));
    }

    #[tokio::test]
    async fn finds_key_and_caches_jwks() {
        let server = jwks_server("k1").await;
        let key_set = RemoteJwkSet::new(
            format!("{}/jwks", server.uri()),
            reqwest::Client::new(),
            Duration::from_secs(60),
        );
        assert!(!key_set.is_cached().await);

        key_set.find("k1").await.unwrap();
        key_set.find("k1").await.unwrap();

        assert!(key_set.is_cached().await);
        assert_eq!(requests_to(&server, "/jwks").await, 1);
    }

    #[tokio::test]
    async fn unknown_kid_refetches_once() {
        let server = jwks_server("k1").await;
        let key_set = RemoteJwkSet::new(
            format!("{}/jwks", server.uri()),
            reqwest::Client::new(),
            Duration::from_secs(60),
        )
        .with_min_refresh_interval(Duration::ZERO);

        let result = key_set.find("rotated").await;
        assert!(matches!(result, Err(AuthError::NoMatchingKey)));
        assert_eq!(requests_to(&server, "/jwks").await, 2);
    }

    #[tokio::test]
    async fn unknown_kid_refresh_is_rate_limited() {
        let server = jwks_server("k1").await;
        let key_set = RemoteJwkSet::new(
            format!("{}/jwks", server.uri()),
            reqwest::Client::new(),
            Duration::from_secs(60),
        );

        key_set.find("k1").await.unwrap();
        let result = key_set.find("rotated").await;
        assert!(matches!(result, Err(AuthError::NoMatchingKey)));
        assert_eq!(requests_to(&server, "/jwks").await, 1);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let server = jwks_server("k1").await;
        let key_set = std::sync::Arc::new(RemoteJwkSet::new(
            format!("{}/jwks", server.uri()),
            reqwest::Client::new(),
            Duration::from_secs(60),
        ));

        let mut handles = vec![];
        for _ in 0..10 {
            let key_set = key_set.clone();
            handles.push(tokio::spawn(async move { key_set.find("k1").await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(requests_to(&server, "/jwks").await, 1);
    }

    #[tokio::test]
    async fn jwks_error_status_is_discovery_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let key_set = RemoteJwkSet::new(
            format!("{}/jwks", server.uri()),
            reqwest::Client::new(),
            Duration::from_secs(60),
        );
        assert!(matches!(
            key_set.find("k1").await,
            Err(AuthError::KeyDiscovery(_))
        ));
    }

    #[tokio::test]
    async fn discovers_jwks_uri() {
        let server = MockServer::start().await;
        let jwks_uri = format!("{}/jwks", server.uri());
        Mock::given(method("GET"))
            .and(path(OIDC_CONFIGURATION_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "issuer": server.uri(), "jwks_uri": jwks_uri })),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let discovered = discover_jwks_uri(&client, &format!("{}/", server.uri()), true)
            .await
            .unwrap();
        assert_eq!(discovered, jwks_uri);
    }

    #[tokio::test]
    async fn malformed_discovery_document_is_discovery_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OIDC_CONFIGURATION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let result = discover_jwks_uri(&client, &server.uri(), true).await;
        assert!(matches!(result, Err(AuthError::KeyDiscovery(_))));
    }

    #[tokio::test]
    async fn insecure_jwks_uri_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OIDC_CONFIGURATION_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "jwks_uri": "http://keys.example/jwks" })),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let result = discover_jwks_uri(&client, &server.uri(), true).await;
        assert!(matches!(result, Err(AuthError::KeyDiscovery(_))));
    }
}
