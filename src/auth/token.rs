// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token extraction and unverified JWT decoding.
//!
//! Nothing in this module checks a signature. [`decode`] exists to read the
//! header (`alg`, `kid`) and the payload (`iss`) before a key is chosen, and
//! to back the decode-only middleware.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::claims::Claims;
use super::error::AuthError;

/// Scheme prefix of a bearer credential. Case-sensitive, single space.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Unverified JOSE header of a compact JWS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    /// Signature algorithm name, e.g. `HS256`
    pub alg: String,
    /// Media type, usually `JWT`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    /// Key ID used to pick a key from a JWKS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// Header and payload of a token, decoded without verification.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    pub header: TokenHeader,
    pub payload: Claims,
}

/// Pull the bearer token out of the `Authorization` header.
///
/// Returns `None` when the header is missing, is not valid visible ASCII,
/// uses another scheme, or carries an empty token. Only the first
/// `Authorization` value is considered.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(BEARER_PREFIX)
        .filter(|token| !token.is_empty())
}

/// Split a compact JWS and decode its header and payload.
///
/// Fails with [`AuthError::MalformedToken`] unless the token has exactly three
/// `.`-separated segments and the first two are base64url-encoded JSON
/// objects. The signature segment is never looked at.
pub fn decode(token: &str) -> Result<DecodedToken, AuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, payload, _signature] = segments.as_slice() else {
        return Err(AuthError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    };

    Ok(DecodedToken {
        header: decode_segment(header, "header")?,
        payload: decode_segment(payload, "payload")?,
    })
}

fn decode_segment<T: DeserializeOwned>(segment: &str, name: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::MalformedToken(format!("{name} is not base64url: {e}")))?;
    // Structs also deserialize from JSON arrays, so insist on an object first
    let object: Map<String, Value> = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("{name} is not a JSON object: {e}")))?;
    serde_json::from_value(Value::Object(object))
        .map_err(|e| AuthError::MalformedToken(format!("invalid {name}: {e}")))
}
