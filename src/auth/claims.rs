// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and standard-claim validation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::AuthError;
use super::verifier::VerifyOptions;

/// Decoded JWT payload.
///
/// An open JSON object: the registered claims (`iss`, `sub`, `aud`, `exp`,
/// `nbf`, `iat`, `jti`) have typed accessors, everything else is reachable
/// through [`Claims::get`]. Serializes back to the same object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(pub Map<String, Value>);

impl Claims {
    /// Raw access to any claim.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Issuer
    pub fn iss(&self) -> Option<&str> {
        self.string("iss")
    }

    /// Subject
    pub fn sub(&self) -> Option<&str> {
        self.string("sub")
    }

    /// JWT ID
    pub fn jti(&self) -> Option<&str> {
        self.string("jti")
    }

    /// Audiences. A single string and an array of strings are both accepted.
    pub fn aud(&self) -> Vec<&str> {
        match self.0.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(auds)) => auds.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Expiration time (Unix seconds), if present and numeric.
    pub fn exp(&self) -> Option<i64> {
        self.numeric_date("exp").ok().flatten()
    }

    /// Not-before time (Unix seconds), if present and numeric.
    pub fn nbf(&self) -> Option<i64> {
        self.numeric_date("nbf").ok().flatten()
    }

    /// Issued-at time (Unix seconds), if present and numeric.
    pub fn iat(&self) -> Option<i64> {
        self.numeric_date("iat").ok().flatten()
    }

    fn string(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// `Ok(None)` when absent, an error when present but not a number.
    fn numeric_date(&self, name: &str) -> Result<Option<i64>, AuthError> {
        match self.0.get(name) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.floor() as i64))
                .map(Some)
                .ok_or_else(|| AuthError::InvalidClaim(format!("{name} is out of range"))),
            Some(_) => Err(AuthError::InvalidClaim(format!("{name} must be a number"))),
        }
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Apply the standard claim checks configured in `options`.
///
/// `now` is the current Unix time in seconds. Tolerance widens every time
/// window in the token's favour.
pub fn validate_claims(claims: &Claims, options: &VerifyOptions, now: i64) -> Result<(), AuthError> {
    let tolerance = secs(options.clock_tolerance);

    if let Some(exp) = claims.numeric_date("exp")? {
        if now >= exp.saturating_add(tolerance) {
            return Err(AuthError::TokenExpired);
        }
    }

    if let Some(nbf) = claims.numeric_date("nbf")? {
        if now < nbf.saturating_sub(tolerance) {
            return Err(AuthError::TokenNotYetValid);
        }
    }

    let iat = claims.numeric_date("iat")?;
    if let Some(max_age) = options.max_token_age {
        let iat = iat.ok_or_else(|| {
            AuthError::InvalidClaim("iat is required when a maximum token age is set".into())
        })?;
        let max_age = secs(max_age);
        if now >= iat.saturating_add(max_age).saturating_add(tolerance) {
            return Err(AuthError::MaxAgeExceeded);
        }
    }

    if !options.audience.is_empty() {
        let matches = claims
            .aud()
            .iter()
            .any(|aud| options.audience.iter().any(|expected| expected == aud));
        if !matches {
            return Err(AuthError::InvalidAudience);
        }
    }

    if !options.issuer.is_empty() {
        match claims.iss() {
            Some(iss) if options.issuer.iter().any(|expected| expected == iss) => {}
            _ => return Err(AuthError::InvalidIssuer),
        }
    }

    if let Some(expected) = &options.subject {
        if claims.sub() != Some(expected.as_str()) {
            return Err(AuthError::InvalidSubject);
        }
    }

    Ok(())
}

/// Whole seconds, clamped to `i64::MAX`.
fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
