// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer-token (JWT) verification for Axum services.
//!
//! ## Auth Flow
//!
//! 1. Client sends `Authorization: Bearer <JWT>`
//! 2. [`middleware::authenticate`]:
//!    - Extracts and decodes the token
//!    - Checks the header `alg` against the allow-list
//!    - Resolves the key: a static secret/public key, or OpenID Connect
//!      discovery on `iss` followed by a JWKS lookup on `kid`
//!    - Verifies the signature, then expiry, not-before, max age, issuer,
//!      audience and subject
//!    - Runs the optional authorization check
//! 3. Handlers read the claims with [`Auth`] / [`OptionalAuth`]
//!
//! ## Failures
//!
//! | Kind | Status |
//! |------|--------|
//! | Missing credential, malformed token | 401 |
//! | Key discovery failure, unsupported issuer, unknown `kid` | 401 |
//! | Bad signature, failed claim check, disallowed algorithm | 403 |
//! | Authorization check denied | 403 |
//! | Internal error | 401 |
//!
//! ## Security
//!
//! - Remote key discovery requires HTTPS issuers and `jwks_uri`s
//! - Discovered key sets are cached per issuer (LRU, 500 entries, 1 hour)
//! - Concurrent cold lookups for one issuer share a single discovery fetch

pub mod cache;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod middleware;
pub mod resolver;
pub mod token;
pub mod verifier;

pub use cache::KeyCache;
pub use claims::Claims;
pub use error::{AuthError, FailureKind};
pub use extractor::{Auth, Authorization, OptionalAuth};
pub use middleware::{authenticate, decode_authorization, JwtAuthentication};
pub use resolver::{KeyResolver, RemoteJwksResolver, StaticKey};
pub use token::{bearer_token, decode, DecodedToken, TokenHeader};
pub use verifier::{Verifier, VerifyOptions};
