// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::{Extension, Json};

use crate::auth::{Auth, Authorization, Claims};

/// Get the verified claims of the current request.
pub async fn me(Auth(claims): Auth) -> Json<Claims> {
    Json(claims)
}

/// Get whatever claims the bearer token carries, without verification.
///
/// Returns `null` when no token is present or it does not decode.
pub async fn peek(authorization: Option<Extension<Authorization>>) -> Json<Option<Claims>> {
    Json(authorization.map(|Extension(authorization)| authorization.claims))
}
