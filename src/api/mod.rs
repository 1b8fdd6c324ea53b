// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{
    auth::{authenticate, decode_authorization},
    state::AppState,
};

pub mod health;
pub mod users;

/// Paths served without authentication.
pub const PUBLIC_PATHS: &[&str] = &["/health", "/v1/peek"];

pub fn router(state: AppState) -> Router {
    let auth = state.auth.clone().ignore_paths(PUBLIC_PATHS.iter().copied());

    let v1_routes = Router::new()
        .route("/me", get(users::me))
        .route("/peek", get(users::peek).layer(from_fn(decode_authorization)))
        .with_state(state);

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", v1_routes)
        .layer(from_fn_with_state(auth, authenticate))
        .layer(TraceLayer::new_for_http())
}
