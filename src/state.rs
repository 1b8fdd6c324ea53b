// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::extract::FromRef;

use crate::auth::JwtAuthentication;

#[derive(Clone)]
pub struct AppState {
    pub auth: JwtAuthentication,
}

impl AppState {
    pub fn new(auth: JwtAuthentication) -> Self {
        Self { auth }
    }
}

impl FromRef<AppState> for JwtAuthentication {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
