// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer Auth - JWT bearer-token verification for Axum
//!
//! This crate verifies `Authorization: Bearer` JWTs against a static key or
//! against keys discovered from the token issuer, and exposes the result as
//! Axum middleware and extractors.
//!
//! ## Modules
//!
//! - `auth` - Token decoding, key resolution, verification, middleware
//! - `api` - HTTP routes of the demo server
//! - `config` - Environment-based configuration
//! - `error` - Configuration errors

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;
