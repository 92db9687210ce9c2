// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Dogtracks: offline-first GPS track recording for scent-tracking training
//!
//! This crate records human and dog tracks from a coordinate stream, keeps
//! them in a local durable log, reconciles them with a central store when
//! connectivity allows, and reports region and hiding-spot proximity events.

pub mod config;
pub mod db;
pub mod error;
pub mod geometry;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::TrackRecorder;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub recorder: Arc<TrackRecorder>,
}
