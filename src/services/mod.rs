// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - engine logic layer.

pub mod comparison;
pub mod connectivity;
pub mod correction;
pub mod evaluator;
pub mod events;
pub mod filter;
pub mod proximity;
pub mod recorder;
pub mod regions;
pub mod remote;
pub mod state;
pub mod sync;

pub use comparison::TrackComparison;
pub use connectivity::{ConnectivityMonitor, Debouncer};
pub use correction::{CorrectionOutcome, CorrectionPredictor, CorrectionRequest};
pub use events::EventBus;
pub use recorder::{RecorderSettings, RecorderStatus, SampleOutcome, TrackRecorder};
pub use regions::RegionService;
pub use remote::{HttpRemoteStore, RemoteStore};
pub use sync::SyncReconciler;
