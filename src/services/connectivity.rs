// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Connectivity monitor: probes the remote store and reports edges.

use crate::services::recorder::TrackRecorder;
use crate::services::remote::RemoteStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Turns a stream of probe results into debounced online/offline edges.
///
/// One success is enough to come online; going offline takes
/// `failures_to_offline` consecutive failures so a single dropped probe
/// does not interrupt a drain.
#[derive(Debug, Clone)]
pub struct Debouncer {
    online: Option<bool>,
    failures: u32,
    failures_to_offline: u32,
}

impl Debouncer {
    pub fn new(failures_to_offline: u32) -> Self {
        Self {
            online: None,
            failures: 0,
            failures_to_offline: failures_to_offline.max(1),
        }
    }

    /// Feed one probe result; returns the new state on an edge.
    pub fn observe(&mut self, reachable: bool) -> Option<bool> {
        let next = if reachable {
            self.failures = 0;
            true
        } else {
            self.failures += 1;
            if self.online == Some(true) && self.failures < self.failures_to_offline {
                return None;
            }
            false
        };
        if self.online == Some(next) {
            return None;
        }
        self.online = Some(next);
        Some(next)
    }
}

pub struct ConnectivityMonitor {
    remote: Arc<dyn RemoteStore>,
    recorder: Arc<TrackRecorder>,
    interval: Duration,
    debouncer: Debouncer,
}

impl ConnectivityMonitor {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        recorder: Arc<TrackRecorder>,
        interval: Duration,
        failures_to_offline: u32,
    ) -> Self {
        Self {
            remote,
            recorder,
            interval,
            debouncer: Debouncer::new(failures_to_offline),
        }
    }

    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                let reachable = match self.remote.ping().await {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::debug!(error = %err, "Connectivity probe failed");
                        false
                    }
                };
                // The recorder may have flipped offline on its own after a failed call
                if reachable && !self.recorder.is_online() {
                    self.debouncer.online = Some(false);
                }
                if let Some(online) = self.debouncer.observe(reachable) {
                    self.recorder.set_connectivity(online);
                }
            }
        })
    }
}
