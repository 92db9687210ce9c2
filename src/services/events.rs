// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Event fan-out to the presentation layer.

use crate::models::EngineEvent;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcasts engine events and keeps the most recent region events.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
    recent: Mutex<VecDeque<EngineEvent>>,
    history: usize,
}

impl EventBus {
    pub fn new(history: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            recent: Mutex::new(VecDeque::with_capacity(history)),
            history,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        tracing::debug!(?event, "Engine event");
        if event.is_region_event() && self.history > 0 {
            let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
            if recent.len() == self.history {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn emit_all(&self, events: impl IntoIterator<Item = EngineEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Recent region events, newest first.
    pub fn recent(&self) -> Vec<EngineEvent> {
        let recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent.iter().rev().cloned().collect()
    }
}
