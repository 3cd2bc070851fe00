// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Heartbeat Monitor
//!
//! Keeps the newest heartbeat of every agent seen on `system.heartbeat` and
//! derives liveness from it. Agents never report `STALLED` themselves; the
//! monitor assigns it once the last heartbeat is older than a threshold.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use orion_core::domain::agent::{AgentHeartbeat, AgentId, AgentStatus};
use orion_core::domain::events::{Message, Topic};
use orion_core::infrastructure::event_bus::{EventBus, Subscription};

#[derive(Default)]
pub struct HeartbeatMonitor {
    latest: Arc<DashMap<AgentId, AgentHeartbeat>>,
    subscription: Mutex<Option<Subscription>>,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking heartbeats published on `bus`. A second call is a no-op.
    pub fn attach(&self, bus: &EventBus) {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return;
        }

        let latest = self.latest.clone();
        *subscription = Some(bus.subscribe_fn(Topic::Heartbeat, "heartbeat-monitor", move |envelope| {
            let latest = latest.clone();
            async move {
                if let Message::Heartbeat(heartbeat) = &envelope.payload {
                    record(&latest, heartbeat.clone());
                }
                Ok::<(), anyhow::Error>(())
            }
        }));
    }

    pub fn detach(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
    }

    /// Record a heartbeat directly. Older than the stored one means ignored.
    pub fn observe(&self, heartbeat: AgentHeartbeat) {
        record(&self.latest, heartbeat);
    }

    pub fn latest(&self, agent_id: &AgentId) -> Option<AgentHeartbeat> {
        self.latest.get(agent_id).map(|entry| entry.value().clone())
    }

    pub fn snapshot(&self) -> Vec<AgentHeartbeat> {
        let mut all: Vec<AgentHeartbeat> = self.latest.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.agent_id.as_str().cmp(b.agent_id.as_str()));
        all
    }

    /// Agents whose last heartbeat is older than `threshold`.
    pub fn stalled(&self, threshold: Duration) -> Vec<AgentId> {
        let mut stalled: Vec<AgentId> = self
            .latest
            .iter()
            .filter(|entry| is_stale(entry.value(), threshold))
            .map(|entry| entry.key().clone())
            .collect();
        stalled.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        stalled
    }

    /// Reported status, or `STALLED` when the agent has gone quiet.
    pub fn effective_status(&self, agent_id: &AgentId, threshold: Duration) -> Option<AgentStatus> {
        self.latest.get(agent_id).map(|entry| {
            if is_stale(entry.value(), threshold) {
                AgentStatus::Stalled
            } else {
                entry.value().status
            }
        })
    }
}

fn record(latest: &DashMap<AgentId, AgentHeartbeat>, heartbeat: AgentHeartbeat) {
    let mut slot = latest
        .entry(heartbeat.agent_id.clone())
        .or_insert_with(|| heartbeat.clone());
    if heartbeat.timestamp >= slot.timestamp {
        *slot = heartbeat;
    } else {
        debug!(agent_id = %heartbeat.agent_id, "Discarding out-of-order heartbeat");
    }
}

fn is_stale(heartbeat: &AgentHeartbeat, threshold: Duration) -> bool {
    let Ok(threshold) = chrono::Duration::from_std(threshold) else {
        return false;
    };
    Utc::now() - heartbeat.timestamp > threshold
}
