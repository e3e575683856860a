/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! In-memory transport.
//!
//! Simulates one robot that advertises a fixed set of peers and accepts
//! writes on one endpoint. Every write attempt is recorded with its
//! timestamp on the tokio clock, so pacing can be checked under a paused
//! runtime. [`SimBehavior`] injects the link faults the dispatcher has to
//! survive.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    EndpointLookup, LinkError, PeerIdentity, Transport, TransportSession, WriteEndpoint,
    WriteError,
};

/// Fault injection knobs.
#[derive(Debug, Clone, Default)]
pub struct SimBehavior {
    /// Drop the link once this many writes have been acknowledged.
    pub disconnect_after_writes: Option<usize>,
    /// Fail the write attempt with this 0-based index.
    pub fail_at_write: Option<usize>,
    /// Fail every write attempt from `fail_at_write` onwards, not just one.
    pub keep_failing: bool,
    /// The scan itself errors out.
    pub fail_scan: bool,
    pub refuse_connection: bool,
    /// Session reports `connected == false` right after `connect`.
    pub connect_dead: bool,
    pub missing_service: bool,
    pub missing_characteristic: bool,
    /// Time the peer takes to acknowledge a write-with-response.
    pub ack_latency: Duration,
}

/// One write attempt seen by the simulated peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub payload: u8,
    pub at: Instant,
    pub acknowledged: bool,
}

#[derive(Debug)]
struct SimState {
    connected: AtomicBool,
    closed: AtomicBool,
    attempts: AtomicUsize,
    acknowledged: AtomicUsize,
    writes: Mutex<Vec<RecordedWrite>>,
}

impl SimState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            acknowledged: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
        }
    }

    fn writes(&self) -> MutexGuard<'_, Vec<RecordedWrite>> {
        // A panicking test thread must not hide the log from the others
        self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── SimulatedTransport ────────────────────────────────────────────────────────

/// Cloneable handle: clones share the same write log and link state.
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    peers: Vec<PeerIdentity>,
    endpoint: WriteEndpoint,
    behavior: SimBehavior,
    state: Arc<SimState>,
}

impl SimulatedTransport {
    /// A transport advertising `peers`, each exposing `endpoint`.
    pub fn new(peers: Vec<PeerIdentity>, endpoint: WriteEndpoint) -> Self {
        Self {
            peers,
            endpoint,
            behavior: SimBehavior::default(),
            state: Arc::new(SimState::new()),
        }
    }

    pub fn with_behavior(mut self, behavior: SimBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Every write attempt so far, in order.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.writes().clone()
    }

    /// Payloads of acknowledged writes, in order.
    pub fn delivered_payloads(&self) -> Vec<u8> {
        self.state
            .writes()
            .iter()
            .filter(|w| w.acknowledged)
            .map(|w| w.payload)
            .collect()
    }

    pub fn attempt_count(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// `true` once a session has been closed.
    pub fn was_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Drop the link from outside, as if the robot went out of range.
    pub fn drop_link(&self) {
        warn!("simulated link dropped");
        self.state.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn discover(&self) -> Result<Vec<PeerIdentity>, LinkError> {
        if self.behavior.fail_scan {
            return Err(LinkError::Scan("radio adapter unavailable".to_string()));
        }
        debug!(count = self.peers.len(), "simulated scan");
        Ok(self.peers.clone())
    }

    async fn connect(&self, peer: &PeerIdentity) -> Result<Box<dyn TransportSession>, LinkError> {
        if self.behavior.refuse_connection {
            return Err(LinkError::Connect {
                address: peer.address.clone(),
                reason: "peer refused the connection".to_string(),
            });
        }
        if !self.peers.iter().any(|p| p.matches_address(&peer.address)) {
            return Err(LinkError::Connect {
                address: peer.address.clone(),
                reason: "peer is not in range".to_string(),
            });
        }

        self.state
            .connected
            .store(!self.behavior.connect_dead, Ordering::SeqCst);
        self.state.closed.store(false, Ordering::SeqCst);
        info!(peer = %peer, "simulated session opened");

        Ok(Box::new(SimulatedSession {
            peer: peer.clone(),
            endpoint: self.endpoint.clone(),
            behavior: self.behavior.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

// ── SimulatedSession ──────────────────────────────────────────────────────────

struct SimulatedSession {
    peer: PeerIdentity,
    endpoint: WriteEndpoint,
    behavior: SimBehavior,
    state: Arc<SimState>,
}

impl SimulatedSession {
    fn should_fail(&self, attempt: usize) -> bool {
        match self.behavior.fail_at_write {
            Some(n) if self.behavior.keep_failing => attempt >= n,
            Some(n) => attempt == n,
            None => false,
        }
    }

    fn record(&self, payload: u8, acknowledged: bool) {
        self.state.writes().push(RecordedWrite {
            payload,
            at: Instant::now(),
            acknowledged,
        });
    }
}

#[async_trait]
impl TransportSession for SimulatedSession {
    fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    async fn resolve_endpoint(&self, endpoint: &WriteEndpoint) -> EndpointLookup {
        if self.behavior.missing_service
            || !endpoint
                .service_uuid
                .eq_ignore_ascii_case(&self.endpoint.service_uuid)
        {
            return EndpointLookup::ServiceMissing;
        }
        if self.behavior.missing_characteristic
            || !endpoint
                .characteristic_uuid
                .eq_ignore_ascii_case(&self.endpoint.characteristic_uuid)
        {
            return EndpointLookup::CharacteristicMissing;
        }
        EndpointLookup::Found
    }

    async fn write_command(
        &self,
        endpoint: &WriteEndpoint,
        payload: u8,
        require_ack: bool,
    ) -> Result<(), WriteError> {
        let attempt = self.state.attempts.fetch_add(1, Ordering::SeqCst);

        if !self.is_connected() {
            self.record(payload, false);
            return Err(WriteError::Link {
                payload,
                reason: "not connected".to_string(),
            });
        }
        if self.resolve_endpoint(endpoint).await != EndpointLookup::Found {
            self.record(payload, false);
            return Err(WriteError::CharacteristicUnavailable {
                characteristic_uuid: endpoint.characteristic_uuid.clone(),
            });
        }
        if self.should_fail(attempt) {
            self.record(payload, false);
            return Err(WriteError::Link {
                payload,
                reason: "simulated radio error".to_string(),
            });
        }

        if require_ack && !self.behavior.ack_latency.is_zero() {
            tokio::time::sleep(self.behavior.ack_latency).await;
        }
        self.record(payload, true);

        let delivered = self.state.acknowledged.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(payload, attempt, delivered, "simulated write acknowledged");

        if self
            .behavior
            .disconnect_after_writes
            .is_some_and(|limit| delivered >= limit)
        {
            self.state.connected.store(false, Ordering::SeqCst);
            warn!(delivered, "simulated link dropped after configured write count");
        }
        Ok(())
    }

    async fn close(&self) {
        self.state.connected.store(false, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
        info!(peer = %self.peer, "simulated session closed");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
