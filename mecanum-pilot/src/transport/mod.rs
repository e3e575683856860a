/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Link abstraction between the dispatcher and the radio stack.
//!
//! The dispatcher never talks to a BLE stack directly. It goes through two
//! traits:
//!
//! * [`Transport`] – discovers peers and opens sessions.
//! * [`TransportSession`] – one connected peer: liveness flag, endpoint
//!   lookup and single-byte writes.
//!
//! [`sim::SimulatedTransport`] is the in-memory implementation used by the
//! tests and the dry-run binary.

pub mod sim;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

// ── Identities ────────────────────────────────────────────────────────────────

/// A discoverable peer: hardware address plus advertised name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub address: String,
    pub name: Option<String>,
}

impl PeerIdentity {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    /// Name used in reports; falls back to the address.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }

    /// Addresses compare case-insensitively (`aa:bb` == `AA:BB`).
    pub fn matches_address(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "<unnamed> ({})", self.address),
        }
    }
}

/// The GATT service + characteristic that accepts command writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEndpoint {
    pub service_uuid: String,
    pub characteristic_uuid: String,
}

impl WriteEndpoint {
    pub fn new(service_uuid: impl Into<String>, characteristic_uuid: impl Into<String>) -> Self {
        Self {
            service_uuid: service_uuid.into(),
            characteristic_uuid: characteristic_uuid.into(),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failures raised while finding or connecting to a peer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("scan failed: {0}")]
    Scan(String),

    #[error("connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },
}

/// Failure of a single command write.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriteError {
    /// No acknowledgement within the session's timeout.
    #[error("write of {payload} was not acknowledged in time")]
    Timeout { payload: u8 },

    /// The link reported an error for this write.
    #[error("link error while writing {payload}: {reason}")]
    Link { payload: u8, reason: String },

    /// The characteristic disappeared or is not writable.
    #[error("characteristic {characteristic_uuid} unavailable")]
    CharacteristicUnavailable { characteristic_uuid: String },
}

/// Result of endpoint resolution on a connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointLookup {
    Found,
    ServiceMissing,
    CharacteristicMissing,
}

// ── Traits ────────────────────────────────────────────────────────────────────

/// Peer discovery and session establishment.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Scan for nearby peers.
    async fn discover(&self) -> Result<Vec<PeerIdentity>, LinkError>;

    /// Open a session to `peer`.
    async fn connect(&self, peer: &PeerIdentity) -> Result<Box<dyn TransportSession>, LinkError>;
}

/// One connected peer.
///
/// `is_connected` is owned by the session; callers only observe it.
#[async_trait]
pub trait TransportSession: Send + Sync {
    fn peer(&self) -> &PeerIdentity;

    fn is_connected(&self) -> bool;

    /// Check that `endpoint` exists on the peer.
    async fn resolve_endpoint(&self, endpoint: &WriteEndpoint) -> EndpointLookup;

    /// Write one payload byte. With `require_ack` the future resolves only
    /// once the peer acknowledged the write or the session gave up.
    async fn write_command(
        &self,
        endpoint: &WriteEndpoint,
        payload: u8,
        require_ack: bool,
    ) -> Result<(), WriteError>;

    async fn close(&self);
}
