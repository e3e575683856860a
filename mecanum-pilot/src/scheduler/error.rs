/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the mecanum pilot.
//!
//! [`DispatchError`] is the full failure taxonomy of one invocation. Discovery,
//! connection and endpoint variants happen before any command is sent and are
//! raised by the [`Dispatcher`](crate::dispatcher::Dispatcher);
//! `LinkDisconnected`, `WriteFailure` and `Cancelled` end a running
//! [`MotionScheduler`](super::MotionScheduler); `MalformedMovement` and
//! `InvalidDuration` come from request validation.
//!
//! A scan failure and a refused connection both arrive as a
//! [`LinkError`]; the `From` conversion routes them to `ScanFailure` and
//! `ConnectionFailure` respectively.
//!
//! Every variant renders to the text placed in the caller's report, so
//! the invocation boundary never has to format errors itself.

use thiserror::Error;

use crate::movement::MAX_DURATION_SEC;
use crate::transport::{LinkError, PeerIdentity, WriteError};

/// Render discovered peers as `name (address)`, comma separated.
fn list_peers(peers: &[PeerIdentity]) -> String {
    if peers.is_empty() {
        return "none".to_string();
    }
    peers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Top-level error for one dispatch invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// The scan returned nothing at all.
    #[error("no BLE device found")]
    NoDevicesFound,

    /// The target peer was not among the discovered devices.
    #[error("device {address} was not found (discovered: {})", list_peers(.discovered))]
    DiscoveryFailure {
        address: String,
        discovered: Vec<PeerIdentity>,
    },

    /// The scan itself failed.
    #[error("device discovery failed: {0}")]
    ScanFailure(LinkError),

    /// The connection attempt failed.
    #[error("connection to the robot failed: {0}")]
    ConnectionFailure(LinkError),

    /// The session opened but reports itself as not connected.
    #[error("connection to {address} could not be established")]
    NotConnected { address: String },

    /// The configured service is absent on the connected peer.
    #[error("service {uuid} was not found on the robot")]
    ServiceMissing { uuid: String },

    /// The configured characteristic is absent on the connected peer.
    #[error("characteristic {uuid} was not found on the robot")]
    CharacteristicMissing { uuid: String },

    /// The link dropped while the timeline was executing.
    #[error("client disconnected during command execution")]
    LinkDisconnected,

    /// A write was not acknowledged; the run was aborted.
    #[error("error during BLE communication: {0}")]
    WriteFailure(#[from] WriteError),

    /// A movement code outside `{0,1,2,3,5,7,8,9}`.
    #[error("movement {code} at position {index} is not a valid command (valid: 0, 1, 2, 3, 5, 7, 8, 9)")]
    MalformedMovement { index: usize, code: i64 },

    /// Duration is NaN, infinite or above the accepted maximum.
    #[error("duration must be a finite number of seconds no greater than {max}, got {0}", max = MAX_DURATION_SEC)]
    InvalidDuration(f64),

    /// The caller cancelled the run.
    #[error("execution cancelled")]
    Cancelled,
}

impl From<LinkError> for DispatchError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Scan(_) => DispatchError::ScanFailure(e),
            LinkError::Connect { .. } => DispatchError::ConnectionFailure(e),
        }
    }
}
