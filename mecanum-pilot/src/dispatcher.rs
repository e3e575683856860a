/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Invocation boundary.
//!
//! [`Dispatcher`] turns one `{movements, duration_sec}` call into one text
//! report. It owns the whole per-invocation lifecycle:
//!
//! ```text
//! validate ─► discover ─► connect ─► resolve endpoint ─► build timeline ─► execute ─► close
//! ```
//!
//! Every failure is converted into report text here; callers always get a
//! string back, never an error.

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::PilotConfig;
use crate::movement::MovementRequest;
use crate::scheduler::{DispatchError, ExecutionReport, MotionScheduler};
use crate::timeline::TimelineBuilder;
use crate::transport::{EndpointLookup, PeerIdentity, Transport, TransportSession};

/// Arguments of the exposed capability, as sent by an agent runtime.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PilotRequest {
    pub movements: Vec<i64>,
    #[serde(default)]
    pub duration_sec: f64,
}

/// Runs motion requests against the robot described by a [`PilotConfig`].
pub struct Dispatcher<T> {
    transport: T,
    config: PilotConfig,
    builder: TimelineBuilder,
    scheduler: MotionScheduler,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T, config: PilotConfig) -> Self {
        let builder = TimelineBuilder::new(config.timing);
        let scheduler = MotionScheduler::new(config.endpoint.clone(), config.require_ack);
        Self {
            transport,
            config,
            builder,
            scheduler,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Handle one decoded capability call and return the report text.
    pub async fn handle(&self, request: &PilotRequest) -> String {
        self.pilot(&request.movements, request.duration_sec).await
    }

    /// Send `movements` to the robot and return the report text.
    pub async fn pilot(&self, movements: &[i64], duration_sec: f64) -> String {
        self.dispatch(movements, duration_sec, None).await.render()
    }

    /// Full invocation, returning the structured report.
    ///
    /// `cancel` is forwarded to the scheduler; it has no effect before the
    /// timeline starts executing.
    pub async fn dispatch(
        &self,
        movements: &[i64],
        duration_sec: f64,
        cancel: Option<watch::Receiver<bool>>,
    ) -> ExecutionReport {
        let request = match MovementRequest::from_raw(movements, duration_sec) {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "rejected motion request");
                return ExecutionReport::aborted(e);
            }
        };

        info!(
            movements = ?movements,
            duration_sec = request.duration_sec(),
            target = %self.config.peer.address,
            "=== Dispatcher::dispatch() ==="
        );

        let session = match self.open_session().await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "could not reach the robot");
                return ExecutionReport::aborted(e);
            }
        };

        let report = match self.check_endpoint(session.as_ref()).await {
            Ok(()) => {
                let timeline = self.builder.build(&request);
                match cancel {
                    Some(rx) => {
                        self.scheduler
                            .execute_with_cancel(session.as_ref(), &timeline, rx)
                            .await
                    }
                    None => self.scheduler.execute(session.as_ref(), &timeline).await,
                }
            }
            Err(e) => {
                error!(error = %e, "write endpoint unavailable");
                ExecutionReport::aborted(e)
            }
        };

        session.close().await;
        info!(outcome = ?report.outcome(), "disconnected from the robot");
        report
    }

    /// Discover the configured peer and connect to it.
    async fn open_session(&self) -> Result<Box<dyn TransportSession>, DispatchError> {
        info!("Scanning for BLE devices...");
        let discovered = self.transport.discover().await?;

        if discovered.is_empty() {
            return Err(DispatchError::NoDevicesFound);
        }

        let target = &self.config.peer;
        let Some(found) = discovered.iter().find(|p| p.matches_address(&target.address)) else {
            warn!(address = %target.address, "target not found, devices seen instead:");
            for (i, peer) in discovered.iter().enumerate() {
                warn!("  {}: {}", i, peer);
            }
            return Err(DispatchError::DiscoveryFailure {
                address: target.address.clone(),
                discovered,
            });
        };

        // Keep the configured name when the advertisement carries none
        let peer = PeerIdentity::new(
            found.address.clone(),
            found.name.clone().or_else(|| target.name.clone()),
        );

        info!(peer = %peer, "Connecting...");
        let session = self.transport.connect(&peer).await?;

        if !session.is_connected() {
            session.close().await;
            return Err(DispatchError::NotConnected {
                address: peer.address,
            });
        }
        info!(peer = %session.peer(), "Connected");
        Ok(session)
    }

    async fn check_endpoint(&self, session: &dyn TransportSession) -> Result<(), DispatchError> {
        let endpoint = &self.config.endpoint;
        match session.resolve_endpoint(endpoint).await {
            EndpointLookup::Found => Ok(()),
            EndpointLookup::ServiceMissing => Err(DispatchError::ServiceMissing {
                uuid: endpoint.service_uuid.clone(),
            }),
            EndpointLookup::CharacteristicMissing => Err(DispatchError::CharacteristicMissing {
                uuid: endpoint.characteristic_uuid.clone(),
            }),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
