/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Motion scheduler: executes a [`Timeline`] against a live link.
//!
//! [`MotionScheduler::execute`] walks the timeline entry by entry:
//!
//! 1. Check the session's `connected` flag; a dead link ends the run with a
//!    disconnect entry.
//! 2. Write the payload and wait for the acknowledgement.
//! 3. Sleep for the entry's delay on the tokio timer.
//!
//! When every entry of a request element has been written, one success line
//! is appended to the [`ExecutionReport`]. The first write failure is fatal
//! for the whole run; nothing is retried.
//!
//! # Per-invocation states
//! ```text
//! Executing ──(timeline exhausted)──► Completed
//!     │ ─────(link flag false)──────► Disconnected
//!     │ ─────(write error)──────────► Failed
//!     └──────(cancel signal)────────► Cancelled
//! ```
//!
//! # Safety stop
//! If a run ends on a write failure or a cancellation while the last
//! delivered payload was a moving command, one best-effort stop (`0`) is
//! written before returning, provided the link still reports connected. Its
//! result is only logged.
//!
//! # Cancellation
//! Cancellation is observed before each write and during delays. A write
//! that is waiting for its acknowledgement is always allowed to finish.

pub mod error;

pub use error::DispatchError;

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::movement::MovementCode;
use crate::timeline::{MovementPlan, PlanKind, Timeline};
use crate::transport::{TransportSession, WriteEndpoint};

/// Text returned when the request held no movements.
pub const NOTHING_PROCESSED: &str = "no movements were processed";

// ── Report types ──────────────────────────────────────────────────────────────

/// Terminal state of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed,
    Disconnected,
    Failed(DispatchError),
    Cancelled,
}

impl ExecutionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed)
    }
}

/// Ordered outcome lines for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    entries: Vec<String>,
    successes: usize,
    writes_delivered: usize,
    outcome: ExecutionOutcome,
}

impl ExecutionReport {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            successes: 0,
            writes_delivered: 0,
            outcome: ExecutionOutcome::Completed,
        }
    }

    /// Report for an invocation that failed before any command was sent.
    pub fn aborted(err: DispatchError) -> Self {
        Self {
            entries: vec![err.to_string()],
            successes: 0,
            writes_delivered: 0,
            outcome: ExecutionOutcome::Failed(err),
        }
    }

    fn push_success(&mut self, line: String) {
        self.entries.push(line);
        self.successes += 1;
    }

    fn finish(mut self, outcome: ExecutionOutcome) -> Self {
        match &outcome {
            ExecutionOutcome::Completed => {}
            ExecutionOutcome::Disconnected => {
                self.entries.push(DispatchError::LinkDisconnected.to_string())
            }
            ExecutionOutcome::Failed(err) => self.entries.push(err.to_string()),
            ExecutionOutcome::Cancelled => self.entries.push(DispatchError::Cancelled.to_string()),
        }
        self.outcome = outcome;
        self
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Number of request elements fully executed.
    pub fn success_count(&self) -> usize {
        self.successes
    }

    /// Number of acknowledged writes, safety stop included.
    pub fn writes_delivered(&self) -> usize {
        self.writes_delivered
    }

    pub fn outcome(&self) -> &ExecutionOutcome {
        &self.outcome
    }

    /// The single text string handed back to the caller.
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            NOTHING_PROCESSED.to_string()
        } else {
            self.entries.join(", ")
        }
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// ── MotionScheduler ───────────────────────────────────────────────────────────

/// Executes timelines against one write endpoint.
///
/// Holds no per-run state; one instance can serve any number of sequential
/// invocations.
#[derive(Debug, Clone)]
pub struct MotionScheduler {
    endpoint: WriteEndpoint,
    require_ack: bool,
}

impl MotionScheduler {
    pub fn new(endpoint: WriteEndpoint, require_ack: bool) -> Self {
        Self {
            endpoint,
            require_ack,
        }
    }

    /// Execute `timeline` on `session` until it is exhausted or the first
    /// fatal event.
    pub async fn execute(
        &self,
        session: &dyn TransportSession,
        timeline: &Timeline,
    ) -> ExecutionReport {
        self.run(session, timeline, None).await
    }

    /// Like [`execute`](Self::execute), stopping early once `cancel` holds
    /// `true`.
    pub async fn execute_with_cancel(
        &self,
        session: &dyn TransportSession,
        timeline: &Timeline,
        mut cancel: watch::Receiver<bool>,
    ) -> ExecutionReport {
        self.run(session, timeline, Some(&mut cancel)).await
    }

    async fn run(
        &self,
        session: &dyn TransportSession,
        timeline: &Timeline,
        mut cancel: Option<&mut watch::Receiver<bool>>,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::new();
        let total = timeline.plans().len();
        let label = session.peer().label().to_string();
        // Last payload the robot acknowledged; decides the safety stop
        let mut last_delivered: Option<u8> = None;

        info!(
            peer = %session.peer(),
            elements = total,
            writes = timeline.write_count(),
            "=== MotionScheduler::execute() ==="
        );

        for plan in timeline.plans() {
            info!(
                movement = %plan.movement,
                element = plan.index + 1,
                total,
                kind = ?plan.kind,
                "processing {}",
                plan.movement.describe()
            );

            let sends = plan.entries.len();
            for (send, entry) in plan.entries.iter().enumerate() {
                if is_cancelled(&cancel) {
                    return self
                        .end_cancelled(session, report, last_delivered)
                        .await;
                }
                if !session.is_connected() {
                    warn!(
                        movement = %plan.movement,
                        send = send + 1,
                        "link lost before write, abandoning remaining timeline"
                    );
                    return report.finish(ExecutionOutcome::Disconnected);
                }

                debug!(payload = entry.payload, send = send + 1, sends, "writing");
                match session
                    .write_command(&self.endpoint, entry.payload, self.require_ack)
                    .await
                {
                    Ok(()) => {
                        report.writes_delivered += 1;
                        last_delivered = Some(entry.payload);
                    }
                    Err(e) => {
                        error!(payload = entry.payload, error = %e, "write failed, aborting run");
                        self.safety_stop(session, &mut report, last_delivered).await;
                        return report.finish(ExecutionOutcome::Failed(e.into()));
                    }
                }

                if let Some(delay) = entry.delay_after {
                    debug!(delay_ms = delay.as_millis() as u64, "pausing");
                    if pause(delay, &mut cancel).await {
                        return self
                            .end_cancelled(session, report, last_delivered)
                            .await;
                    }
                }
            }

            report.push_success(success_line(plan, timeline.duration_sec(), &label));
            info!(movement = %plan.movement, element = plan.index + 1, "✓ done");
        }

        info!(
            elements = report.success_count(),
            writes = report.writes_delivered(),
            "=== Execution complete ==="
        );
        report.finish(ExecutionOutcome::Completed)
    }

    async fn end_cancelled(
        &self,
        session: &dyn TransportSession,
        mut report: ExecutionReport,
        last_delivered: Option<u8>,
    ) -> ExecutionReport {
        warn!("execution cancelled");
        self.safety_stop(session, &mut report, last_delivered).await;
        report.finish(ExecutionOutcome::Cancelled)
    }

    /// Best-effort stop after an aborted run, only if the robot may still be
    /// moving and the link is up.
    async fn safety_stop(
        &self,
        session: &dyn TransportSession,
        report: &mut ExecutionReport,
        last_delivered: Option<u8>,
    ) {
        let moving = last_delivered
            .and_then(|p| MovementCode::from_code(i64::from(p)))
            .is_some_and(|m| !m.is_stop());
        if !moving || !session.is_connected() {
            return;
        }

        let stop = MovementCode::Stop.to_byte();
        match session
            .write_command(&self.endpoint, stop, self.require_ack)
            .await
        {
            Ok(()) => {
                report.writes_delivered += 1;
                info!("safety stop delivered");
            }
            Err(e) => warn!(error = %e, "safety stop failed"),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn success_line(plan: &MovementPlan, duration_sec: f64, peer: &str) -> String {
    let m = plan.movement;
    match plan.kind {
        PlanKind::Stop => format!("stop command {m} sent once to {peer}"),
        PlanKind::Single => format!("command {m} sent successfully to {peer}"),
        PlanKind::Burst { .. } => {
            format!("command {m} run for approx. {duration_sec}s then stopped, sent to {peer}")
        }
    }
}

fn is_cancelled(cancel: &Option<&mut watch::Receiver<bool>>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Sleep for `delay`. Returns `true` if cancelled first.
async fn pause(delay: Duration, cancel: &mut Option<&mut watch::Receiver<bool>>) -> bool {
    match cancel {
        None => {
            tokio::time::sleep(delay).await;
            false
        }
        Some(rx) => {
            tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = wait_cancelled(rx) => true,
            }
        }
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|c| *c).await.is_err() {
        // Sender gone: cancellation can no longer arrive
        std::future::pending::<()>().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::MovementRequest;
    use crate::timeline::TimelineBuilder;
    use crate::transport::sim::{SimBehavior, SimulatedTransport};
    use crate::transport::{PeerIdentity, Transport, WriteError};
    use tokio::time::Instant;

    // ── Test helpers ──────────────────────────────────────────────────────────

    fn endpoint() -> WriteEndpoint {
        WriteEndpoint::new("svc", "chr")
    }

    fn rig(behavior: SimBehavior) -> (SimulatedTransport, PeerIdentity, MotionScheduler) {
        let peer = PeerIdentity::new("F4:12:FA:6E:CF:59", Some("Arduino".into()));
        let transport =
            SimulatedTransport::new(vec![peer.clone()], endpoint()).with_behavior(behavior);
        (transport, peer, MotionScheduler::new(endpoint(), true))
    }

    fn timeline(raw: &[i64], duration_sec: f64) -> Timeline {
        let req = MovementRequest::from_raw(raw, duration_sec).unwrap();
        TimelineBuilder::default().build(&req)
    }

    async fn run(behavior: SimBehavior, raw: &[i64], d: f64) -> (SimulatedTransport, ExecutionReport) {
        let (transport, peer, sched) = rig(behavior);
        let session = transport.connect(&peer).await.unwrap();
        let report = sched.execute(session.as_ref(), &timeline(raw, d)).await;
        (transport, report)
    }

    fn offsets_ms(transport: &SimulatedTransport, start: Instant) -> Vec<u64> {
        transport
            .writes()
            .iter()
            .map(|w| (w.at - start).as_millis() as u64)
            .collect()
    }

    // ── Scenarios ─────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn single_forward_without_duration() {
        let (t, report) = run(SimBehavior::default(), &[8], 0.0).await;
        assert_eq!(t.delivered_payloads(), vec![8]);
        assert_eq!(report.entries(), ["command 8 sent successfully to Arduino"]);
        assert!(report.outcome().is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn forward_then_backward_bursts_with_stops() {
        let start = Instant::now();
        let (t, report) = run(SimBehavior::default(), &[8, 2], 1.5).await;

        let mut expected = vec![8; 6];
        expected.push(0);
        expected.extend(vec![2; 6]);
        expected.push(0);
        assert_eq!(t.delivered_payloads(), expected);

        // 4 Hz burst, 100ms settle before each stop, 200ms pacing between elements
        assert_eq!(
            offsets_ms(&t, start),
            vec![0, 250, 500, 750, 1000, 1250, 1350, 1550, 1800, 2050, 2300, 2550, 2800, 2900]
        );
        assert_eq!(report.success_count(), 2);
        assert_eq!(
            report.entries()[0],
            "command 8 run for approx. 1.5s then stopped, sent to Arduino"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_with_duration_is_sent_once() {
        let (t, report) = run(SimBehavior::default(), &[0], 2.0).await;
        assert_eq!(t.delivered_payloads(), vec![0]);
        assert_eq!(report.entries(), ["stop command 0 sent once to Arduino"]);
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_singles_are_paced() {
        let start = Instant::now();
        let (t, report) = run(SimBehavior::default(), &[7, 0, 9], 0.0).await;
        assert_eq!(t.delivered_payloads(), vec![7, 0, 9]);
        assert_eq!(offsets_ms(&t, start), vec![0, 300, 600]);
        assert_eq!(report.entries().len(), 3);
        assert_eq!(report.render().matches(", ").count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn ack_latency_shifts_the_schedule() {
        let start = Instant::now();
        let (t, _) = run(
            SimBehavior {
                ack_latency: Duration::from_millis(20),
                ..Default::default()
            },
            &[8, 9],
            0.0,
        )
        .await;
        // second write starts after ack (20) + settle/pacing (300), acked 20 later
        assert_eq!(offsets_ms(&t, start), vec![20, 340]);
    }

    // ── Disconnect ────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn disconnect_truncates_report_and_stops_writing() {
        // [7,0,9] singles: link drops after the 2nd write, before entry 3
        let (t, report) = run(
            SimBehavior {
                disconnect_after_writes: Some(2),
                ..Default::default()
            },
            &[7, 0, 9],
            0.0,
        )
        .await;

        assert_eq!(t.attempt_count(), 2, "no write after the drop");
        assert_eq!(report.success_count(), 2);
        assert_eq!(report.entries().len(), 3);
        assert_eq!(
            report.entries().last().unwrap(),
            "client disconnected during command execution"
        );
        assert_eq!(report.outcome(), &ExecutionOutcome::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_mid_burst_keeps_only_completed_elements() {
        // element 0: 4 sends + stop = 5 writes; drop after 7 writes (inside element 1)
        let (t, report) = run(
            SimBehavior {
                disconnect_after_writes: Some(7),
                ..Default::default()
            },
            &[8, 2],
            1.0,
        )
        .await;
        assert_eq!(t.attempt_count(), 7);
        assert_eq!(report.success_count(), 1);
        assert_eq!(report.outcome(), &ExecutionOutcome::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_before_first_write_yields_only_disconnect_entry() {
        let (transport, peer, sched) = rig(SimBehavior::default());
        let session = transport.connect(&peer).await.unwrap();
        transport.drop_link();
        let report = sched.execute(session.as_ref(), &timeline(&[8], 0.0)).await;
        assert_eq!(transport.attempt_count(), 0);
        assert_eq!(report.success_count(), 0);
        assert_eq!(report.entries().len(), 1);
    }

    // ── Write failure ─────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn write_failure_mid_burst_sends_safety_stop() {
        // 3rd send of the burst fails; the robot is still moving on the 2nd
        let (t, report) = run(
            SimBehavior {
                fail_at_write: Some(2),
                ..Default::default()
            },
            &[8, 2],
            1.0,
        )
        .await;

        assert_eq!(t.delivered_payloads(), vec![8, 8, 0]);
        assert_eq!(t.attempt_count(), 4);
        assert_eq!(report.success_count(), 0);
        assert_eq!(report.writes_delivered(), 3);
        assert!(matches!(
            report.outcome(),
            ExecutionOutcome::Failed(DispatchError::WriteFailure(WriteError::Link { .. }))
        ));
        assert!(report
            .entries()
            .last()
            .unwrap()
            .starts_with("error during BLE communication"));
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_after_stop_does_not_resend_stop() {
        // [0, 8]: the 0 is delivered, the 8 fails; robot is already stopped
        let (t, report) = run(
            SimBehavior {
                fail_at_write: Some(1),
                ..Default::default()
            },
            &[0, 8],
            0.0,
        )
        .await;
        assert_eq!(t.attempt_count(), 2);
        assert_eq!(t.delivered_payloads(), vec![0]);
        assert_eq!(report.success_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_safety_stop_is_not_fatal() {
        let (t, report) = run(
            SimBehavior {
                fail_at_write: Some(1),
                keep_failing: true,
                ..Default::default()
            },
            &[8],
            1.0,
        )
        .await;
        // burst send, failing send, failing safety stop
        assert_eq!(t.attempt_count(), 3);
        assert_eq!(report.writes_delivered(), 1);
        assert!(matches!(report.outcome(), ExecutionOutcome::Failed(_)));
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn cancel_during_pause_stops_and_halts_robot() {
        let (transport, peer, sched) = rig(SimBehavior::default());
        let session = transport.connect(&peer).await.unwrap();
        let (tx, rx) = watch::channel(false);

        let tl = timeline(&[8], 2.0);
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(600)).await;
            tx.send(true).unwrap();
        };
        let (report, ()) = tokio::join!(
            sched.execute_with_cancel(session.as_ref(), &tl, rx),
            canceller
        );

        // sends at 0, 250, 500; cancelled during the pause after 500
        assert_eq!(transport.delivered_payloads(), vec![8, 8, 8, 0]);
        assert_eq!(report.outcome(), &ExecutionOutcome::Cancelled);
        assert_eq!(report.entries(), [DispatchError::Cancelled.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_run_writes_nothing() {
        let (transport, peer, sched) = rig(SimBehavior::default());
        let session = transport.connect(&peer).await.unwrap();
        let (_tx, rx) = watch::channel(true);
        let report = sched
            .execute_with_cancel(session.as_ref(), &timeline(&[8, 2], 0.0), rx)
            .await;
        assert_eq!(transport.attempt_count(), 0);
        assert_eq!(report.outcome(), &ExecutionOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_cancel_sender_never_cancels() {
        let (transport, peer, sched) = rig(SimBehavior::default());
        let session = transport.connect(&peer).await.unwrap();
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let report = sched
            .execute_with_cancel(session.as_ref(), &timeline(&[8, 2], 0.5), rx)
            .await;
        assert!(report.outcome().is_completed());
        assert_eq!(transport.delivered_payloads(), vec![8, 8, 0, 2, 2, 0]);
    }

    // ── Report ────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn empty_timeline_renders_placeholder() {
        let (t, report) = run(SimBehavior::default(), &[], 1.0).await;
        assert_eq!(t.attempt_count(), 0);
        assert_eq!(report.render(), NOTHING_PROCESSED);
        assert!(report.outcome().is_completed());
    }

    #[test]
    fn aborted_report_carries_single_error_line() {
        let report = ExecutionReport::aborted(DispatchError::NoDevicesFound);
        assert_eq!(report.render(), "no BLE device found");
        assert_eq!(report.success_count(), 0);
    }
}
