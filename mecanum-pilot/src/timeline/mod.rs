/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Command timeline builder.
//!
//! [`TimelineBuilder`] expands a [`MovementRequest`] into a [`Timeline`]: one
//! [`MovementPlan`] per request element, each holding the ordered
//! [`TimelineEntry`] writes for that element together with the delay to
//! observe after each write.
//!
//! # Expansion rules
//!
//! | Element | Duration | Writes | Delays |
//! |---|---|---|---|
//! | stop (`0`/`5`) | any | `m` once | settle, + pacing unless last |
//! | non-stop | `<= 0` | `m` once | settle, + pacing unless last |
//! | non-stop | `> 0` | `m` × `max(1, floor(d × rate))`, then `0` | interval between sends, settle before the stop, pacing after it unless last |
//!
//! With the default [`TimingConfig`] the rate is 4 Hz, settle is 100 ms and
//! pacing is 200 ms.
//!
//! The builder performs no I/O and cannot fail.

use std::time::Duration;

use tracing::debug;

use crate::config::TimingConfig;
use crate::movement::{MovementCode, MovementRequest};

// ── Timeline types ────────────────────────────────────────────────────────────

/// Why an entry exists in the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// The movement requested by the caller.
    Command,
    /// Stop appended after a burst.
    AutoStop,
}

/// One scheduled write: a payload byte and an optional wait before the next
/// entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    pub payload: u8,
    pub delay_after: Option<Duration>,
    pub kind: EntryKind,
}

impl TimelineEntry {
    fn command(movement: MovementCode, delay_after: Option<Duration>) -> Self {
        Self {
            payload: movement.to_byte(),
            delay_after,
            kind: EntryKind::Command,
        }
    }

    fn auto_stop(delay_after: Option<Duration>) -> Self {
        Self {
            payload: MovementCode::Stop.to_byte(),
            delay_after,
            kind: EntryKind::AutoStop,
        }
    }
}

/// How a request element was expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// Stop code, sent once regardless of duration.
    Stop,
    /// Non-stop code with no duration, sent once.
    Single,
    /// Non-stop code repeated `sends` times, then stopped.
    Burst { sends: usize },
}

/// All entries generated for one request element.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementPlan {
    /// Position of the element in the request.
    pub index: usize,
    pub movement: MovementCode,
    pub kind: PlanKind,
    pub entries: Vec<TimelineEntry>,
}

/// The full, ordered write schedule for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    plans: Vec<MovementPlan>,
    duration_sec: f64,
}

impl Timeline {
    pub fn plans(&self) -> &[MovementPlan] {
        &self.plans
    }

    /// The per-movement duration the timeline was built with.
    pub fn duration_sec(&self) -> f64 {
        self.duration_sec
    }

    /// Every entry across all plans, in execution order.
    pub fn entries(&self) -> impl Iterator<Item = &TimelineEntry> {
        self.plans.iter().flat_map(|p| p.entries.iter())
    }

    /// Payload bytes in write order.
    pub fn payloads(&self) -> Vec<u8> {
        self.entries().map(|e| e.payload).collect()
    }

    pub fn write_count(&self) -> usize {
        self.entries().count()
    }

    /// Sum of every delay in the timeline (write latency excluded).
    pub fn total_delay(&self) -> Duration {
        self.entries().filter_map(|e| e.delay_after).sum()
    }
}

// ── TimelineBuilder ───────────────────────────────────────────────────────────

/// Deterministic expansion of requests into timelines.
#[derive(Debug, Clone, Default)]
pub struct TimelineBuilder {
    timing: TimingConfig,
}

impl TimelineBuilder {
    pub fn new(timing: TimingConfig) -> Self {
        Self { timing }
    }

    /// Expand `request` into a [`Timeline`].
    pub fn build(&self, request: &MovementRequest) -> Timeline {
        let n = request.len();
        let duration_sec = request.duration_sec();

        let plans = request
            .movements()
            .iter()
            .enumerate()
            .map(|(index, &movement)| {
                let is_last = index + 1 == n;
                self.build_plan(index, movement, duration_sec, is_last)
            })
            .collect();

        let timeline = Timeline {
            plans,
            duration_sec,
        };

        debug!(
            elements = n,
            writes = timeline.write_count(),
            total_delay_ms = timeline.total_delay().as_millis() as u64,
            "timeline built"
        );

        timeline
    }

    fn build_plan(
        &self,
        index: usize,
        movement: MovementCode,
        duration_sec: f64,
        is_last: bool,
    ) -> MovementPlan {
        let settle = self.timing.settle();
        let pacing = if is_last {
            None
        } else {
            Some(self.timing.pacing())
        };
        // Single writes wait settle, then pacing, before the next element
        let single_delay = Some(settle + pacing.unwrap_or(Duration::ZERO));

        if movement.is_stop() {
            return MovementPlan {
                index,
                movement,
                kind: PlanKind::Stop,
                entries: vec![TimelineEntry::command(movement, single_delay)],
            };
        }

        if duration_sec <= 0.0 {
            return MovementPlan {
                index,
                movement,
                kind: PlanKind::Single,
                entries: vec![TimelineEntry::command(movement, single_delay)],
            };
        }

        let sends = self.timing.send_count(duration_sec);
        let interval = self.timing.send_interval();

        let mut entries = Vec::with_capacity(sends.saturating_add(1));
        for i in 0..sends {
            let delay = if i + 1 < sends { interval } else { settle };
            entries.push(TimelineEntry::command(movement, Some(delay)));
        }
        entries.push(TimelineEntry::auto_stop(pacing));

        MovementPlan {
            index,
            movement,
            kind: PlanKind::Burst { sends },
            entries,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn build(raw: &[i64], duration_sec: f64) -> Timeline {
        let req = MovementRequest::from_raw(raw, duration_sec).unwrap();
        TimelineBuilder::default().build(&req)
    }

    fn ms(v: u64) -> Option<Duration> {
        Some(Duration::from_millis(v))
    }

    // ── Send counts ───────────────────────────────────────────────────────────

    #[test]
    fn burst_count_is_floor_of_duration_times_four() {
        for (duration, expected) in [(0.25, 1), (0.5, 2), (1.0, 4), (1.5, 6), (1.9, 7), (3.0, 12)] {
            let t = build(&[8], duration);
            let sends = t.payloads().iter().filter(|&&p| p == 8).count();
            assert_eq!(sends, expected, "duration {duration}");
            assert_eq!(t.plans()[0].kind, PlanKind::Burst { sends: expected });
        }
    }

    #[test]
    fn sub_quarter_second_duration_still_sends_once() {
        let t = build(&[2], 0.1);
        assert_eq!(t.payloads(), vec![2, 0]);
    }

    #[test]
    fn burst_is_followed_by_exactly_one_auto_stop() {
        let t = build(&[9], 1.0);
        let entries = &t.plans()[0].entries;
        assert_eq!(entries.last().unwrap().kind, EntryKind::AutoStop);
        assert_eq!(entries.last().unwrap().payload, 0);
        assert_eq!(
            entries.iter().filter(|e| e.kind == EntryKind::AutoStop).count(),
            1
        );
    }

    #[test]
    fn stop_codes_are_never_repeated() {
        for code in [0, 5] {
            for duration in [0.0, 0.1, 2.0, 10.0] {
                let t = build(&[code], duration);
                assert_eq!(t.payloads(), vec![code as u8]);
                assert_eq!(t.plans()[0].kind, PlanKind::Stop);
            }
        }
    }

    #[test]
    fn zero_duration_sends_each_movement_once_without_auto_stop() {
        let t = build(&[7, 0, 9], 0.0);
        assert_eq!(t.payloads(), vec![7, 0, 9]);
        assert!(t.entries().all(|e| e.kind == EntryKind::Command));
    }

    // ── Delays ────────────────────────────────────────────────────────────────

    #[test]
    fn single_writes_carry_settle_plus_pacing_except_last() {
        let t = build(&[7, 0, 9], 0.0);
        let delays: Vec<_> = t.entries().map(|e| e.delay_after).collect();
        assert_eq!(delays, vec![ms(300), ms(300), ms(100)]);
    }

    #[test]
    fn burst_delays_follow_interval_settle_pacing() {
        let t = build(&[8, 2], 0.5);
        let delays: Vec<_> = t.entries().map(|e| e.delay_after).collect();
        assert_eq!(
            delays,
            vec![
                ms(250),
                ms(100), // settle before stop
                ms(200), // pacing before next element
                ms(250),
                ms(100),
                None, // last element: no pacing
            ]
        );
    }

    #[test]
    fn custom_timing_changes_rate_and_delays() {
        let timing = TimingConfig {
            burst_rate_hz: 2,
            settle_ms: 50,
            pacing_ms: 500,
        };
        let req = MovementRequest::from_raw(&[8, 8], 1.5).unwrap();
        let t = TimelineBuilder::new(timing).build(&req);

        assert_eq!(t.plans()[0].kind, PlanKind::Burst { sends: 3 });
        assert_eq!(t.plans()[0].entries[0].delay_after, ms(500));
        assert_eq!(t.plans()[0].entries[2].delay_after, ms(50));
        assert_eq!(t.plans()[0].entries[3].delay_after, ms(500));
    }

    // ── Scenarios ─────────────────────────────────────────────────────────────

    #[test]
    fn scenario_forward_then_backward_for_one_and_a_half_seconds() {
        let t = build(&[8, 2], 1.5);
        let mut expected = vec![8; 6];
        expected.push(0);
        expected.extend(vec![2; 6]);
        expected.push(0);
        assert_eq!(t.payloads(), expected);
        assert_eq!(t.plans().len(), 2);
        assert_eq!(t.plans()[1].index, 1);
    }

    #[test]
    fn total_delay_accounts_for_every_gap() {
        // 5 × 250ms + 100ms settle + 200ms pacing, twice, minus final pacing
        let t = build(&[8, 2], 1.5);
        assert_eq!(t.total_delay(), Duration::from_millis(2 * 1350 + 200));
    }

    #[test]
    fn building_twice_yields_identical_timelines() {
        let req = MovementRequest::from_raw(&[8, 0, 2, 0, 7, 0, 9], 0.5).unwrap();
        let builder = TimelineBuilder::default();
        assert_eq!(builder.build(&req), builder.build(&req));
    }

    #[test]
    fn longest_accepted_duration_builds_bounded_burst() {
        let t = build(&[8], crate::movement::MAX_DURATION_SEC);
        assert_eq!(t.plans()[0].kind, PlanKind::Burst { sends: 2400 });
        assert_eq!(t.write_count(), 2401);
    }

    #[test]
    fn empty_request_builds_empty_timeline() {
        let t = build(&[], 1.0);
        assert!(t.plans().is_empty());
        assert_eq!(t.write_count(), 0);
    }
}
