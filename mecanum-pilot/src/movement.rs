/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Movement data structures for the mecanum pilot.
//!
//! Two types model the input side of the dispatch pipeline:
//!
//! ```text
//! caller ──([int], f64)──►  MovementRequest  ──(TimelineBuilder)──►  Timeline  ──(MotionScheduler)──►  link
//!                             ↑ validated, read-only
//! ```
//!
//! # Ownership model
//! A `MovementRequest` is created once per invocation and only ever borrowed
//! afterwards. Raw integers are validated into [`MovementCode`] here, so the
//! builder and scheduler never see an out-of-domain byte.

use std::fmt;

use tracing::warn;

use crate::scheduler::DispatchError;

// ── Movement codes ────────────────────────────────────────────────────────────

/// One discrete drive vector understood by the robot firmware.
///
/// The numeric values follow a numeric-keypad layout (8 = up, 2 = down, ...)
/// and are sent on the wire as a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementCode {
    /// `0` – stop all motors.
    Stop,
    /// `1` – diagonal backward-left.
    BackwardLeft,
    /// `2` – straight backward.
    Backward,
    /// `3` – diagonal backward-right.
    BackwardRight,
    /// `5` – explicit stop, same effect as [`MovementCode::Stop`].
    Halt,
    /// `7` – diagonal forward-left.
    ForwardLeft,
    /// `8` – straight forward.
    Forward,
    /// `9` – diagonal forward-right.
    ForwardRight,
}

impl MovementCode {
    /// Every valid code, in wire-value order.
    pub const ALL: [MovementCode; 8] = [
        MovementCode::Stop,
        MovementCode::BackwardLeft,
        MovementCode::Backward,
        MovementCode::BackwardRight,
        MovementCode::Halt,
        MovementCode::ForwardLeft,
        MovementCode::Forward,
        MovementCode::ForwardRight,
    ];

    /// Parse a caller-supplied integer. Returns `None` outside the domain.
    pub fn from_code(v: i64) -> Option<Self> {
        match v {
            0 => Some(MovementCode::Stop),
            1 => Some(MovementCode::BackwardLeft),
            2 => Some(MovementCode::Backward),
            3 => Some(MovementCode::BackwardRight),
            5 => Some(MovementCode::Halt),
            7 => Some(MovementCode::ForwardLeft),
            8 => Some(MovementCode::Forward),
            9 => Some(MovementCode::ForwardRight),
            _ => None,
        }
    }

    /// The single payload byte written to the link.
    pub fn to_byte(self) -> u8 {
        match self {
            MovementCode::Stop => 0,
            MovementCode::BackwardLeft => 1,
            MovementCode::Backward => 2,
            MovementCode::BackwardRight => 3,
            MovementCode::Halt => 5,
            MovementCode::ForwardLeft => 7,
            MovementCode::Forward => 8,
            MovementCode::ForwardRight => 9,
        }
    }

    /// `true` for both stop codes (`0` and `5`). Stops are single-shot.
    pub fn is_stop(self) -> bool {
        matches!(self, MovementCode::Stop | MovementCode::Halt)
    }

    /// Short human-readable description.
    pub fn describe(self) -> &'static str {
        match self {
            MovementCode::Stop => "stop all motors",
            MovementCode::BackwardLeft => "diagonal backward-left",
            MovementCode::Backward => "backward",
            MovementCode::BackwardRight => "diagonal backward-right",
            MovementCode::Halt => "explicit stop",
            MovementCode::ForwardLeft => "diagonal forward-left",
            MovementCode::Forward => "forward",
            MovementCode::ForwardRight => "diagonal forward-right",
        }
    }
}

impl fmt::Display for MovementCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_byte())
    }
}

// ── MovementRequest ───────────────────────────────────────────────────────────

/// Longest accepted per-movement duration: ten minutes.
///
/// Together with `MAX_BURST_RATE_HZ` this bounds the size of a burst.
pub const MAX_DURATION_SEC: f64 = 600.0;

/// A validated motion request: ordered movements plus one duration applied
/// to every non-stop movement.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementRequest {
    movements: Vec<MovementCode>,
    duration_sec: f64,
}

impl MovementRequest {
    /// Build a request from already-typed movements.
    ///
    /// # Errors
    /// [`DispatchError::InvalidDuration`] if `duration_sec` is NaN, infinite
    /// or above [`MAX_DURATION_SEC`]. Negative durations are accepted and
    /// treated as `0`.
    pub fn new(movements: Vec<MovementCode>, duration_sec: f64) -> Result<Self, DispatchError> {
        if !duration_sec.is_finite() || duration_sec > MAX_DURATION_SEC {
            return Err(DispatchError::InvalidDuration(duration_sec));
        }
        let duration_sec = if duration_sec < 0.0 {
            warn!(duration_sec, "negative duration treated as 0");
            0.0
        } else {
            duration_sec
        };
        Ok(Self {
            movements,
            duration_sec,
        })
    }

    /// Validate raw caller integers into a request.
    ///
    /// Fails on the first out-of-domain value; nothing after it is inspected.
    ///
    /// # Errors
    /// [`DispatchError::MalformedMovement`] for a code outside
    /// `{0,1,2,3,5,7,8,9}`, or [`DispatchError::InvalidDuration`].
    pub fn from_raw(raw: &[i64], duration_sec: f64) -> Result<Self, DispatchError> {
        let movements = raw
            .iter()
            .enumerate()
            .map(|(index, &code)| {
                MovementCode::from_code(code)
                    .ok_or(DispatchError::MalformedMovement { index, code })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(movements, duration_sec)
    }

    pub fn movements(&self) -> &[MovementCode] {
        &self.movements
    }

    pub fn duration_sec(&self) -> f64 {
        self.duration_sec
    }

    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.movements.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
