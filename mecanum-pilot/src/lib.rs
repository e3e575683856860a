/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! mecanum-pilot – motion-command dispatcher for a mecanum-drive robot
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── movement      – validated movement codes and requests
//! ├── timeline/     – pure expansion of a request into timed writes
//! ├── scheduler/    – paced execution against a live link, reports, errors
//! ├── transport/    – link traits + in-memory simulated robot
//! ├── config/       – YAML pilot configuration
//! └── dispatcher    – one invocation: discover, connect, execute, close
//! ```

pub mod config;
pub mod dispatcher;
pub mod movement;
pub mod scheduler;
pub mod timeline;
pub mod transport;
