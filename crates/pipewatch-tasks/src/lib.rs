// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background tasks for pipewatch.
//!
//! The scheduler runs each task on its interval or on demand, retries
//! retryable failures within the same run and records every run in the
//! database. Health is derived from that history.

pub mod error;
pub mod health;
pub mod scheduler;
pub mod task;

pub use error::{Result, TaskError};
pub use health::{health_report, HealthReport, HealthState, TaskHealth};
pub use pipewatch_db::{RunStatus, RunTrigger, TaskRun};
pub use scheduler::{RetryPolicy, TaskScheduler};
pub use task::{ShutdownSignal, Task, TaskContext, TaskReport};
