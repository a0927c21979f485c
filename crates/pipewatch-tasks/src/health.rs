// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Task health, read back from the run history so that any process sharing
//! the database (e.g. `pipewatch status` next to `pipewatch serve`) sees it.

use pipewatch_db::{RunStatus, TaskRun, TaskRunStore};
use serde::Serialize;

use crate::error::Result;

/// Consecutive failed runs at which a task is reported unhealthy.
pub const UNHEALTHY_AFTER_FAILURES: u32 = 3;

/// Runs read per task; bounds the reported failure streak.
const HISTORY_WINDOW: u32 = 10;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
	Healthy,
	Degraded,
	Unhealthy,
}

impl HealthState {
	pub fn from_streak(failure_streak: u32) -> Self {
		match failure_streak {
			0 => HealthState::Healthy,
			n if n < UNHEALTHY_AFTER_FAILURES => HealthState::Degraded,
			_ => HealthState::Unhealthy,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskHealth {
	pub task_id: String,
	pub name: String,
	pub state: HealthState,
	pub failure_streak: u32,
	pub last_run: Option<TaskRun>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
	/// Worst state of any task.
	pub state: HealthState,
	pub tasks: Vec<TaskHealth>,
}

/// Failed runs since the last run that did not fail, newest first. Runs still
/// in progress are ignored.
pub fn failure_streak(runs: &[TaskRun]) -> u32 {
	runs
		.iter()
		.filter(|run| run.status != RunStatus::Running)
		.take_while(|run| run.status == RunStatus::Failed)
		.count() as u32
}

#[tracing::instrument(skip(store))]
pub async fn health_report(store: &dyn TaskRunStore) -> Result<HealthReport> {
	let mut tasks = Vec::new();
	for task in store.list_tasks().await? {
		let runs = store.recent_runs(&task.id, HISTORY_WINDOW).await?;
		let failure_streak = failure_streak(&runs);
		tasks.push(TaskHealth {
			task_id: task.id,
			name: task.name,
			state: HealthState::from_streak(failure_streak),
			failure_streak,
			last_run: runs.into_iter().next(),
		});
	}

	let state = tasks
		.iter()
		.map(|task| task.state)
		.max()
		.unwrap_or(HealthState::Healthy);
	Ok(HealthReport { state, tasks })
}
