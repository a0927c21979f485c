// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Run history of the background tasks (`pipeline-sync`, `cache-prune`,
//! `run-history-prune`).
//!
//! Like the mirrored pipelines, a run is stored as a JSON document; only the
//! columns the history is queried by are broken out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::types::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
	Running,
	Succeeded,
	Failed,
	Cancelled,
}

/// Why a run started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
	/// The initial sync of `pipewatch serve`.
	Startup,
	Schedule,
	/// `pipewatch sync` from the command line.
	Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
	pub id: String,
	pub name: String,
	/// `None` for tasks that only run on demand.
	pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
	pub id: String,
	pub task_id: String,
	pub trigger: RunTrigger,
	pub status: RunStatus,
	pub started_at: DateTime<Utc>,
	pub finished_at: Option<DateTime<Utc>>,
	/// Attempts made, retries included.
	pub attempts: u32,
	pub error: Option<String>,
	pub summary: Option<String>,
	pub details: Option<serde_json::Value>,
}

impl TaskRun {
	pub fn start(id: String, task_id: &str, trigger: RunTrigger) -> Self {
		Self {
			id,
			task_id: task_id.to_string(),
			trigger,
			status: RunStatus::Running,
			started_at: Utc::now(),
			finished_at: None,
			attempts: 0,
			error: None,
			summary: None,
			details: None,
		}
	}

	pub fn finish(&mut self, status: RunStatus) {
		self.status = status;
		self.finished_at = Some(Utc::now());
	}

	pub fn duration_ms(&self) -> Option<i64> {
		self
			.finished_at
			.map(|finished| (finished - self.started_at).num_milliseconds())
	}
}

#[async_trait]
pub trait TaskRunStore: Send + Sync {
	async fn register_task(&self, task: &ScheduledTask) -> Result<()>;
	async fn list_tasks(&self) -> Result<Vec<ScheduledTask>>;
	/// Inserts the run, or replaces the stored copy of a run already recorded.
	async fn record_run(&self, run: &TaskRun) -> Result<()>;
	/// Newest first.
	async fn recent_runs(&self, task_id: &str, limit: u32) -> Result<Vec<TaskRun>>;
	/// Deletes runs that finished before `cutoff`. The newest run of every task
	/// is kept regardless of age.
	async fn prune_runs(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[derive(Clone)]
pub struct TaskRunRepository {
	pool: SqlitePool,
}

impl TaskRunRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
	pub async fn register_task(&self, task: &ScheduledTask) -> Result<()> {
		let document = serde_json::to_string(task)?;
		sqlx::query(
			r#"
			INSERT INTO scheduled_tasks (id, document, registered_at)
			VALUES (?, ?, ?)
			ON CONFLICT(id) DO UPDATE SET document = excluded.document
			"#,
		)
		.bind(&task.id)
		.bind(document)
		.bind(timestamp(Utc::now()))
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
		let rows: Vec<(String,)> =
			sqlx::query_as("SELECT document FROM scheduled_tasks ORDER BY id")
				.fetch_all(&self.pool)
				.await?;

		rows
			.into_iter()
			.map(|(document,)| serde_json::from_str(&document).map_err(Into::into))
			.collect()
	}

	#[tracing::instrument(skip(self, run), fields(run_id = %run.id, task_id = %run.task_id, status = ?run.status))]
	pub async fn record_run(&self, run: &TaskRun) -> Result<()> {
		let document = serde_json::to_string(run)?;
		sqlx::query(
			r#"
			INSERT INTO task_runs (id, task_id, started_at, finished_at, document)
			VALUES (?, ?, ?, ?, ?)
			ON CONFLICT(id) DO UPDATE SET
				finished_at = excluded.finished_at,
				document = excluded.document
			"#,
		)
		.bind(&run.id)
		.bind(&run.task_id)
		.bind(timestamp(run.started_at))
		.bind(run.finished_at.map(timestamp))
		.bind(document)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn recent_runs(&self, task_id: &str, limit: u32) -> Result<Vec<TaskRun>> {
		let rows: Vec<(String,)> = sqlx::query_as(
			"SELECT document FROM task_runs WHERE task_id = ? ORDER BY started_at DESC LIMIT ?",
		)
		.bind(task_id)
		.bind(limit as i64)
		.fetch_all(&self.pool)
		.await?;

		rows
			.into_iter()
			.map(|(document,)| serde_json::from_str(&document).map_err(Into::into))
			.collect()
	}

	#[tracing::instrument(skip(self), fields(cutoff = %cutoff))]
	pub async fn prune_runs(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query(
			r#"
			DELETE FROM task_runs
			WHERE finished_at IS NOT NULL
				AND finished_at < ?
				AND id NOT IN (
					SELECT id FROM (
						SELECT id, ROW_NUMBER() OVER (
							PARTITION BY task_id ORDER BY started_at DESC
						) AS position
						FROM task_runs
					)
					WHERE position = 1
				)
			"#,
		)
		.bind(timestamp(cutoff))
		.execute(&self.pool)
		.await?;

		let deleted = result.rows_affected();
		if deleted > 0 {
			tracing::info!(deleted, "pruned task run history");
		}
		Ok(deleted)
	}
}

#[async_trait]
impl TaskRunStore for TaskRunRepository {
	async fn register_task(&self, task: &ScheduledTask) -> Result<()> {
		self.register_task(task).await
	}

	async fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
		self.list_tasks().await
	}

	async fn record_run(&self, run: &TaskRun) -> Result<()> {
		self.record_run(run).await
	}

	async fn recent_runs(&self, task_id: &str, limit: u32) -> Result<Vec<TaskRun>> {
		self.recent_runs(task_id, limit).await
	}

	async fn prune_runs(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		self.prune_runs(cutoff).await
	}
}
