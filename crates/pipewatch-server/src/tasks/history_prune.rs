// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use pipewatch_db::TaskRunStore;
use pipewatch_tasks::{Task, TaskContext, TaskError, TaskReport};
use tracing::instrument;

pub const HISTORY_PRUNE_TASK_ID: &str = "run-history-prune";

/// Deletes task runs older than the retention window. The newest run of each
/// task survives so health stays reportable.
pub struct HistoryPruneTask {
	store: Arc<dyn TaskRunStore>,
	retention_days: u32,
}

impl HistoryPruneTask {
	pub fn new(store: Arc<dyn TaskRunStore>, retention_days: u32) -> Self {
		Self {
			store,
			retention_days,
		}
	}
}

#[async_trait]
impl Task for HistoryPruneTask {
	fn id(&self) -> &'static str {
		HISTORY_PRUNE_TASK_ID
	}

	fn name(&self) -> &'static str {
		"Run History Prune"
	}

	#[instrument(skip(self, ctx), fields(task_id = HISTORY_PRUNE_TASK_ID, run_id = %ctx.run_id, retention_days = self.retention_days))]
	async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
		ctx.ensure_running()?;

		let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
		match self.store.prune_runs(cutoff).await {
			Ok(deleted) => Ok(TaskReport::new(format!(
				"Deleted {deleted} task runs older than {} days",
				self.retention_days
			))
			.with_details(serde_json::json!({
				"deleted": deleted,
				"retention_days": self.retention_days,
			}))),
			Err(e) if e.is_busy() => Err(TaskError::retryable(format!("Run history prune failed: {e}"))),
			Err(e) => Err(TaskError::failed(format!("Run history prune failed: {e}"))),
		}
	}
}
