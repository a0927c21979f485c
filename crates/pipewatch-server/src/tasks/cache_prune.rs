// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use pipewatch_sync::PipelineService;
use pipewatch_tasks::{Task, TaskContext, TaskError, TaskReport};
use tracing::instrument;

pub const CACHE_PRUNE_TASK_ID: &str = "cache-prune";

/// Drops artifact listings and test reports older than the cache TTL.
pub struct CachePruneTask {
	service: PipelineService,
}

impl CachePruneTask {
	pub fn new(service: PipelineService) -> Self {
		Self { service }
	}
}

#[async_trait]
impl Task for CachePruneTask {
	fn id(&self) -> &'static str {
		CACHE_PRUNE_TASK_ID
	}

	fn name(&self) -> &'static str {
		"Cache Prune"
	}

	#[instrument(skip(self, ctx), fields(task_id = CACHE_PRUNE_TASK_ID, run_id = %ctx.run_id))]
	async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
		ctx.ensure_running()?;

		match self.service.prune_cache().await {
			Ok(report) => {
				tracing::info!(
					artifact_listings = report.artifact_listings,
					test_reports = report.test_reports,
					"Cache prune completed"
				);
				Ok(TaskReport::new(format!(
					"Pruned {} artifact listings and {} test reports",
					report.artifact_listings, report.test_reports
				))
				.with_details(serde_json::json!({
					"artifact_listings": report.artifact_listings,
					"test_reports": report.test_reports,
				})))
			}
			Err(e) if e.is_transient() => Err(TaskError::retryable(format!("Cache prune failed: {e}"))),
			Err(e) => Err(TaskError::failed(format!("Cache prune failed: {e}"))),
		}
	}
}
