// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use pipewatch_sync::PipelineService;
use pipewatch_tasks::{RunTrigger, Task, TaskContext, TaskError, TaskReport};
use tracing::instrument;

pub const SYNC_TASK_ID: &str = "pipeline-sync";

/// Runs one sync pass per tick while the sync loop is active.
pub struct SyncTask {
	service: PipelineService,
}

impl SyncTask {
	pub fn new(service: PipelineService) -> Self {
		Self { service }
	}
}

#[async_trait]
impl Task for SyncTask {
	fn id(&self) -> &'static str {
		SYNC_TASK_ID
	}

	fn name(&self) -> &'static str {
		"Pipeline Sync"
	}

	#[instrument(skip(self, ctx), fields(task_id = SYNC_TASK_ID, run_id = %ctx.run_id, trigger = ?ctx.trigger))]
	async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
		ctx.ensure_running()?;

		// A paused loop only holds back scheduled passes.
		if ctx.trigger == RunTrigger::Schedule && !self.service.state().loop_active() {
			tracing::debug!("Sync loop paused, skipping pass");
			return Ok(TaskReport::new("Sync loop paused")
				.with_details(serde_json::json!({ "skipped": true })));
		}

		let pipelines = self.service.trigger_sync().await;
		let summary = self.service.state().last_summary().await;
		let failures = summary.as_ref().map_or(0, |s| s.failures);
		let projects = summary.as_ref().map_or(0, |s| s.projects_synced);

		// Nothing reached the store: upstream is unusable for this pass.
		if projects == 0 && failures > 0 {
			return Err(TaskError::failed(format!(
				"Sync pass failed with {failures} failures and no projects synced"
			)));
		}

		Ok(
			TaskReport::new(format!("Synced {pipelines} pipelines from {projects} projects"))
				.with_details(serde_json::json!({
					"pipelines_synced": pipelines,
					"projects_synced": projects,
					"failures": failures,
				})),
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pipewatch_config::{ArtifactsConfig, SyncConfig};
	use pipewatch_core::PipelineStatus;
	use pipewatch_db::testing::create_test_pool;
	use pipewatch_db::Stores;
	use pipewatch_sync::testing::{pipeline, project, FakeGitOpsClient};
	use pipewatch_tasks::ShutdownSignal;
	use std::sync::Arc;

	async fn task(client: FakeGitOpsClient) -> (SyncTask, PipelineService) {
		let stores = Stores::sqlite(create_test_pool().await);
		let service = PipelineService::new(
			Arc::new(client),
			stores,
			SyncConfig::default(),
			&ArtifactsConfig::default(),
		);
		(SyncTask::new(service.clone()), service)
	}

	fn ctx() -> TaskContext {
		TaskContext::detached(RunTrigger::Schedule)
	}

	#[tokio::test]
	async fn runs_a_pass_and_reports_counts() {
		let client = FakeGitOpsClient::new()
			.with_project(project(1, "group/app"))
			.with_pipeline(pipeline(7, 1, PipelineStatus::Success, Vec::new()));
		let (task, service) = task(client).await;

		let report = task.run(&ctx()).await.unwrap();

		assert_eq!(report.details.unwrap()["pipelines_synced"], 1);
		assert!(service.sync_status().await.complete);
	}

	#[tokio::test]
	async fn paused_loop_skips_the_pass() {
		let (task, service) = task(FakeGitOpsClient::new()).await;
		service.pause_sync_loop();

		let report = task.run(&ctx()).await.unwrap();

		assert_eq!(report.details.unwrap()["skipped"], true);
		assert!(service.state().last_summary().await.is_none());
	}

	#[tokio::test]
	async fn manual_run_syncs_while_paused() {
		let client = FakeGitOpsClient::new()
			.with_project(project(1, "group/app"))
			.with_pipeline(pipeline(7, 1, PipelineStatus::Success, Vec::new()));
		let (task, service) = task(client).await;
		service.pause_sync_loop();

		let report = task
			.run(&TaskContext::detached(RunTrigger::Manual))
			.await
			.unwrap();

		assert_eq!(report.details.unwrap()["pipelines_synced"], 1);
	}

	#[tokio::test]
	async fn unreachable_upstream_fails_the_run() {
		let (task, service) = task(FakeGitOpsClient::new().with_failing_projects()).await;

		let err = task.run(&ctx()).await.unwrap_err();

		assert!(matches!(err, TaskError::Failed { retryable: false, .. }));
		assert!(service.sync_status().await.complete);
	}

	#[tokio::test]
	async fn shutdown_stops_before_syncing() {
		let (task, service) = task(FakeGitOpsClient::new()).await;
		let (stop, shutdown) = ShutdownSignal::channel();
		stop.send(true).unwrap();
		let ctx = TaskContext {
			shutdown,
			..ctx()
		};

		assert!(matches!(task.run(&ctx).await, Err(TaskError::Cancelled)));
		assert!(!service.sync_status().await.complete);
	}
}
