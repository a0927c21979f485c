// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wiring from configuration to a running service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pipewatch_config::PipewatchConfig;
use pipewatch_db::{create_pool, run_migrations, Stores};
use pipewatch_gitlab::GitLabClient;
use pipewatch_sync::PipelineService;
use pipewatch_tasks::{RunStatus, RunTrigger, TaskScheduler};

use crate::tasks::{CachePruneTask, HistoryPruneTask, SyncTask, SYNC_TASK_ID};

pub struct App {
	pub config: PipewatchConfig,
	pub stores: Stores,
	pub service: PipelineService,
}

impl App {
	pub async fn build(config: PipewatchConfig) -> anyhow::Result<Self> {
		let pool = create_pool(&config.database.url)
			.await
			.with_context(|| format!("opening database {}", config.database.url))?;
		run_migrations(&pool)
			.await
			.context("running database migrations")?;
		let stores = Stores::sqlite(pool);

		let client = GitLabClient::from_config(&config.gitlab).context("creating GitLab client")?;
		let service = PipelineService::new(
			Arc::new(client),
			stores.clone(),
			config.sync.clone(),
			&config.artifacts,
		);

		Ok(Self {
			config,
			stores,
			service,
		})
	}

	/// Scheduler with the pipeline sync (on its interval when sync is enabled,
	/// on demand otherwise) and both prune tasks.
	pub fn scheduler(&self) -> TaskScheduler {
		let mut scheduler = TaskScheduler::new(Arc::clone(&self.stores.task_runs));

		let sync = Arc::new(SyncTask::new(self.service.clone()));
		if self.config.sync.enabled {
			scheduler.every(sync, Duration::from_secs(self.config.sync.interval_secs));
			tracing::info!(interval_secs = self.config.sync.interval_secs, "Registered sync task");
		} else {
			scheduler.on_demand(sync);
		}

		let prune_every = Duration::from_secs(self.config.artifacts.prune_interval_secs);
		scheduler.every(
			Arc::new(CachePruneTask::new(self.service.clone())),
			prune_every,
		);
		scheduler.every(
			Arc::new(HistoryPruneTask::new(
				Arc::clone(&self.stores.task_runs),
				self.config.database.run_history_retention_days,
			)),
			prune_every,
		);
		scheduler
	}

	/// Runs one sync pass through the scheduler so it lands in the run history.
	pub async fn sync_now(&self, trigger: RunTrigger) -> anyhow::Result<()> {
		let run = self
			.scheduler()
			.run_now(SYNC_TASK_ID, trigger)
			.await
			.context("recording sync run")?;
		if run.status != RunStatus::Succeeded {
			tracing::warn!(
				status = ?run.status,
				error = run.error.as_deref().unwrap_or_default(),
				"Sync run did not succeed"
			);
		}
		Ok(())
	}

	/// Starts the scheduled tasks, runs the initial sync, then serves until Ctrl-C.
	pub async fn serve(self) -> anyhow::Result<()> {
		let scheduler = self.scheduler();
		scheduler
			.start()
			.await
			.context("starting task scheduler")?;

		if self.config.sync.enabled {
			let run = scheduler
				.run_now(SYNC_TASK_ID, RunTrigger::Startup)
				.await
				.context("running initial sync")?;
			tracing::info!(
				status = ?run.status,
				summary = run.summary.as_deref().unwrap_or_default(),
				"Initial sync finished"
			);
		} else {
			tracing::warn!("Sync disabled by configuration; serving stored data only");
		}

		tokio::signal::ctrl_c()
			.await
			.context("waiting for shutdown signal")?;
		tracing::info!("Received shutdown signal");
		scheduler.shutdown().await;
		tracing::info!("Shutdown complete");
		Ok(())
	}
}
