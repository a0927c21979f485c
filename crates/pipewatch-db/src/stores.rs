// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::artifact_index::{ArtifactIndexRepository, ArtifactIndexStore};
use crate::error::Result;
use crate::pipeline::{PipelineRepository, PipelineStore};
use crate::processed_log::{ProcessedLogRepository, ProcessedLogStore};
use crate::project::{ProjectRepository, ProjectStore};
use crate::settings::{SettingsRepository, SettingsStore};
use crate::task_run::{TaskRunRepository, TaskRunStore};
use crate::test_report::{TestReportRepository, TestReportStore};
use crate::types::CacheCounts;

/// Every store the sync and query paths need, behind trait objects so tests
/// can substitute their own.
#[derive(Clone)]
pub struct Stores {
	pub projects: Arc<dyn ProjectStore>,
	pub pipelines: Arc<dyn PipelineStore>,
	pub logs: Arc<dyn ProcessedLogStore>,
	pub test_reports: Arc<dyn TestReportStore>,
	pub artifact_index: Arc<dyn ArtifactIndexStore>,
	pub settings: Arc<dyn SettingsStore>,
	pub task_runs: Arc<dyn TaskRunStore>,
}

impl Stores {
	pub fn sqlite(pool: SqlitePool) -> Self {
		Self {
			projects: Arc::new(ProjectRepository::new(pool.clone())),
			pipelines: Arc::new(PipelineRepository::new(pool.clone())),
			logs: Arc::new(ProcessedLogRepository::new(pool.clone())),
			test_reports: Arc::new(TestReportRepository::new(pool.clone())),
			artifact_index: Arc::new(ArtifactIndexRepository::new(pool.clone())),
			settings: Arc::new(SettingsRepository::new(pool.clone())),
			task_runs: Arc::new(TaskRunRepository::new(pool)),
		}
	}

	pub async fn cache_counts(&self) -> Result<CacheCounts> {
		Ok(CacheCounts {
			artifact_listings: self.artifact_index.count_listings().await?,
			test_reports: self.test_reports.count_test_reports().await?,
			processed_logs: self.logs.count_processed_logs().await?,
		})
	}
}
