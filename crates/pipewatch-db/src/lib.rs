// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for pipewatch.
//!
//! Mirrored projects and pipelines, the derived data computed from them
//! (processed logs, test reports, artifact listings), operator settings and
//! background task history all live in one database.

pub mod artifact_index;
pub mod error;
pub mod migrations;
pub mod pipeline;
pub mod pool;
pub mod processed_log;
pub mod project;
pub mod settings;
pub mod stores;
pub mod task_run;
pub mod test_report;
pub mod testing;
pub mod types;

pub use artifact_index::{ArtifactIndexRepository, ArtifactIndexStore};
pub use error::{DbError, Result};
pub use migrations::run_migrations;
pub use pipeline::{PipelineRepository, PipelineStore};
pub use pool::create_pool;
pub use processed_log::{ProcessedLogRepository, ProcessedLogStore};
pub use project::{ProjectRepository, ProjectStore};
pub use settings::{SettingsRepository, SettingsStore, ENABLED_PROJECTS_KEY};
pub use stores::Stores;
pub use task_run::{
	RunStatus, RunTrigger, ScheduledTask, TaskRun, TaskRunRepository, TaskRunStore,
};
pub use test_report::{TestReportRepository, TestReportStore};
pub use types::{
	CacheCounts, CachedTestReport, PipelineFilter, PipelineStats, DEFAULT_PIPELINE_LIMIT,
	MAX_PIPELINE_LIMIT,
};
