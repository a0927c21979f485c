// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mirrors upstream pipelines into the store.
//!
//! A pass lists the eligible projects, then each project's recent pipelines on
//! the default ref. Every listed pipeline has its detail and jobs read, then
//! each job is post-processed: the log is captured and annotated, the artifact
//! archive indexed and, for test jobs, the JUnit report aggregated. Four
//! semaphores bound the work: upstream calls, store writes, projects in flight
//! and pipelines in flight per project. Every upstream request holds one API
//! permit.
//!
//! Failures are isolated to the unit they happen in. A pipeline whose detail
//! cannot be read is counted and skipped. A job whose log fetch fails still has
//! its artifacts indexed, its siblings still run, and its pipeline is still
//! stored. The pass reports how many pipelines were stored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use pipewatch_analysis::{aggregate_report, annotate, children, ZipIndexer};
use pipewatch_config::SyncConfig;
use pipewatch_core::{
	ArtifactIndexEntry, Job, Pipeline, PipelineId, ProcessedLog, Project, ProjectId, TestReport, ZipEntry,
};
use pipewatch_db::Stores;
use pipewatch_gitlab::GitOpsClient;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, trace, warn};

use crate::artifact_source::ArtifactSource;
use crate::cache::ArtifactCache;
use crate::error::Result;
use crate::policy::SyncPolicy;
use crate::state::{SyncState, SyncSummary};

#[derive(Clone)]
struct Limits {
	api: Arc<Semaphore>,
	writes: Arc<Semaphore>,
	projects: Arc<Semaphore>,
	pipelines_per_project: usize,
}

impl Limits {
	fn from_config(config: &SyncConfig) -> Self {
		Self {
			api: Arc::new(Semaphore::new(config.max_concurrent_api_calls.max(1))),
			writes: Arc::new(Semaphore::new(config.max_concurrent_writes.max(1))),
			projects: Arc::new(Semaphore::new(config.max_concurrent_projects.max(1))),
			pipelines_per_project: config.max_concurrent_pipelines.max(1),
		}
	}
}

#[derive(Default)]
struct PassCounters {
	pipelines: AtomicU64,
	projects: AtomicU64,
	failures: AtomicU64,
}

impl PassCounters {
	fn failed(&self, count: u64) {
		self.failures.fetch_add(count, Ordering::Relaxed);
	}
}

#[derive(Clone)]
pub struct SyncOrchestrator {
	client: Arc<dyn GitOpsClient>,
	stores: Stores,
	cache: ArtifactCache,
	indexer: ZipIndexer,
	config: Arc<SyncConfig>,
	policy: Arc<SyncPolicy>,
	limits: Limits,
	state: Arc<SyncState>,
}

impl SyncOrchestrator {
	pub fn new(
		client: Arc<dyn GitOpsClient>,
		stores: Stores,
		cache: ArtifactCache,
		config: SyncConfig,
		state: Arc<SyncState>,
	) -> Self {
		Self {
			client,
			stores,
			cache,
			indexer: ZipIndexer::new(),
			policy: Arc::new(SyncPolicy::new(config.test_stages.clone())),
			limits: Limits::from_config(&config),
			config: Arc::new(config),
			state,
		}
	}

	pub fn state(&self) -> &Arc<SyncState> {
		&self.state
	}

	pub fn config(&self) -> &SyncConfig {
		&self.config
	}

	pub fn policy(&self) -> &SyncPolicy {
		&self.policy
	}

	/// Runs one full pass. Never fails as a whole; per-unit failures are
	/// logged and counted in the summary.
	#[instrument(skip(self), fields(namespace = ?self.config.namespace, default_ref = %self.config.default_ref))]
	pub async fn run_full_sync(&self) -> SyncSummary {
		self.state.begin_pass().await;
		let started_at = Utc::now();
		let updated_after = started_at - chrono::Duration::days(i64::from(self.config.lookback_days));
		let counters = Arc::new(PassCounters::default());

		match self.eligible_projects().await {
			Ok(projects) => {
				debug!(count = projects.len(), "Syncing projects");
				let mut tasks = JoinSet::new();
				for project in projects {
					let this = self.clone();
					let counters = Arc::clone(&counters);
					tasks.spawn(async move { this.sync_project(project, updated_after, counters).await });
				}
				while let Some(joined) = tasks.join_next().await {
					if let Err(e) = joined {
						warn!(error = %e, "Project sync task aborted");
						counters.failed(1);
					}
				}
			}
			Err(e) => {
				warn!(error = %e, "Could not list projects");
				counters.failed(1);
			}
		}

		let summary = SyncSummary {
			pipelines_synced: counters.pipelines.load(Ordering::Relaxed),
			projects_synced: counters.projects.load(Ordering::Relaxed),
			failures: counters.failures.load(Ordering::Relaxed),
			started_at,
			finished_at: Utc::now(),
		};
		info!(
			pipelines_synced = summary.pipelines_synced,
			projects_synced = summary.projects_synced,
			failures = summary.failures,
			"Sync pass finished"
		);
		self.state.finish_pass(summary.clone()).await;
		summary
	}

	/// Stores every visible project and returns those enabled for syncing.
	async fn eligible_projects(&self) -> Result<Vec<Project>> {
		let projects = {
			let _permit = self.limits.api.acquire().await?;
			self
				.client
				.list_projects(self.config.namespace.as_deref())
				.await?
		};

		let enabled = self.stores.settings.get_enabled_projects().await?;
		let is_enabled = |project: &Project| match &enabled {
			Some(ids) if !ids.is_empty() => ids.contains(&project.id),
			_ => true,
		};

		let mut eligible = Vec::new();
		for project in projects {
			{
				let _permit = self.limits.writes.acquire().await?;
				self.stores.projects.upsert_project(&project).await?;
			}
			if is_enabled(&project) {
				eligible.push(project);
			} else {
				trace!(project_id = project.id, "Project not enabled");
			}
		}
		Ok(eligible)
	}

	#[instrument(skip_all, fields(project_id = project.id))]
	async fn sync_project(
		&self,
		project: Project,
		updated_after: DateTime<Utc>,
		counters: Arc<PassCounters>,
	) {
		let Ok(_permit) = self.limits.projects.acquire().await else {
			counters.failed(1);
			return;
		};

		let pipelines = {
			let Ok(_api) = self.limits.api.acquire().await else {
				counters.failed(1);
				return;
			};
			match self
				.client
				.list_pipelines(project.id, &self.config.default_ref, updated_after)
				.await
			{
				Ok(pipelines) => pipelines,
				Err(e) => {
					warn!(error = %e, "Could not list pipelines");
					counters.failed(1);
					return;
				}
			}
		};

		let project = Arc::new(project);
		let limit = Arc::new(Semaphore::new(self.limits.pipelines_per_project));
		let mut tasks = JoinSet::new();
		for summary in pipelines {
			let this = self.clone();
			let project = Arc::clone(&project);
			let counters = Arc::clone(&counters);
			let limit = Arc::clone(&limit);
			tasks.spawn(async move {
				let pipeline_id = summary.id;
				let _permit = limit.acquire_owned().await?;
				this
					.sync_pipeline(&project, pipeline_id, &counters)
					.await
					.inspect_err(|e| warn!(pipeline_id, error = %e, "Pipeline sync failed"))
			});
		}

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok(Ok(())) => {
					counters.pipelines.fetch_add(1, Ordering::Relaxed);
				}
				Ok(Err(_)) => counters.failed(1),
				Err(e) => {
					warn!(error = %e, "Pipeline sync task aborted");
					counters.failed(1);
				}
			}
		}

		counters.projects.fetch_add(1, Ordering::Relaxed);
	}

	/// Reads the pipeline's detail and jobs, post-processes every job, then
	/// stores the pipeline.
	async fn sync_pipeline(
		&self,
		project: &Project,
		pipeline_id: PipelineId,
		counters: &PassCounters,
	) -> Result<()> {
		let mut pipeline = self.fetch_pipeline(project.id, pipeline_id).await?;

		let failures: u64 = join_all(pipeline.jobs.iter().map(|job| self.process_job(project.id, job)))
			.await
			.into_iter()
			.sum();
		counters.failed(failures);

		pipeline.project_name = Some(project.name.clone());
		let _permit = self.limits.writes.acquire().await?;
		self.stores.pipelines.upsert_pipeline(&pipeline).await?;
		debug!(pipeline_id = pipeline.id, jobs = pipeline.jobs.len(), "Pipeline stored");
		Ok(())
	}

	async fn fetch_pipeline(&self, project_id: ProjectId, pipeline_id: PipelineId) -> Result<Pipeline> {
		let mut pipeline = {
			let _permit = self.limits.api.acquire().await?;
			self.client.fetch_pipeline(project_id, pipeline_id).await?
		};
		pipeline.jobs = {
			let _permit = self.limits.api.acquire().await?;
			self.client.list_pipeline_jobs(project_id, pipeline_id).await?
		};
		Ok(pipeline)
	}

	/// Returns the number of failed post-processing steps.
	async fn process_job(&self, project_id: ProjectId, job: &Job) -> u64 {
		let (log, artifacts) = tokio::join!(
			self.capture_log(project_id, job),
			self.process_artifacts(project_id, job),
		);

		let mut failures = artifacts;
		if let Err(e) = log {
			warn!(job_id = job.id, error = %e, "Log capture failed");
			failures += 1;
		}
		failures
	}

	async fn capture_log(&self, project_id: ProjectId, job: &Job) -> Result<()> {
		if self.policy.captures_log(job) {
			self.job_log(project_id, job).await?;
		}
		Ok(())
	}

	/// Indexes the archive, then aggregates its test report from the listing.
	async fn process_artifacts(&self, project_id: ProjectId, job: &Job) -> u64 {
		if !self.policy.indexes_artifacts(job) {
			return 0;
		}

		let root = match self.root_listing(project_id, job).await {
			Ok((root, _)) => root,
			Err(e) => {
				warn!(job_id = job.id, error = %e, "Artifact indexing failed");
				return 1;
			}
		};

		if !self.policy.aggregates_tests(job) {
			return 0;
		}
		let flat = root.flat_list.unwrap_or_default();
		match self.test_report(project_id, job, &flat).await {
			Ok(report) => {
				trace!(job_id = job.id, found = report.is_some(), "Test aggregation done");
				0
			}
			Err(e) => {
				warn!(job_id = job.id, error = %e, "Test aggregation failed");
				1
			}
		}
	}

	/// The job's processed log, fetched and annotated on a miss.
	///
	/// Only logs of finished jobs are stored; a running job's log is returned
	/// as of now.
	pub(crate) async fn job_log(&self, project_id: ProjectId, job: &Job) -> Result<ProcessedLog> {
		if let Some(log) = self.cache.get_log(job.id).await? {
			return Ok(log);
		}

		let raw = {
			let _permit = self.limits.api.acquire().await?;
			self.client.fetch_job_log(project_id, job.id).await?
		};
		let log = ProcessedLog {
			job_id: job.id,
			pipeline_id: job.pipeline_id,
			annotations: annotate(&raw),
			raw_log: raw,
			processed_at: self.cache.now(),
		};

		if job.status.is_terminal() {
			let _permit = self.limits.writes.acquire().await?;
			self.cache.put_log(&log).await?;
		}
		debug!(job_id = job.id, annotations = log.annotations.len(), "Job log processed");
		Ok(log)
	}

	/// Root listing of the job's archive and whether it came from the cache.
	///
	/// The stored root entry keeps the flat listing so deeper directories are
	/// answered without indexing again.
	pub(crate) async fn root_listing(
		&self,
		project_id: ProjectId,
		job: &Job,
	) -> Result<(ArtifactIndexEntry, bool)> {
		if let Some(entry) = self.cache.get_listing(job.id, "").await? {
			if entry.flat_list.is_some() {
				return Ok((entry, true));
			}
		}

		let source =
			ArtifactSource::new(self.client.as_ref(), project_id, job.id).with_limit(&self.limits.api);
		let listing = self
			.indexer
			.list_files(job.artifact_size(), &source)
			.await?;

		let entry = ArtifactIndexEntry {
			job_id: job.id,
			path: String::new(),
			files: children(&listing.entries, ""),
			flat_list: Some(listing.entries),
			truncated: listing.truncated,
			cached_at: self.cache.now(),
		};

		let _permit = self.limits.writes.acquire().await?;
		self.cache.put_listing(&entry).await?;
		debug!(
			job_id = job.id,
			entries = entry.flat_list.as_ref().map_or(0, Vec::len),
			truncated = entry.truncated,
			"Artifact indexed"
		);
		Ok((entry, false))
	}

	/// The job's test report, aggregated from `flat` on a miss. `None` when
	/// the archive has no usable report; that outcome is not cached.
	pub(crate) async fn test_report(
		&self,
		project_id: ProjectId,
		job: &Job,
		flat: &[ZipEntry],
	) -> Result<Option<TestReport>> {
		if let Some(cached) = self.cache.get_test_report(job.id).await? {
			return Ok(Some(cached.report));
		}

		let reader =
			ArtifactSource::new(self.client.as_ref(), project_id, job.id).with_limit(&self.limits.api);
		let report = aggregate_report(flat, &reader).await?;

		if let Some(report) = &report {
			let _permit = self.limits.writes.acquire().await?;
			self
				.cache
				.put_test_report(job.id, job.pipeline_id, report)
				.await?;
			debug!(job_id = job.id, total = report.total, failed = report.failed, "Test report stored");
		}
		Ok(report)
	}
}
