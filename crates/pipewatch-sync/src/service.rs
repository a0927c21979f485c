// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Read and control operations over the mirrored CI data.
//!
//! [`PipelineService`] is what a caller talks to. It answers from the store
//! where it can and falls back to the upstream for derived data that has not
//! been produced yet (artifact listings, test reports, job logs), caching the
//! result for the next reader.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use pipewatch_analysis::{
	children, normalize_path, order_stages, MarkerPosition, TeamClassifier, TeamRule,
};
use pipewatch_config::{ArtifactsConfig, SyncConfig, TeamRuleConfig};
use pipewatch_core::{
	ArtifactEntry, ArtifactIndexEntry, Job, JobId, Pipeline, PipelineId, ProcessedLog, Project,
	ProjectId, TestCounts, TestReport,
};
use pipewatch_db::{CacheCounts, PipelineFilter, PipelineStats, Stores};
use pipewatch_gitlab::GitOpsClient;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::artifact_source::is_missing_archive;
use crate::cache::{ArtifactCache, CacheKey, PruneReport};
use crate::error::{Result, SyncError};
use crate::orchestrator::SyncOrchestrator;
use crate::state::{SyncPhase, SyncState, SyncSummary};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
	pub complete: bool,
	pub phase: SyncPhase,
	pub loop_active: bool,
	pub namespace: Option<String>,
	pub default_ref: String,
	pub lookback_days: u32,
	pub last_sync: Option<SyncSummary>,
}

/// Why a browse answer is empty or incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BrowseNotice {
	NoArtifacts,
	TooLarge { size: u64, limit: u64 },
	Unreadable { message: String },
	/// The archive's central directory was cut short.
	Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrowseResult {
	pub job_id: JobId,
	pub path: String,
	pub files: Vec<ArtifactEntry>,
	pub cached: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub notice: Option<BrowseNotice>,
}

impl BrowseResult {
	fn empty(job_id: JobId, path: String, notice: BrowseNotice) -> Self {
		Self {
			job_id,
			path,
			files: Vec::new(),
			cached: false,
			notice: Some(notice),
		}
	}

	fn from_entry(entry: ArtifactIndexEntry, cached: bool) -> Self {
		Self {
			job_id: entry.job_id,
			notice: entry.truncated.then_some(BrowseNotice::Partial),
			path: entry.path,
			files: entry.files,
			cached,
		}
	}
}

/// An artifact archive declared by a stored job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactDescriptor {
	pub job_id: JobId,
	pub pipeline_id: PipelineId,
	pub project_id: ProjectId,
	pub job_name: String,
	pub stage: String,
	pub filename: String,
	pub size: u64,
}

impl ArtifactDescriptor {
	fn of(pipeline: &Pipeline, job: &Job) -> Option<Self> {
		let artifact = job.artifact.as_ref()?;
		Some(Self {
			job_id: job.id,
			pipeline_id: pipeline.id,
			project_id: pipeline.project_id,
			job_name: job.name.clone(),
			stage: job.stage.clone(),
			filename: artifact.filename.clone(),
			size: artifact.size,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobTests {
	pub job_id: JobId,
	pub name: String,
	pub stage: String,
	pub team: String,
	pub counts: TestCounts,
	pub report_path: Option<String>,
}

/// Test results of a pipeline's test-stage jobs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineTests {
	pub pipeline_id: PipelineId,
	pub counts: TestCounts,
	pub teams: BTreeMap<String, TestCounts>,
	pub jobs: Vec<JobTests>,
}

fn team_rules(rules: &[TeamRuleConfig]) -> Vec<TeamRule> {
	rules
		.iter()
		.map(|rule| TeamRule {
			project: rule.project.clone(),
			marker: rule.marker.clone(),
			position: match rule.position {
				pipewatch_config::MarkerPosition::After => MarkerPosition::After,
				pipewatch_config::MarkerPosition::Before => MarkerPosition::Before,
			},
		})
		.collect()
}

#[derive(Clone)]
pub struct PipelineService {
	client: Arc<dyn GitOpsClient>,
	stores: Stores,
	cache: ArtifactCache,
	orchestrator: SyncOrchestrator,
	classifier: Arc<TeamClassifier>,
	max_browse_bytes: u64,
}

impl PipelineService {
	pub fn new(
		client: Arc<dyn GitOpsClient>,
		stores: Stores,
		sync: SyncConfig,
		artifacts: &ArtifactsConfig,
	) -> Self {
		let cache = ArtifactCache::new(&stores, Duration::from_secs(artifacts.cache_ttl_secs));
		Self::with_cache(client, stores, cache, sync, artifacts)
	}

	pub fn with_cache(
		client: Arc<dyn GitOpsClient>,
		stores: Stores,
		cache: ArtifactCache,
		sync: SyncConfig,
		artifacts: &ArtifactsConfig,
	) -> Self {
		let orchestrator = SyncOrchestrator::new(
			Arc::clone(&client),
			stores.clone(),
			cache.clone(),
			sync,
			Arc::new(SyncState::new()),
		);
		Self {
			client,
			stores,
			cache,
			orchestrator,
			classifier: Arc::new(TeamClassifier::new(team_rules(&artifacts.team_rules))),
			max_browse_bytes: artifacts.max_browse_bytes,
		}
	}

	pub fn state(&self) -> &Arc<SyncState> {
		self.orchestrator.state()
	}

	pub fn cache(&self) -> &ArtifactCache {
		&self.cache
	}

	/// Runs a full pass now and returns the number of pipelines stored.
	pub async fn trigger_sync(&self) -> u64 {
		self.orchestrator.run_full_sync().await.pipelines_synced
	}

	pub async fn sync_status(&self) -> SyncStatus {
		let config = self.orchestrator.config();
		let state = self.state();
		let phase = state.phase().await;
		SyncStatus {
			complete: phase == SyncPhase::Complete,
			phase,
			loop_active: state.loop_active(),
			namespace: config.namespace.clone(),
			default_ref: config.default_ref.clone(),
			lookback_days: config.lookback_days,
			last_sync: state.last_summary().await,
		}
	}

	pub fn pause_sync_loop(&self) {
		self.state().set_loop_active(false);
		info!("Sync loop paused");
	}

	pub fn resume_sync_loop(&self) {
		self.state().set_loop_active(true);
		info!("Sync loop resumed");
	}

	async fn pipeline_for_job(&self, job_id: JobId) -> Result<(Pipeline, Job)> {
		let pipeline = self
			.stores
			.pipelines
			.find_pipeline_by_job(job_id)
			.await?
			.ok_or_else(|| SyncError::NotFound(format!("job {job_id}")))?;
		let job = pipeline
			.job(job_id)
			.cloned()
			.ok_or_else(|| SyncError::NotFound(format!("job {job_id}")))?;
		Ok((pipeline, job))
	}

	/// The job with its declared artifact, asking upstream when the stored
	/// record carries none.
	async fn with_artifact(&self, project_id: ProjectId, mut job: Job) -> Result<Job> {
		if job.artifact.is_none() {
			job.artifact = match self
				.client
				.fetch_job_artifact_metadata(project_id, job.id)
				.await
			{
				Ok(artifact) => artifact,
				Err(e) if e.is_not_found() => None,
				Err(e) => return Err(e.into()),
			};
		}
		Ok(job)
	}

	/// Lists one directory of a job's artifact archive.
	///
	/// Served from the cache when possible, including subdirectories of an
	/// already indexed archive. Otherwise the archive is indexed with ranged
	/// reads. Missing, oversized and unreadable archives give an empty listing
	/// with a [`BrowseNotice`].
	#[instrument(skip(self))]
	pub async fn browse_artifact(&self, job_id: JobId, path: &str) -> Result<BrowseResult> {
		let path = normalize_path(path);
		if let Some(entry) = self.cache.get_listing(job_id, &path).await? {
			return Ok(BrowseResult::from_entry(entry, true));
		}
		if !path.is_empty() {
			if let Some(root) = self.cache.get_listing(job_id, "").await? {
				if root.flat_list.is_some() {
					return self.subdirectory(&root, path, true).await;
				}
			}
		}

		let (pipeline, job) = self.pipeline_for_job(job_id).await?;
		let job = self.with_artifact(pipeline.project_id, job).await?;

		let size = job.artifact_size();
		if size == 0 {
			return Ok(BrowseResult::empty(job_id, path, BrowseNotice::NoArtifacts));
		}
		if size > self.max_browse_bytes {
			debug!(size, limit = self.max_browse_bytes, "Artifact too large to browse");
			return Ok(BrowseResult::empty(
				job_id,
				path,
				BrowseNotice::TooLarge {
					size,
					limit: self.max_browse_bytes,
				},
			));
		}

		let (root, cached) = match self.orchestrator.root_listing(pipeline.project_id, &job).await {
			Ok(found) => found,
			Err(SyncError::Index(e)) if is_missing_archive(&e) => {
				return Ok(BrowseResult::empty(job_id, path, BrowseNotice::NoArtifacts));
			}
			Err(SyncError::Index(e)) => {
				warn!(job_id, error = %e, "Artifact archive unreadable");
				return Ok(BrowseResult::empty(
					job_id,
					path,
					BrowseNotice::Unreadable {
						message: e.to_string(),
					},
				));
			}
			Err(e) => return Err(e),
		};

		if path.is_empty() {
			return Ok(BrowseResult::from_entry(root, cached));
		}
		self.subdirectory(&root, path, cached).await
	}

	/// Builds and caches the listing of `path` from the root's flat listing.
	async fn subdirectory(
		&self,
		root: &ArtifactIndexEntry,
		path: String,
		cached: bool,
	) -> Result<BrowseResult> {
		let flat = root.flat_list.as_deref().unwrap_or_default();
		let entry = ArtifactIndexEntry {
			job_id: root.job_id,
			files: children(flat, &path),
			path,
			flat_list: None,
			truncated: root.truncated,
			cached_at: self.cache.now(),
		};
		self.cache.put_listing(&entry).await?;
		Ok(BrowseResult::from_entry(entry, cached))
	}

	/// The artifact declared by a stored job, if any.
	pub async fn list_job_artifacts(&self, job_id: JobId) -> Result<Vec<ArtifactDescriptor>> {
		let (pipeline, job) = self.pipeline_for_job(job_id).await?;
		Ok(ArtifactDescriptor::of(&pipeline, &job).into_iter().collect())
	}

	/// Artifacts declared by the jobs of a stored pipeline, in job order.
	pub async fn list_pipeline_artifacts(
		&self,
		pipeline_id: PipelineId,
	) -> Result<Vec<ArtifactDescriptor>> {
		let pipeline = self.get_pipeline(pipeline_id).await?;
		Ok(pipeline
			.jobs
			.iter()
			.filter_map(|job| ArtifactDescriptor::of(&pipeline, job))
			.collect())
	}

	/// Reads one file out of a job's artifact archive.
	///
	/// When the archive is indexed, paths absent from its listing are rejected
	/// without asking upstream.
	#[instrument(skip(self))]
	pub async fn download_artifact_file(&self, job_id: JobId, path: &str) -> Result<Bytes> {
		let path = normalize_path(path);
		let not_found = || SyncError::NotFound(format!("artifact file {path:?} of job {job_id}"));
		if path.is_empty() {
			return Err(not_found());
		}

		let (pipeline, job) = self.pipeline_for_job(job_id).await?;
		let job = self.with_artifact(pipeline.project_id, job).await?;
		if job.artifact.is_none() {
			return Err(SyncError::NotFound(format!("artifacts of job {job_id}")));
		}

		if let Some(root) = self.cache.get_listing(job_id, "").await? {
			if let Some(flat) = &root.flat_list {
				if !flat.iter().any(|e| !e.is_directory && e.name == path) {
					return Err(not_found());
				}
			}
		}

		let body = self
			.client
			.fetch_artifact_file(pipeline.project_id, job_id, &path)
			.await?;
		debug!(bytes = body.len(), "Artifact file downloaded");
		Ok(body)
	}

	/// Report for a job with no usable artifact or report is `None`; an
	/// unreadable archive is logged and treated the same.
	async fn report_for(&self, project_id: ProjectId, job: Job) -> Result<Option<TestReport>> {
		if let Some(cached) = self.cache.get_test_report(job.id).await? {
			return Ok(Some(cached.report));
		}

		let job = self.with_artifact(project_id, job).await?;
		if job.artifact_size() == 0 {
			return Ok(None);
		}

		let result = async {
			let (root, _) = self.orchestrator.root_listing(project_id, &job).await?;
			let flat = root.flat_list.unwrap_or_default();
			self.orchestrator.test_report(project_id, &job, &flat).await
		}
		.await;

		match result {
			Err(SyncError::Index(e)) => {
				if !is_missing_archive(&e) {
					warn!(job_id = job.id, error = %e, "Could not read test report");
				}
				Ok(None)
			}
			other => other,
		}
	}

	#[instrument(skip(self))]
	pub async fn get_job_tests(&self, job_id: JobId) -> Result<Option<TestReport>> {
		let (pipeline, job) = self.pipeline_for_job(job_id).await?;
		self.report_for(pipeline.project_id, job).await
	}

	/// Sums the test reports of a pipeline's test-stage jobs, overall and per
	/// team. Jobs whose report cannot be produced are left out.
	#[instrument(skip(self))]
	pub async fn get_pipeline_tests(&self, pipeline_id: PipelineId) -> Result<PipelineTests> {
		let pipeline = self.get_pipeline(pipeline_id).await?;
		let project_path = match self.stores.projects.get_project(pipeline.project_id).await? {
			Some(project) => project.path,
			None => pipeline.project_name.clone().unwrap_or_default(),
		};

		let policy = self.orchestrator.policy();
		let candidates: Vec<&Job> = pipeline
			.jobs
			.iter()
			.filter(|job| policy.aggregates_tests(job))
			.collect();
		let reports = join_all(
			candidates
				.iter()
				.map(|job| self.report_for(pipeline.project_id, (*job).clone())),
		)
		.await;

		let mut summary = PipelineTests {
			pipeline_id,
			counts: TestCounts::default(),
			teams: BTreeMap::new(),
			jobs: Vec::new(),
		};
		for (job, report) in candidates.into_iter().zip(reports) {
			let report = match report {
				Ok(Some(report)) => report,
				Ok(None) => continue,
				Err(e) => {
					warn!(job_id = job.id, error = %e, "Skipping job in pipeline tests");
					continue;
				}
			};

			let counts = report.counts();
			let team = self
				.classifier
				.classify(&project_path, report.report_path.as_deref());
			summary.counts += counts;
			*summary.teams.entry(team.clone()).or_default() += counts;
			summary.jobs.push(JobTests {
				job_id: job.id,
				name: job.name.clone(),
				stage: job.stage.clone(),
				team,
				counts,
				report_path: report.report_path,
			});
		}
		Ok(summary)
	}

	/// The job's processed log. Logs of unfinished jobs are fetched fresh each
	/// time and not stored.
	#[instrument(skip(self))]
	pub async fn get_job_log(&self, job_id: JobId) -> Result<ProcessedLog> {
		let (pipeline, job) = self.pipeline_for_job(job_id).await?;
		self.orchestrator.job_log(pipeline.project_id, &job).await
	}

	pub async fn list_pipeline_logs(&self, pipeline_id: PipelineId) -> Result<Vec<ProcessedLog>> {
		Ok(self.stores.logs.list_processed_logs(pipeline_id).await?)
	}

	pub async fn list_pipelines(&self, filter: &PipelineFilter) -> Result<Vec<Pipeline>> {
		Ok(self.stores.pipelines.list_pipelines(filter).await?)
	}

	pub async fn get_pipeline(&self, pipeline_id: PipelineId) -> Result<Pipeline> {
		self
			.stores
			.pipelines
			.get_pipeline(pipeline_id)
			.await?
			.ok_or_else(|| SyncError::NotFound(format!("pipeline {pipeline_id}")))
	}

	pub async fn pipeline_stats(&self) -> Result<PipelineStats> {
		Ok(self.stores.pipelines.pipeline_stats().await?)
	}

	pub async fn list_branches(&self) -> Result<Vec<String>> {
		Ok(self.stores.pipelines.list_branches().await?)
	}

	pub async fn list_projects(&self) -> Result<Vec<Project>> {
		Ok(self.stores.projects.list_projects().await?)
	}

	pub async fn get_enabled_projects(&self) -> Result<Option<Vec<ProjectId>>> {
		Ok(self.stores.settings.get_enabled_projects().await?)
	}

	/// An empty list enables every project.
	pub async fn set_enabled_projects(&self, ids: &[ProjectId]) -> Result<()> {
		self.stores.settings.set_enabled_projects(ids).await?;
		info!(count = ids.len(), "Enabled projects updated");
		Ok(())
	}

	/// The pipeline's stages in CI definition order. Falls back to the
	/// standard order when the definition cannot be read.
	#[instrument(skip(self))]
	pub async fn get_pipeline_stages(&self, pipeline_id: PipelineId) -> Result<Vec<String>> {
		let pipeline = self.get_pipeline(pipeline_id).await?;
		let seen: Vec<String> = pipeline.stages().into_iter().map(String::from).collect();

		let ci_order = match self
			.client
			.fetch_ci_stage_order(pipeline.project_id, &pipeline.ref_name)
			.await
		{
			Ok(order) => order,
			Err(e) => {
				warn!(project_id = pipeline.project_id, error = %e, "Could not read CI stage order");
				None
			}
		};
		Ok(order_stages(&seen, ci_order.as_deref()))
	}

	pub async fn cache_stats(&self) -> Result<CacheCounts> {
		self.cache.stats().await
	}

	pub async fn clear_cache(&self) -> Result<CacheCounts> {
		self.cache.invalidate_all().await
	}

	pub async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
		self.cache.invalidate(key).await
	}

	pub async fn prune_cache(&self) -> Result<PruneReport> {
		self.cache.prune().await
	}

	pub fn now(&self) -> DateTime<Utc> {
		self.cache.now()
	}
}
