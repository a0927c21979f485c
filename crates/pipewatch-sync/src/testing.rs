// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process doubles for sync tests: a settable clock, an upstream fake and
//! record fixtures.
//!
//! The upstream fake can add latency to every call and records how many calls,
//! projects and pipelines were in flight at once, so tests can observe the
//! orchestrator's concurrency bounds.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use pipewatch_analysis::testing::build_zip;
use pipewatch_core::{
	Job, JobArtifact, JobId, Pipeline, PipelineId, PipelineStatus, Project, ProjectId,
};
use pipewatch_gitlab::{GitLabError, GitOpsClient, Result};

use crate::cache::Clock;

/// Clock that only moves when told to.
pub struct ManualClock {
	now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::at(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
	}
}

impl ManualClock {
	pub fn at(now: DateTime<Utc>) -> Self {
		Self {
			now: Mutex::new(now),
		}
	}

	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock().unwrap();
		*now += chrono::Duration::from_std(by).unwrap();
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().unwrap()
	}
}

/// A ZIP archive plus the contents of its files.
pub struct FakeArchive {
	bytes: Vec<u8>,
	files: HashMap<String, Vec<u8>>,
}

impl FakeArchive {
	pub fn new(entries: &[(&str, &str)]) -> Self {
		Self {
			bytes: build_zip(entries),
			files: entries
				.iter()
				.map(|(name, body)| (name.to_string(), body.as_bytes().to_vec()))
				.collect(),
		}
	}

	pub fn size(&self) -> u64 {
		self.bytes.len() as u64
	}
}

#[derive(Default)]
struct Upstream {
	projects: Vec<Project>,
	pipelines: Vec<Pipeline>,
	logs: HashMap<JobId, String>,
	failing_logs: HashSet<JobId>,
	failing_pipelines: HashSet<PipelineId>,
	archives: HashMap<JobId, FakeArchive>,
	ci_stages: HashMap<ProjectId, Vec<String>>,
	failing_projects: bool,
}

impl Upstream {
	fn pipeline(&self, pipeline_id: PipelineId) -> Result<&Pipeline> {
		if self.failing_pipelines.contains(&pipeline_id) {
			return Err(FakeGitOpsClient::server_error());
		}
		self
			.pipelines
			.iter()
			.find(|p| p.id == pipeline_id)
			.ok_or_else(|| GitLabError::NotFound(format!("/pipelines/{pipeline_id}")))
	}

	fn pipeline_of(&self, job_id: JobId) -> Option<PipelineId> {
		self
			.pipelines
			.iter()
			.find(|p| p.job(job_id).is_some())
			.map(|p| p.id)
	}
}

/// Peak concurrency seen by [`FakeGitOpsClient`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeakUsage {
	pub calls: usize,
	pub projects: usize,
	pub pipelines_per_project: usize,
}

#[derive(Default)]
struct InFlight {
	calls: usize,
	projects: HashMap<ProjectId, usize>,
	pipelines: HashMap<(ProjectId, PipelineId), usize>,
	peak: PeakUsage,
}

impl InFlight {
	fn enter(&mut self, project_id: Option<ProjectId>, pipeline_id: Option<PipelineId>) {
		self.calls += 1;
		self.peak.calls = self.peak.calls.max(self.calls);

		let Some(project_id) = project_id else {
			return;
		};
		*self.projects.entry(project_id).or_default() += 1;
		self.peak.projects = self.peak.projects.max(self.projects.len());

		if let Some(pipeline_id) = pipeline_id {
			*self.pipelines.entry((project_id, pipeline_id)).or_default() += 1;
			let siblings = self.pipelines.keys().filter(|(p, _)| *p == project_id).count();
			self.peak.pipelines_per_project = self.peak.pipelines_per_project.max(siblings);
		}
	}

	fn leave(&mut self, project_id: Option<ProjectId>, pipeline_id: Option<PipelineId>) {
		self.calls -= 1;
		let Some(project_id) = project_id else {
			return;
		};
		release(&mut self.projects, project_id);
		if let Some(pipeline_id) = pipeline_id {
			release(&mut self.pipelines, (project_id, pipeline_id));
		}
	}
}

fn release<K: std::hash::Hash + Eq>(counts: &mut HashMap<K, usize>, key: K) {
	if let Some(count) = counts.get_mut(&key) {
		*count -= 1;
		if *count == 0 {
			counts.remove(&key);
		}
	}
}

struct CallGuard<'a> {
	in_flight: &'a Mutex<InFlight>,
	project_id: Option<ProjectId>,
	pipeline_id: Option<PipelineId>,
}

impl Drop for CallGuard<'_> {
	fn drop(&mut self) {
		self
			.in_flight
			.lock()
			.unwrap()
			.leave(self.project_id, self.pipeline_id);
	}
}

/// Upstream double backed by in-memory records.
#[derive(Default)]
pub struct FakeGitOpsClient {
	upstream: Mutex<Upstream>,
	latency: Option<Duration>,
	in_flight: Mutex<InFlight>,
	log_fetches: AtomicUsize,
	range_requests: AtomicUsize,
	file_reads: AtomicUsize,
	ci_fetches: AtomicUsize,
}

impl FakeGitOpsClient {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_project(self, project: Project) -> Self {
		self.upstream.lock().unwrap().projects.push(project);
		self
	}

	pub fn with_pipeline(self, pipeline: Pipeline) -> Self {
		self.upstream.lock().unwrap().pipelines.push(pipeline);
		self
	}

	pub fn with_log(self, job_id: JobId, log: &str) -> Self {
		self.upstream.lock().unwrap().logs.insert(job_id, log.to_string());
		self
	}

	/// Log fetches for `job_id` answer with a server error.
	pub fn with_failing_log(self, job_id: JobId) -> Self {
		self.upstream.lock().unwrap().failing_logs.insert(job_id);
		self
	}

	pub fn with_archive(self, job_id: JobId, archive: FakeArchive) -> Self {
		self.upstream.lock().unwrap().archives.insert(job_id, archive);
		self
	}

	pub fn with_ci_stages(self, project_id: ProjectId, stages: &[&str]) -> Self {
		self
			.upstream
			.lock()
			.unwrap()
			.ci_stages
			.insert(project_id, stages.iter().map(|s| s.to_string()).collect());
		self
	}

	pub fn with_failing_projects(self) -> Self {
		self.upstream.lock().unwrap().failing_projects = true;
		self
	}

	/// Detail reads of `pipeline_id` answer with a server error.
	pub fn with_failing_pipeline(self, pipeline_id: PipelineId) -> Self {
		self
			.upstream
			.lock()
			.unwrap()
			.failing_pipelines
			.insert(pipeline_id);
		self
	}

	/// Every call sleeps for `latency` before answering.
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = Some(latency);
		self
	}

	pub fn peak_usage(&self) -> PeakUsage {
		self.in_flight.lock().unwrap().peak
	}

	/// Replaces a pipeline already known upstream.
	pub fn update_pipeline(&self, pipeline: Pipeline) {
		let mut upstream = self.upstream.lock().unwrap();
		upstream.pipelines.retain(|p| p.id != pipeline.id);
		upstream.pipelines.push(pipeline);
	}

	pub fn log_fetches(&self) -> usize {
		self.log_fetches.load(Ordering::SeqCst)
	}

	pub fn range_requests(&self) -> usize {
		self.range_requests.load(Ordering::SeqCst)
	}

	pub fn file_reads(&self) -> usize {
		self.file_reads.load(Ordering::SeqCst)
	}

	pub fn ci_fetches(&self) -> usize {
		self.ci_fetches.load(Ordering::SeqCst)
	}

	fn server_error() -> GitLabError {
		GitLabError::Api {
			status: 500,
			message: "Internal Server Error".to_string(),
		}
	}

	/// Marks a call in flight for the lifetime of the guard, after the
	/// configured latency has elapsed.
	async fn call(&self, project_id: Option<ProjectId>, pipeline_id: Option<PipelineId>) -> CallGuard<'_> {
		self.in_flight.lock().unwrap().enter(project_id, pipeline_id);
		let guard = CallGuard {
			in_flight: &self.in_flight,
			project_id,
			pipeline_id,
		};
		if let Some(latency) = self.latency {
			tokio::time::sleep(latency).await;
		}
		guard
	}

	async fn job_call(&self, project_id: ProjectId, job_id: JobId) -> CallGuard<'_> {
		let pipeline_id = self.upstream.lock().unwrap().pipeline_of(job_id);
		self.call(Some(project_id), pipeline_id).await
	}
}

#[async_trait]
impl GitOpsClient for FakeGitOpsClient {
	async fn list_projects(&self, namespace: Option<&str>) -> Result<Vec<Project>> {
		let _call = self.call(None, None).await;
		let upstream = self.upstream.lock().unwrap();
		if upstream.failing_projects {
			return Err(Self::server_error());
		}
		Ok(upstream
			.projects
			.iter()
			.filter(|p| namespace.map_or(true, |ns| p.in_namespace(ns)))
			.cloned()
			.collect())
	}

	async fn list_pipelines(
		&self,
		project_id: ProjectId,
		ref_name: &str,
		updated_after: DateTime<Utc>,
	) -> Result<Vec<Pipeline>> {
		let _call = self.call(Some(project_id), None).await;
		let upstream = self.upstream.lock().unwrap();
		Ok(upstream
			.pipelines
			.iter()
			.filter(|p| {
				p.project_id == project_id && p.ref_name == ref_name && p.updated_at >= updated_after
			})
			.map(|p| Pipeline {
				jobs: Vec::new(),
				..p.clone()
			})
			.collect())
	}

	async fn fetch_pipeline(&self, project_id: ProjectId, pipeline_id: PipelineId) -> Result<Pipeline> {
		let _call = self.call(Some(project_id), Some(pipeline_id)).await;
		let upstream = self.upstream.lock().unwrap();
		let pipeline = upstream.pipeline(pipeline_id)?;
		Ok(Pipeline {
			jobs: Vec::new(),
			..pipeline.clone()
		})
	}

	async fn list_pipeline_jobs(
		&self,
		project_id: ProjectId,
		pipeline_id: PipelineId,
	) -> Result<Vec<Job>> {
		let _call = self.call(Some(project_id), Some(pipeline_id)).await;
		let upstream = self.upstream.lock().unwrap();
		Ok(upstream.pipeline(pipeline_id)?.jobs.clone())
	}

	async fn fetch_job_log(&self, project_id: ProjectId, job_id: JobId) -> Result<String> {
		let _call = self.job_call(project_id, job_id).await;
		self.log_fetches.fetch_add(1, Ordering::SeqCst);
		let upstream = self.upstream.lock().unwrap();
		if upstream.failing_logs.contains(&job_id) {
			return Err(Self::server_error());
		}
		upstream
			.logs
			.get(&job_id)
			.cloned()
			.ok_or_else(|| GitLabError::NotFound(format!("/jobs/{job_id}/trace")))
	}

	async fn fetch_job_artifact_metadata(
		&self,
		project_id: ProjectId,
		job_id: JobId,
	) -> Result<Option<JobArtifact>> {
		let _call = self.job_call(project_id, job_id).await;
		let upstream = self.upstream.lock().unwrap();
		Ok(upstream.archives.get(&job_id).map(|archive| JobArtifact {
			filename: "artifacts.zip".to_string(),
			size: archive.size(),
		}))
	}

	async fn fetch_artifact_range(
		&self,
		project_id: ProjectId,
		job_id: JobId,
		range: Range<u64>,
	) -> Result<Bytes> {
		let _call = self.job_call(project_id, job_id).await;
		self.range_requests.fetch_add(1, Ordering::SeqCst);
		let upstream = self.upstream.lock().unwrap();
		let archive = upstream
			.archives
			.get(&job_id)
			.ok_or_else(|| GitLabError::NotFound(format!("/jobs/{job_id}/artifacts")))?;
		let len = archive.bytes.len() as u64;
		let start = range.start.min(len) as usize;
		let end = range.end.min(len) as usize;
		Ok(Bytes::copy_from_slice(&archive.bytes[start..end]))
	}

	async fn fetch_artifact_file(
		&self,
		project_id: ProjectId,
		job_id: JobId,
		path: &str,
	) -> Result<Bytes> {
		let _call = self.job_call(project_id, job_id).await;
		self.file_reads.fetch_add(1, Ordering::SeqCst);
		let upstream = self.upstream.lock().unwrap();
		upstream
			.archives
			.get(&job_id)
			.and_then(|archive| archive.files.get(path))
			.map(|body| Bytes::copy_from_slice(body))
			.ok_or_else(|| GitLabError::NotFound(format!("/jobs/{job_id}/artifacts/{path}")))
	}

	async fn fetch_ci_stage_order(
		&self,
		project_id: ProjectId,
		_ref_name: &str,
	) -> Result<Option<Vec<String>>> {
		let _call = self.call(Some(project_id), None).await;
		self.ci_fetches.fetch_add(1, Ordering::SeqCst);
		Ok(self.upstream.lock().unwrap().ci_stages.get(&project_id).cloned())
	}
}

pub fn project(id: ProjectId, path: &str) -> Project {
	Project {
		id,
		name: path.rsplit('/').next().unwrap_or(path).to_string(),
		path: path.to_string(),
		web_url: format!("https://gitlab.example.com/{path}"),
		description: None,
		default_branch: Some("main".to_string()),
		last_activity_at: None,
		avatar_url: None,
	}
}

pub fn job(id: JobId, pipeline_id: PipelineId, stage: &str, status: PipelineStatus) -> Job {
	Job {
		id,
		pipeline_id,
		name: format!("{stage}-{id}"),
		stage: stage.to_string(),
		status,
		created_at: None,
		started_at: None,
		finished_at: None,
		duration: None,
		web_url: None,
		artifact: None,
	}
}

/// A job whose declared artifact is `archive`.
pub fn job_with_archive(
	id: JobId,
	pipeline_id: PipelineId,
	stage: &str,
	status: PipelineStatus,
	archive: &FakeArchive,
) -> Job {
	Job {
		artifact: Some(JobArtifact {
			filename: "artifacts.zip".to_string(),
			size: archive.size(),
		}),
		..job(id, pipeline_id, stage, status)
	}
}

/// A pipeline on `main`, updated now.
pub fn pipeline(
	id: PipelineId,
	project_id: ProjectId,
	status: PipelineStatus,
	jobs: Vec<Job>,
) -> Pipeline {
	let now = Utc::now();
	Pipeline {
		id,
		project_id,
		project_name: None,
		ref_name: "main".to_string(),
		status,
		sha: Some(format!("{id:040x}")),
		web_url: None,
		source: Some("push".to_string()),
		created_at: now,
		updated_at: now,
		started_at: None,
		finished_at: None,
		duration: None,
		jobs,
	}
}
