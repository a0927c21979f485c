// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GitLab v4 REST client.

use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use pipewatch_config::{GitLabConfig, SecretString};
use pipewatch_core::{Job, JobArtifact, JobId, Pipeline, PipelineId, Project, ProjectId};
use reqwest::header::RANGE;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, trace};

use crate::ci::parse_stage_order;
use crate::error::{GitLabError, Result};
use crate::types::{ApiJob, ApiPipeline, ApiProject};

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const NEXT_PAGE_HEADER: &str = "x-next-page";
const PER_PAGE: &str = "100";
const MAX_PAGES: u32 = 50;
const CI_DEFINITION_FILE: &str = ".gitlab-ci.yml";

/// Everything pipewatch reads from the upstream CI platform.
#[async_trait]
pub trait GitOpsClient: Send + Sync {
	/// Projects visible to the token, restricted to `namespace` when given.
	async fn list_projects(&self, namespace: Option<&str>) -> Result<Vec<Project>>;

	/// Summaries of the pipelines on `ref_name` updated after `updated_after`,
	/// newest first. Their `jobs` are empty.
	async fn list_pipelines(
		&self,
		project_id: ProjectId,
		ref_name: &str,
		updated_after: DateTime<Utc>,
	) -> Result<Vec<Pipeline>>;

	/// Full detail of one pipeline, without its jobs.
	async fn fetch_pipeline(&self, project_id: ProjectId, pipeline_id: PipelineId) -> Result<Pipeline>;

	async fn list_pipeline_jobs(
		&self,
		project_id: ProjectId,
		pipeline_id: PipelineId,
	) -> Result<Vec<Job>>;

	async fn fetch_job_log(&self, project_id: ProjectId, job_id: JobId) -> Result<String>;

	async fn fetch_job_artifact_metadata(
		&self,
		project_id: ProjectId,
		job_id: JobId,
	) -> Result<Option<JobArtifact>>;

	/// Bytes `range` (end exclusive) of a job's artifact archive.
	async fn fetch_artifact_range(
		&self,
		project_id: ProjectId,
		job_id: JobId,
		range: Range<u64>,
	) -> Result<Bytes>;

	/// One file from inside a job's artifact archive.
	async fn fetch_artifact_file(
		&self,
		project_id: ProjectId,
		job_id: JobId,
		path: &str,
	) -> Result<Bytes>;

	/// Stage order declared by the project's CI definition on `ref_name`.
	async fn fetch_ci_stage_order(
		&self,
		project_id: ProjectId,
		ref_name: &str,
	) -> Result<Option<Vec<String>>>;
}

#[derive(Debug, Clone)]
pub struct GitLabClient {
	http_client: Client,
	base_url: Url,
	token: Option<SecretString>,
}

impl GitLabClient {
	pub fn new(base_url: &str, token: Option<SecretString>, timeout: Duration) -> Result<Self> {
		let base_url =
			Url::parse(base_url).map_err(|e| GitLabError::InvalidUrl(format!("{base_url}: {e}")))?;
		if base_url.cannot_be_a_base() {
			return Err(GitLabError::InvalidUrl(base_url.to_string()));
		}

		let http_client = pipewatch_common_http::new_client_with_timeout(timeout)?;

		Ok(Self {
			http_client,
			base_url,
			token,
		})
	}

	pub fn from_config(config: &GitLabConfig) -> Result<Self> {
		Self::new(
			&config.base_url,
			config.token.clone(),
			Duration::from_secs(config.request_timeout_secs),
		)
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	fn endpoint<I>(&self, segments: I) -> Result<Url>
	where
		I: IntoIterator,
		I::Item: AsRef<str>,
	{
		let mut url = self.base_url.clone();
		url
			.path_segments_mut()
			.map_err(|_| GitLabError::InvalidUrl(self.base_url.to_string()))?
			.pop_if_empty()
			.extend(["api", "v4"])
			.extend(segments);
		Ok(url)
	}

	async fn send(&self, request: RequestBuilder) -> Result<Response> {
		let request = match &self.token {
			Some(token) => request.header(TOKEN_HEADER, token.expose()),
			None => request,
		};

		let response = request.send().await.map_err(|e| {
			if e.is_timeout() {
				error!("Request timed out");
				return GitLabError::Timeout;
			}
			error!(error = %e, "Network error during GitLab request");
			GitLabError::Network(e)
		})?;

		let status = response.status();
		debug!(status = %status, path = %response.url().path(), "Received response from GitLab");

		if status.is_success() {
			return Ok(response);
		}

		let status_code = status.as_u16();
		let path = response.url().path().to_string();
		let body = response.text().await.unwrap_or_default();

		match status {
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
				error!(status = status_code, "Unauthorized request");
				Err(GitLabError::Unauthorized)
			}
			StatusCode::NOT_FOUND => {
				debug!(path = %path, "Resource not found");
				Err(GitLabError::NotFound(path))
			}
			StatusCode::TOO_MANY_REQUESTS => {
				error!(status = status_code, "Rate limit exceeded");
				Err(GitLabError::RateLimited)
			}
			_ => {
				error!(status = status_code, body = %body, "GitLab API error");
				Err(GitLabError::Api {
					status: status_code,
					message: body,
				})
			}
		}
	}

	async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
		let body = response.text().await.map_err(|e| {
			error!(error = %e, "Failed to read response body");
			GitLabError::Network(e)
		})?;

		serde_json::from_str(&body).map_err(|e| {
			error!(error = %e, "Failed to parse GitLab response");
			GitLabError::InvalidResponse(format!("JSON parse error: {e}"))
		})
	}

	async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
		let response = self.send(self.http_client.get(url)).await?;
		Self::decode(response).await
	}

	/// Follows `X-Next-Page` until the last page.
	async fn get_paginated<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
		let mut items = Vec::new();
		let mut page = 1u32;

		loop {
			let mut page_url = url.clone();
			page_url
				.query_pairs_mut()
				.append_pair("per_page", PER_PAGE)
				.append_pair("page", &page.to_string());

			let response = self.send(self.http_client.get(page_url)).await?;
			let next_page = response
				.headers()
				.get(NEXT_PAGE_HEADER)
				.and_then(|v| v.to_str().ok())
				.and_then(|v| v.trim().parse::<u32>().ok());

			let batch: Vec<T> = Self::decode(response).await?;
			trace!(page, count = batch.len(), "Fetched page");
			let exhausted = batch.is_empty();
			items.extend(batch);

			match next_page {
				Some(next) if next > page && !exhausted && page < MAX_PAGES => page = next,
				_ => break,
			}
		}

		Ok(items)
	}

	fn pipeline_endpoint(
		&self,
		project_id: ProjectId,
		pipeline_id: PipelineId,
		rest: &[&str],
	) -> Result<Url> {
		let project = project_id.to_string();
		let pipeline = pipeline_id.to_string();
		let mut segments = vec!["projects", project.as_str(), "pipelines", pipeline.as_str()];
		segments.extend_from_slice(rest);
		self.endpoint(segments)
	}

	fn job_endpoint(&self, project_id: ProjectId, job_id: JobId, rest: &[&str]) -> Result<Url> {
		let project = project_id.to_string();
		let job = job_id.to_string();
		let mut segments = vec!["projects", project.as_str(), "jobs", job.as_str()];
		segments.extend_from_slice(rest);
		self.endpoint(segments)
	}
}

#[async_trait]
impl GitOpsClient for GitLabClient {
	#[instrument(skip(self))]
	async fn list_projects(&self, namespace: Option<&str>) -> Result<Vec<Project>> {
		let namespace = namespace
			.map(|ns| ns.trim_matches('/'))
			.filter(|ns| !ns.is_empty());

		let mut url = match namespace {
			Some(ns) => {
				let mut url = self.endpoint(["groups", ns, "projects"])?;
				url.query_pairs_mut().append_pair("include_subgroups", "true");
				url
			}
			None => {
				let mut url = self.endpoint(["projects"])?;
				url.query_pairs_mut().append_pair("membership", "true");
				url
			}
		};
		url.query_pairs_mut().append_pair("archived", "false");

		let projects: Vec<ApiProject> = self.get_paginated(url).await?;
		let projects: Vec<Project> = projects
			.into_iter()
			.map(Project::from)
			.filter(|p| namespace.map_or(true, |ns| p.in_namespace(ns)))
			.collect();

		debug!(count = projects.len(), "Listed projects");
		Ok(projects)
	}

	#[instrument(skip(self, updated_after), fields(updated_after = %updated_after))]
	async fn list_pipelines(
		&self,
		project_id: ProjectId,
		ref_name: &str,
		updated_after: DateTime<Utc>,
	) -> Result<Vec<Pipeline>> {
		let mut url = self.endpoint(["projects", project_id.to_string().as_str(), "pipelines"])?;
		url
			.query_pairs_mut()
			.append_pair("ref", ref_name)
			.append_pair(
				"updated_after",
				&updated_after.to_rfc3339_opts(SecondsFormat::Secs, true),
			)
			.append_pair("order_by", "updated_at")
			.append_pair("sort", "desc");

		let summaries: Vec<ApiPipeline> = self.get_paginated(url).await?;
		debug!(count = summaries.len(), "Listed pipeline summaries");
		Ok(summaries
			.into_iter()
			.map(|summary| summary.into_pipeline(Vec::new()))
			.collect())
	}

	#[instrument(skip(self))]
	async fn fetch_pipeline(&self, project_id: ProjectId, pipeline_id: PipelineId) -> Result<Pipeline> {
		let url = self.pipeline_endpoint(project_id, pipeline_id, &[])?;
		let detail: ApiPipeline = self.get_json(url).await?;
		Ok(detail.into_pipeline(Vec::new()))
	}

	#[instrument(skip(self))]
	async fn list_pipeline_jobs(
		&self,
		project_id: ProjectId,
		pipeline_id: PipelineId,
	) -> Result<Vec<Job>> {
		let url = self.pipeline_endpoint(project_id, pipeline_id, &["jobs"])?;
		let jobs: Vec<ApiJob> = self.get_paginated(url).await?;
		trace!(count = jobs.len(), "Listed pipeline jobs");
		Ok(jobs.into_iter().map(|job| job.into_job(pipeline_id)).collect())
	}

	#[instrument(skip(self))]
	async fn fetch_job_log(&self, project_id: ProjectId, job_id: JobId) -> Result<String> {
		let url = self.job_endpoint(project_id, job_id, &["trace"])?;
		let response = self.send(self.http_client.get(url)).await?;
		let log = response.text().await.map_err(GitLabError::Network)?;
		debug!(bytes = log.len(), "Fetched job log");
		Ok(log)
	}

	#[instrument(skip(self))]
	async fn fetch_job_artifact_metadata(
		&self,
		project_id: ProjectId,
		job_id: JobId,
	) -> Result<Option<JobArtifact>> {
		let url = self.job_endpoint(project_id, job_id, &[])?;
		let job: ApiJob = self.get_json(url).await?;
		Ok(job.artifact())
	}

	#[instrument(skip(self, range), fields(start = range.start, end = range.end))]
	async fn fetch_artifact_range(
		&self,
		project_id: ProjectId,
		job_id: JobId,
		range: Range<u64>,
	) -> Result<Bytes> {
		if range.is_empty() {
			return Ok(Bytes::new());
		}

		let url = self.job_endpoint(project_id, job_id, &["artifacts"])?;
		let request = self
			.http_client
			.get(url)
			.header(RANGE, format!("bytes={}-{}", range.start, range.end - 1));

		let response = self.send(request).await?;
		let status = response.status();
		let body = response.bytes().await.map_err(GitLabError::Network)?;

		if status == StatusCode::PARTIAL_CONTENT {
			trace!(bytes = body.len(), "Received partial content");
			return Ok(body);
		}

		debug!(bytes = body.len(), "Upstream ignored range request, slicing full body");
		let len = body.len() as u64;
		let start = range.start.min(len) as usize;
		let end = range.end.min(len) as usize;
		Ok(body.slice(start..end))
	}

	#[instrument(skip(self))]
	async fn fetch_artifact_file(
		&self,
		project_id: ProjectId,
		job_id: JobId,
		path: &str,
	) -> Result<Bytes> {
		let mut rest = vec!["artifacts"];
		rest.extend(path.split('/').filter(|s| !s.is_empty()));
		let url = self.job_endpoint(project_id, job_id, &rest)?;

		let response = self.send(self.http_client.get(url)).await?;
		response.bytes().await.map_err(GitLabError::Network)
	}

	#[instrument(skip(self))]
	async fn fetch_ci_stage_order(
		&self,
		project_id: ProjectId,
		ref_name: &str,
	) -> Result<Option<Vec<String>>> {
		let mut url = self.endpoint([
			"projects",
			project_id.to_string().as_str(),
			"repository",
			"files",
			CI_DEFINITION_FILE,
			"raw",
		])?;
		url.query_pairs_mut().append_pair("ref", ref_name);

		let response = match self.send(self.http_client.get(url)).await {
			Ok(response) => response,
			Err(e) if e.is_not_found() => return Ok(None),
			Err(e) => return Err(e),
		};
		let yaml = response.text().await.map_err(GitLabError::Network)?;
		Ok(parse_stage_order(&yaml))
	}
}
