// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire shapes of the GitLab v4 API. Only the fields pipewatch keeps are
//! declared; everything else in a response is dropped while decoding.

use chrono::{DateTime, Utc};
use pipewatch_core::{Job, JobArtifact, Pipeline, PipelineId, PipelineStatus, Project, ProjectId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct ApiProject {
	id: ProjectId,
	name: String,
	path_with_namespace: String,
	web_url: String,
	#[serde(default)]
	description: Option<String>,
	#[serde(default)]
	default_branch: Option<String>,
	#[serde(default)]
	last_activity_at: Option<DateTime<Utc>>,
	#[serde(default)]
	avatar_url: Option<String>,
}

impl From<ApiProject> for Project {
	fn from(p: ApiProject) -> Self {
		Project {
			id: p.id,
			name: p.name,
			path: p.path_with_namespace,
			web_url: p.web_url,
			description: p.description,
			default_branch: p.default_branch,
			last_activity_at: p.last_activity_at,
			avatar_url: p.avatar_url,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiPipeline {
	pub id: PipelineId,
	pub project_id: ProjectId,
	pub status: String,
	#[serde(rename = "ref")]
	pub ref_name: String,
	#[serde(default)]
	pub sha: Option<String>,
	#[serde(default)]
	pub web_url: Option<String>,
	#[serde(default)]
	pub source: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	#[serde(default)]
	pub started_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub finished_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub duration: Option<f64>,
}

impl ApiPipeline {
	pub fn into_pipeline(self, jobs: Vec<ApiJob>) -> Pipeline {
		let pipeline_id = self.id;
		Pipeline {
			id: self.id,
			project_id: self.project_id,
			project_name: None,
			ref_name: self.ref_name,
			status: PipelineStatus::from(self.status),
			sha: self.sha,
			web_url: self.web_url,
			source: self.source,
			created_at: self.created_at,
			updated_at: self.updated_at,
			started_at: self.started_at,
			finished_at: self.finished_at,
			duration: self.duration,
			jobs: jobs.into_iter().map(|j| j.into_job(pipeline_id)).collect(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiArtifactFile {
	filename: String,
	#[serde(default)]
	size: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiArtifact {
	#[serde(default)]
	file_type: Option<String>,
	#[serde(default)]
	filename: Option<String>,
	#[serde(default)]
	size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiJob {
	id: i64,
	name: String,
	stage: String,
	status: String,
	#[serde(default)]
	created_at: Option<DateTime<Utc>>,
	#[serde(default)]
	started_at: Option<DateTime<Utc>>,
	#[serde(default)]
	finished_at: Option<DateTime<Utc>>,
	#[serde(default)]
	duration: Option<f64>,
	#[serde(default)]
	web_url: Option<String>,
	#[serde(default)]
	artifacts_file: Option<ApiArtifactFile>,
	#[serde(default)]
	artifacts: Vec<ApiArtifact>,
}

impl ApiJob {
	/// The job's archive artifact, if it produced one.
	pub fn artifact(&self) -> Option<JobArtifact> {
		if let Some(file) = &self.artifacts_file {
			return Some(JobArtifact {
				filename: file.filename.clone(),
				size: file.size,
			});
		}
		self
			.artifacts
			.iter()
			.find(|a| a.file_type.as_deref() == Some("archive"))
			.map(|a| JobArtifact {
				filename: a.filename.clone().unwrap_or_else(|| "artifacts.zip".to_string()),
				size: a.size.unwrap_or(0),
			})
	}

	pub fn into_job(self, pipeline_id: PipelineId) -> Job {
		let artifact = self.artifact();
		Job {
			id: self.id,
			pipeline_id,
			name: self.name,
			stage: self.stage,
			status: PipelineStatus::from(self.status),
			created_at: self.created_at,
			started_at: self.started_at,
			finished_at: self.finished_at,
			duration: self.duration,
			web_url: self.web_url,
			artifact,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn job_decodes_and_drops_unknown_fields() {
		let job: ApiJob = serde_json::from_value(serde_json::json!({
			"id": 7,
			"name": "unit",
			"stage": "test",
			"status": "success",
			"duration": 12.5,
			"runner": {"id": 1, "description": "shared"},
			"artifacts_file": {"filename": "artifacts.zip", "size": 2048},
			"artifacts": [{"file_type": "archive", "size": 2048, "filename": "artifacts.zip"}]
		}))
		.unwrap();

		let job = job.into_job(3);
		assert_eq!(job.pipeline_id, 3);
		assert_eq!(job.status, PipelineStatus::Success);
		assert_eq!(
			job.artifact,
			Some(JobArtifact {
				filename: "artifacts.zip".to_string(),
				size: 2048
			})
		);
	}

	#[test]
	fn archive_entry_is_used_without_artifacts_file() {
		let job: ApiJob = serde_json::from_value(serde_json::json!({
			"id": 8,
			"name": "lint",
			"stage": "test",
			"status": "manual",
			"artifacts": [
				{"file_type": "trace", "size": 10, "filename": "job.log"},
				{"file_type": "archive", "size": 99, "filename": "out.zip"}
			]
		}))
		.unwrap();

		assert_eq!(job.artifact().map(|a| a.size), Some(99));
		assert_eq!(
			job.into_job(1).status,
			PipelineStatus::Other("manual".to_string())
		);
	}

	#[test]
	fn job_without_artifacts_has_none() {
		let job: ApiJob = serde_json::from_value(serde_json::json!({
			"id": 9, "name": "deploy", "stage": "deploy", "status": "created"
		}))
		.unwrap();
		assert!(job.artifact().is_none());
	}
}
