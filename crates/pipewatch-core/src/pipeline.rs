// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::project::ProjectId;

pub type PipelineId = i64;
pub type JobId = i64;

/// Status of a pipeline or job.
///
/// The five statuses the sync policy reasons about are named variants. Anything
/// else the platform reports (`created`, `manual`, `skipped`, ...) is kept
/// verbatim in `Other` so an unfamiliar status never fails decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PipelineStatus {
	Pending,
	Running,
	Success,
	Failed,
	Canceled,
	Other(String),
}

impl PipelineStatus {
	pub fn as_str(&self) -> &str {
		match self {
			PipelineStatus::Pending => "pending",
			PipelineStatus::Running => "running",
			PipelineStatus::Success => "success",
			PipelineStatus::Failed => "failed",
			PipelineStatus::Canceled => "canceled",
			PipelineStatus::Other(s) => s,
		}
	}

	/// Success, failed and canceled never change again.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			PipelineStatus::Success | PipelineStatus::Failed | PipelineStatus::Canceled
		)
	}
}

impl From<&str> for PipelineStatus {
	fn from(s: &str) -> Self {
		match s.to_ascii_lowercase().as_str() {
			"pending" => PipelineStatus::Pending,
			"running" => PipelineStatus::Running,
			"success" => PipelineStatus::Success,
			"failed" => PipelineStatus::Failed,
			"canceled" | "cancelled" => PipelineStatus::Canceled,
			other => PipelineStatus::Other(other.to_string()),
		}
	}
}

impl From<String> for PipelineStatus {
	fn from(s: String) -> Self {
		PipelineStatus::from(s.as_str())
	}
}

impl From<PipelineStatus> for String {
	fn from(status: PipelineStatus) -> Self {
		match status {
			PipelineStatus::Other(s) => s,
			known => known.as_str().to_string(),
		}
	}
}

impl fmt::Display for PipelineStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The archive a job declared as its artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobArtifact {
	pub filename: String,
	pub size: u64,
}

/// A job, always embedded in its pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
	pub id: JobId,
	pub pipeline_id: PipelineId,
	pub name: String,
	pub stage: String,
	pub status: PipelineStatus,
	#[serde(default)]
	pub created_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub started_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub finished_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub duration: Option<f64>,
	#[serde(default)]
	pub web_url: Option<String>,
	#[serde(default)]
	pub artifact: Option<JobArtifact>,
}

impl Job {
	/// Declared artifact size in bytes, zero when the job has no artifact.
	pub fn artifact_size(&self) -> u64 {
		self.artifact.as_ref().map(|a| a.size).unwrap_or(0)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
	pub id: PipelineId,
	pub project_id: ProjectId,
	#[serde(default)]
	pub project_name: Option<String>,
	#[serde(rename = "ref")]
	pub ref_name: String,
	pub status: PipelineStatus,
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
	#[serde(default)]
	pub jobs: Vec<Job>,
}

impl Pipeline {
	pub fn job(&self, job_id: JobId) -> Option<&Job> {
		self.jobs.iter().find(|j| j.id == job_id)
	}

	/// Distinct job stages in the order they first appear.
	pub fn stages(&self) -> Vec<&str> {
		let mut stages: Vec<&str> = Vec::new();
		for job in &self.jobs {
			if !stages.contains(&job.stage.as_str()) {
				stages.push(&job.stage);
			}
		}
		stages
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_roundtrips_known_and_unknown_values() {
		for raw in ["pending", "running", "success", "failed", "canceled", "manual"] {
			let status = PipelineStatus::from(raw);
			assert_eq!(String::from(status), raw);
		}
		assert_eq!(PipelineStatus::from("cancelled"), PipelineStatus::Canceled);
		assert_eq!(PipelineStatus::from("SUCCESS"), PipelineStatus::Success);
	}

	#[test]
	fn only_finished_statuses_are_terminal() {
		assert!(PipelineStatus::Success.is_terminal());
		assert!(PipelineStatus::Failed.is_terminal());
		assert!(PipelineStatus::Canceled.is_terminal());
		assert!(!PipelineStatus::Running.is_terminal());
		assert!(!PipelineStatus::Pending.is_terminal());
		assert!(!PipelineStatus::Other("skipped".to_string()).is_terminal());
	}

	#[test]
	fn pipeline_serializes_ref_field_name() {
		let pipeline = Pipeline {
			id: 7,
			project_id: 1,
			project_name: None,
			ref_name: "main".to_string(),
			status: PipelineStatus::Success,
			sha: None,
			web_url: None,
			source: None,
			created_at: Utc::now(),
			updated_at: Utc::now(),
			started_at: None,
			finished_at: None,
			duration: None,
			jobs: Vec::new(),
		};
		let json = serde_json::to_value(&pipeline).unwrap();
		assert_eq!(json["ref"], "main");
		assert_eq!(json["status"], "success");
	}

	#[test]
	fn stages_are_distinct_in_first_seen_order() {
		let job = |id: i64, stage: &str| Job {
			id,
			pipeline_id: 7,
			name: format!("job-{id}"),
			stage: stage.to_string(),
			status: PipelineStatus::Success,
			created_at: None,
			started_at: None,
			finished_at: None,
			duration: None,
			web_url: None,
			artifact: None,
		};
		let pipeline = Pipeline {
			id: 7,
			project_id: 1,
			project_name: None,
			ref_name: "main".to_string(),
			status: PipelineStatus::Running,
			sha: None,
			web_url: None,
			source: None,
			created_at: Utc::now(),
			updated_at: Utc::now(),
			started_at: None,
			finished_at: None,
			duration: None,
			jobs: vec![job(1, "build"), job(2, "test"), job(3, "build"), job(4, "deploy")],
		};
		assert_eq!(pipeline.stages(), vec!["build", "test", "deploy"]);
		assert_eq!(pipeline.job(3).map(|j| j.name.as_str()), Some("job-3"));
		assert!(pipeline.job(99).is_none());
	}
}
