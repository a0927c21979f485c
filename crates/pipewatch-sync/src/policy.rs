// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use pipewatch_core::{Job, PipelineStatus};

/// Decides which post-processing a job gets during a sync pass.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
	test_stages: Vec<String>,
}

impl SyncPolicy {
	pub fn new(test_stages: Vec<String>) -> Self {
		Self { test_stages }
	}

	pub fn is_test_stage(&self, stage: &str) -> bool {
		self
			.test_stages
			.iter()
			.any(|s| s.eq_ignore_ascii_case(stage))
	}

	/// Logs of finished jobs never change, so they are captured once.
	pub fn captures_log(&self, job: &Job) -> bool {
		job.status.is_terminal()
	}

	pub fn indexes_artifacts(&self, job: &Job) -> bool {
		job.artifact_size() > 0
	}

	pub fn aggregates_tests(&self, job: &Job) -> bool {
		matches!(job.status, PipelineStatus::Success | PipelineStatus::Failed)
			&& self.is_test_stage(&job.stage)
			&& self.indexes_artifacts(job)
	}
}
