// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{JobId, PipelineId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
	Error,
	Warning,
}

/// A log line that matched a failure signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAnnotation {
	/// 1-based.
	pub line_number: usize,
	pub content: String,
	pub severity: Severity,
}

/// A job log with its annotations, keyed by job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedLog {
	pub job_id: JobId,
	pub pipeline_id: PipelineId,
	pub raw_log: String,
	pub annotations: Vec<LogAnnotation>,
	pub processed_at: DateTime<Utc>,
}

impl ProcessedLog {
	pub fn error_count(&self) -> usize {
		self
			.annotations
			.iter()
			.filter(|a| a.severity == Severity::Error)
			.count()
	}
}
