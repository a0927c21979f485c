// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, SecondsFormat, Utc};
use pipewatch_core::{PipelineId, ProjectId, TestReport};
use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

pub const DEFAULT_PIPELINE_LIMIT: u32 = 50;
pub const MAX_PIPELINE_LIMIT: u32 = 200;

/// Query over stored pipelines. Results are newest `created_at` first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineFilter {
	pub project_id: Option<ProjectId>,
	pub ref_name: Option<String>,
	pub status: Option<String>,
	pub limit: Option<u32>,
}

impl PipelineFilter {
	pub fn effective_limit(&self) -> u32 {
		self.limit
			.unwrap_or(DEFAULT_PIPELINE_LIMIT)
			.clamp(1, MAX_PIPELINE_LIMIT)
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
	pub total: u64,
	pub success: u64,
	pub failed: u64,
	pub running: u64,
	pub pending: u64,
	/// Percentage of successful pipelines, two decimals.
	pub success_rate: f64,
}

impl PipelineStats {
	pub fn from_counts(total: u64, success: u64, failed: u64, running: u64, pending: u64) -> Self {
		let success_rate = if total == 0 {
			0.0
		} else {
			(success as f64 / total as f64 * 10_000.0).round() / 100.0
		};
		Self {
			total,
			success,
			failed,
			running,
			pending,
			success_rate,
		}
	}
}

/// A stored test report with the time it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTestReport {
	pub pipeline_id: PipelineId,
	pub report: TestReport,
	pub cached_at: DateTime<Utc>,
}

/// Entry counts of the derived-data tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCounts {
	pub artifact_listings: u64,
	pub test_reports: u64,
	pub processed_logs: u64,
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
	at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(raw)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Corrupt(format!("invalid timestamp '{raw}': {e}")))
}
