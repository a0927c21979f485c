// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! TTL view over the derived-data tables.
//!
//! Artifact listings and test reports expire `ttl` after they were written: a
//! read at or past that point is a miss even though the row still exists, and
//! the caller regenerates the value. Processed logs never expire because a
//! finished job's log never changes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pipewatch_core::{ArtifactIndexEntry, JobId, PipelineId, ProcessedLog, TestReport};
use pipewatch_db::{
	ArtifactIndexStore, CacheCounts, CachedTestReport, ProcessedLogStore, Stores, TestReportStore,
};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::Result;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
	Listing { job_id: JobId, path: String },
	/// Every listing of a job, root included.
	Artifacts(JobId),
	TestReport(JobId),
	Log(JobId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
	pub artifact_listings: u64,
	pub test_reports: u64,
}

#[derive(Clone)]
pub struct ArtifactCache {
	listings: Arc<dyn ArtifactIndexStore>,
	test_reports: Arc<dyn TestReportStore>,
	logs: Arc<dyn ProcessedLogStore>,
	ttl: chrono::Duration,
	clock: Arc<dyn Clock>,
}

impl ArtifactCache {
	pub fn new(stores: &Stores, ttl: Duration) -> Self {
		Self {
			listings: Arc::clone(&stores.artifact_index),
			test_reports: Arc::clone(&stores.test_reports),
			logs: Arc::clone(&stores.logs),
			ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
			clock: Arc::new(SystemClock),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn now(&self) -> DateTime<Utc> {
		self.clock.now()
	}

	fn is_fresh(&self, cached_at: DateTime<Utc>) -> bool {
		self.clock.now() - cached_at < self.ttl
	}

	#[instrument(skip(self))]
	pub async fn get_listing(&self, job_id: JobId, path: &str) -> Result<Option<ArtifactIndexEntry>> {
		let entry = self.listings.get_listing(job_id, path).await?;
		Ok(entry.filter(|e| {
			let fresh = self.is_fresh(e.cached_at);
			if !fresh {
				debug!(cached_at = %e.cached_at, "Artifact listing expired");
			}
			fresh
		}))
	}

	pub async fn put_listing(&self, entry: &ArtifactIndexEntry) -> Result<()> {
		self.listings.put_listing(entry).await?;
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn get_test_report(&self, job_id: JobId) -> Result<Option<CachedTestReport>> {
		let cached = self.test_reports.get_test_report(job_id).await?;
		Ok(cached.filter(|c| self.is_fresh(c.cached_at)))
	}

	pub async fn put_test_report(
		&self,
		job_id: JobId,
		pipeline_id: PipelineId,
		report: &TestReport,
	) -> Result<()> {
		self
			.test_reports
			.upsert_test_report(job_id, pipeline_id, report, self.clock.now())
			.await?;
		Ok(())
	}

	pub async fn get_log(&self, job_id: JobId) -> Result<Option<ProcessedLog>> {
		Ok(self.logs.get_processed_log(job_id).await?)
	}

	pub async fn put_log(&self, log: &ProcessedLog) -> Result<()> {
		self.logs.upsert_processed_log(log).await?;
		Ok(())
	}

	/// Returns true if anything was removed.
	#[instrument(skip(self))]
	pub async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
		let removed = match key {
			CacheKey::Listing { job_id, path } => self.listings.delete_listing(*job_id, path).await?,
			CacheKey::Artifacts(job_id) => self.listings.delete_listings_for_job(*job_id).await? > 0,
			CacheKey::TestReport(job_id) => self.test_reports.delete_test_report(*job_id).await?,
			CacheKey::Log(job_id) => self.logs.delete_processed_log(*job_id).await?,
		};
		Ok(removed)
	}

	/// Clears all three kinds; returns how many entries of each were removed.
	#[instrument(skip(self))]
	pub async fn invalidate_all(&self) -> Result<CacheCounts> {
		let removed = CacheCounts {
			artifact_listings: self.listings.delete_all_listings().await?,
			test_reports: self.test_reports.delete_all_test_reports().await?,
			processed_logs: self.logs.delete_all_processed_logs().await?,
		};
		info!(
			artifact_listings = removed.artifact_listings,
			test_reports = removed.test_reports,
			processed_logs = removed.processed_logs,
			"Cache cleared"
		);
		Ok(removed)
	}

	/// Deletes expired listings and test reports.
	#[instrument(skip(self))]
	pub async fn prune(&self) -> Result<PruneReport> {
		let cutoff = self.clock.now() - self.ttl;
		let report = PruneReport {
			artifact_listings: self.listings.delete_listings_before(cutoff).await?,
			test_reports: self.test_reports.delete_test_reports_before(cutoff).await?,
		};
		debug!(
			artifact_listings = report.artifact_listings,
			test_reports = report.test_reports,
			"Pruned expired cache entries"
		);
		Ok(report)
	}

	pub async fn stats(&self) -> Result<CacheCounts> {
		Ok(CacheCounts {
			artifact_listings: self.listings.count_listings().await?,
			test_reports: self.test_reports.count_test_reports().await?,
			processed_logs: self.logs.count_processed_logs().await?,
		})
	}
}
