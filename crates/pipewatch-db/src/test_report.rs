// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipewatch_core::{JobId, PipelineId, TestReport};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::types::{parse_timestamp, timestamp, CachedTestReport};

#[async_trait]
pub trait TestReportStore: Send + Sync {
	async fn get_test_report(&self, job_id: JobId) -> Result<Option<CachedTestReport>>;
	async fn upsert_test_report(
		&self,
		job_id: JobId,
		pipeline_id: PipelineId,
		report: &TestReport,
		cached_at: DateTime<Utc>,
	) -> Result<()>;
	async fn delete_test_report(&self, job_id: JobId) -> Result<bool>;
	async fn delete_test_reports_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
	async fn delete_all_test_reports(&self) -> Result<u64>;
	async fn count_test_reports(&self) -> Result<u64>;
}

#[derive(Clone)]
pub struct TestReportRepository {
	pool: SqlitePool,
}

impl TestReportRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_test_report(&self, job_id: JobId) -> Result<Option<CachedTestReport>> {
		let row: Option<(i64, String, String)> = sqlx::query_as(
			"SELECT pipeline_id, document, cached_at FROM test_reports WHERE job_id = ?",
		)
		.bind(job_id)
		.fetch_optional(&self.pool)
		.await?;

		row
			.map(|(pipeline_id, document, cached_at)| {
				Ok(CachedTestReport {
					pipeline_id,
					report: serde_json::from_str(&document)?,
					cached_at: parse_timestamp(&cached_at)?,
				})
			})
			.transpose()
	}

	#[tracing::instrument(skip(self, report), fields(total = report.total, failed = report.failed))]
	pub async fn upsert_test_report(
		&self,
		job_id: JobId,
		pipeline_id: PipelineId,
		report: &TestReport,
		cached_at: DateTime<Utc>,
	) -> Result<()> {
		let document = serde_json::to_string(report)?;
		sqlx::query(
			r#"
			INSERT INTO test_reports (job_id, pipeline_id, document, cached_at)
			VALUES (?, ?, ?, ?)
			ON CONFLICT(job_id) DO UPDATE SET
				pipeline_id = excluded.pipeline_id,
				document = excluded.document,
				cached_at = excluded.cached_at
			"#,
		)
		.bind(job_id)
		.bind(pipeline_id)
		.bind(document)
		.bind(timestamp(cached_at))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_test_report(&self, job_id: JobId) -> Result<bool> {
		let result = sqlx::query("DELETE FROM test_reports WHERE job_id = ?")
			.bind(job_id)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_test_reports_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM test_reports WHERE cached_at < ?")
			.bind(timestamp(cutoff))
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_all_test_reports(&self) -> Result<u64> {
		let result = sqlx::query("DELETE FROM test_reports")
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	pub async fn count_test_reports(&self) -> Result<u64> {
		let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM test_reports")
			.fetch_one(&self.pool)
			.await?;
		Ok(count as u64)
	}
}

#[async_trait]
impl TestReportStore for TestReportRepository {
	async fn get_test_report(&self, job_id: JobId) -> Result<Option<CachedTestReport>> {
		self.get_test_report(job_id).await
	}

	async fn upsert_test_report(
		&self,
		job_id: JobId,
		pipeline_id: PipelineId,
		report: &TestReport,
		cached_at: DateTime<Utc>,
	) -> Result<()> {
		self.upsert_test_report(job_id, pipeline_id, report, cached_at)
			.await
	}

	async fn delete_test_report(&self, job_id: JobId) -> Result<bool> {
		self.delete_test_report(job_id).await
	}

	async fn delete_test_reports_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		self.delete_test_reports_before(cutoff).await
	}

	async fn delete_all_test_reports(&self) -> Result<u64> {
		self.delete_all_test_reports().await
	}

	async fn count_test_reports(&self) -> Result<u64> {
		self.count_test_reports().await
	}
}
