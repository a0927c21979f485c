// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use pipewatch_core::{JobId, PipelineId, ProcessedLog};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::types::timestamp;

#[async_trait]
pub trait ProcessedLogStore: Send + Sync {
	async fn get_processed_log(&self, job_id: JobId) -> Result<Option<ProcessedLog>>;
	async fn upsert_processed_log(&self, log: &ProcessedLog) -> Result<()>;
	async fn list_processed_logs(&self, pipeline_id: PipelineId) -> Result<Vec<ProcessedLog>>;
	async fn delete_processed_log(&self, job_id: JobId) -> Result<bool>;
	async fn delete_all_processed_logs(&self) -> Result<u64>;
	async fn count_processed_logs(&self) -> Result<u64>;
}

#[derive(Clone)]
pub struct ProcessedLogRepository {
	pool: SqlitePool,
}

impl ProcessedLogRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_processed_log(&self, job_id: JobId) -> Result<Option<ProcessedLog>> {
		let row: Option<(String,)> =
			sqlx::query_as("SELECT document FROM processed_logs WHERE job_id = ?")
				.bind(job_id)
				.fetch_optional(&self.pool)
				.await?;

		row
			.map(|(document,)| serde_json::from_str(&document).map_err(Into::into))
			.transpose()
	}

	#[tracing::instrument(skip(self, log), fields(job_id = log.job_id, annotations = log.annotations.len()))]
	pub async fn upsert_processed_log(&self, log: &ProcessedLog) -> Result<()> {
		let document = serde_json::to_string(log)?;
		sqlx::query(
			r#"
			INSERT INTO processed_logs (job_id, pipeline_id, document, processed_at)
			VALUES (?, ?, ?, ?)
			ON CONFLICT(job_id) DO UPDATE SET
				pipeline_id = excluded.pipeline_id,
				document = excluded.document,
				processed_at = excluded.processed_at
			"#,
		)
		.bind(log.job_id)
		.bind(log.pipeline_id)
		.bind(document)
		.bind(timestamp(log.processed_at))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_processed_logs(&self, pipeline_id: PipelineId) -> Result<Vec<ProcessedLog>> {
		let rows: Vec<(String,)> = sqlx::query_as(
			"SELECT document FROM processed_logs WHERE pipeline_id = ? ORDER BY job_id",
		)
		.bind(pipeline_id)
		.fetch_all(&self.pool)
		.await?;

		rows
			.into_iter()
			.map(|(document,)| serde_json::from_str(&document).map_err(Into::into))
			.collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_processed_log(&self, job_id: JobId) -> Result<bool> {
		let result = sqlx::query("DELETE FROM processed_logs WHERE job_id = ?")
			.bind(job_id)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_all_processed_logs(&self) -> Result<u64> {
		let result = sqlx::query("DELETE FROM processed_logs")
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	pub async fn count_processed_logs(&self) -> Result<u64> {
		let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM processed_logs")
			.fetch_one(&self.pool)
			.await?;
		Ok(count as u64)
	}
}

#[async_trait]
impl ProcessedLogStore for ProcessedLogRepository {
	async fn get_processed_log(&self, job_id: JobId) -> Result<Option<ProcessedLog>> {
		self.get_processed_log(job_id).await
	}

	async fn upsert_processed_log(&self, log: &ProcessedLog) -> Result<()> {
		self.upsert_processed_log(log).await
	}

	async fn list_processed_logs(&self, pipeline_id: PipelineId) -> Result<Vec<ProcessedLog>> {
		self.list_processed_logs(pipeline_id).await
	}

	async fn delete_processed_log(&self, job_id: JobId) -> Result<bool> {
		self.delete_processed_log(job_id).await
	}

	async fn delete_all_processed_logs(&self) -> Result<u64> {
		self.delete_all_processed_logs().await
	}

	async fn count_processed_logs(&self) -> Result<u64> {
		self.count_processed_logs().await
	}
}
