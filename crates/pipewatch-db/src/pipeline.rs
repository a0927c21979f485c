// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pipelines are stored as whole documents with their jobs embedded. The
//! indexed columns exist only for filtering and ordering.

use async_trait::async_trait;
use chrono::Utc;
use pipewatch_core::{JobId, Pipeline, PipelineId};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::types::{timestamp, PipelineFilter, PipelineStats};

#[async_trait]
pub trait PipelineStore: Send + Sync {
	async fn upsert_pipeline(&self, pipeline: &Pipeline) -> Result<()>;
	async fn get_pipeline(&self, id: PipelineId) -> Result<Option<Pipeline>>;
	async fn find_pipeline_by_job(&self, job_id: JobId) -> Result<Option<Pipeline>>;
	async fn list_pipelines(&self, filter: &PipelineFilter) -> Result<Vec<Pipeline>>;
	async fn count_pipelines(&self) -> Result<u64>;
	async fn pipeline_stats(&self) -> Result<PipelineStats>;
	async fn list_branches(&self) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct PipelineRepository {
	pool: SqlitePool,
}

impl PipelineRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, pipeline), fields(pipeline_id = pipeline.id, project_id = pipeline.project_id))]
	pub async fn upsert_pipeline(&self, pipeline: &Pipeline) -> Result<()> {
		let document = serde_json::to_string(pipeline)?;
		sqlx::query(
			r#"
			INSERT INTO pipelines (id, project_id, ref_name, status, created_at, updated_at, document, synced_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(id) DO UPDATE SET
				project_id = excluded.project_id,
				ref_name = excluded.ref_name,
				status = excluded.status,
				created_at = excluded.created_at,
				updated_at = excluded.updated_at,
				document = excluded.document,
				synced_at = excluded.synced_at
			"#,
		)
		.bind(pipeline.id)
		.bind(pipeline.project_id)
		.bind(&pipeline.ref_name)
		.bind(pipeline.status.as_str())
		.bind(timestamp(pipeline.created_at))
		.bind(timestamp(pipeline.updated_at))
		.bind(document)
		.bind(timestamp(Utc::now()))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_pipeline(&self, id: PipelineId) -> Result<Option<Pipeline>> {
		let row: Option<(String,)> = sqlx::query_as("SELECT document FROM pipelines WHERE id = ?")
			.bind(id)
			.fetch_optional(&self.pool)
			.await?;

		row
			.map(|(document,)| serde_json::from_str(&document).map_err(Into::into))
			.transpose()
	}

	/// Finds the pipeline that embeds `job_id`.
	#[tracing::instrument(skip(self))]
	pub async fn find_pipeline_by_job(&self, job_id: JobId) -> Result<Option<Pipeline>> {
		let row: Option<(String,)> = sqlx::query_as(
			r#"
			SELECT p.document
			FROM pipelines p, json_each(p.document, '$.jobs') j
			WHERE json_extract(j.value, '$.id') = ?
			LIMIT 1
			"#,
		)
		.bind(job_id)
		.fetch_optional(&self.pool)
		.await?;

		row
			.map(|(document,)| serde_json::from_str(&document).map_err(Into::into))
			.transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_pipelines(&self, filter: &PipelineFilter) -> Result<Vec<Pipeline>> {
		let rows: Vec<(String,)> = sqlx::query_as(
			r#"
			SELECT document
			FROM pipelines
			WHERE (? IS NULL OR project_id = ?)
			  AND (? IS NULL OR ref_name = ?)
			  AND (? IS NULL OR status = ?)
			ORDER BY created_at DESC, id DESC
			LIMIT ?
			"#,
		)
		.bind(filter.project_id)
		.bind(filter.project_id)
		.bind(filter.ref_name.as_deref())
		.bind(filter.ref_name.as_deref())
		.bind(filter.status.as_deref())
		.bind(filter.status.as_deref())
		.bind(filter.effective_limit() as i64)
		.fetch_all(&self.pool)
		.await?;

		rows
			.into_iter()
			.map(|(document,)| serde_json::from_str(&document).map_err(Into::into))
			.collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn count_pipelines(&self) -> Result<u64> {
		let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pipelines")
			.fetch_one(&self.pool)
			.await?;
		Ok(count as u64)
	}

	#[tracing::instrument(skip(self))]
	pub async fn pipeline_stats(&self) -> Result<PipelineStats> {
		let (total, success, failed, running, pending): (i64, i64, i64, i64, i64) = sqlx::query_as(
			r#"
			SELECT
				COUNT(*),
				COALESCE(SUM(status = 'success'), 0),
				COALESCE(SUM(status = 'failed'), 0),
				COALESCE(SUM(status = 'running'), 0),
				COALESCE(SUM(status = 'pending'), 0)
			FROM pipelines
			"#,
		)
		.fetch_one(&self.pool)
		.await?;

		Ok(PipelineStats::from_counts(
			total as u64,
			success as u64,
			failed as u64,
			running as u64,
			pending as u64,
		))
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_branches(&self) -> Result<Vec<String>> {
		let rows: Vec<(String,)> =
			sqlx::query_as("SELECT DISTINCT ref_name FROM pipelines ORDER BY ref_name")
				.fetch_all(&self.pool)
				.await?;
		Ok(rows.into_iter().map(|(r,)| r).collect())
	}
}

#[async_trait]
impl PipelineStore for PipelineRepository {
	async fn upsert_pipeline(&self, pipeline: &Pipeline) -> Result<()> {
		self.upsert_pipeline(pipeline).await
	}

	async fn get_pipeline(&self, id: PipelineId) -> Result<Option<Pipeline>> {
		self.get_pipeline(id).await
	}

	async fn find_pipeline_by_job(&self, job_id: JobId) -> Result<Option<Pipeline>> {
		self.find_pipeline_by_job(job_id).await
	}

	async fn list_pipelines(&self, filter: &PipelineFilter) -> Result<Vec<Pipeline>> {
		self.list_pipelines(filter).await
	}

	async fn count_pipelines(&self) -> Result<u64> {
		self.count_pipelines().await
	}

	async fn pipeline_stats(&self) -> Result<PipelineStats> {
		self.pipeline_stats().await
	}

	async fn list_branches(&self) -> Result<Vec<String>> {
		self.list_branches().await
	}
}
