// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipewatch_core::{ArtifactIndexEntry, JobId};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::types::timestamp;

/// Directory listings of artifact archives, keyed by `(job_id, path)`.
#[async_trait]
pub trait ArtifactIndexStore: Send + Sync {
	async fn get_listing(&self, job_id: JobId, path: &str) -> Result<Option<ArtifactIndexEntry>>;
	async fn put_listing(&self, entry: &ArtifactIndexEntry) -> Result<()>;
	async fn delete_listing(&self, job_id: JobId, path: &str) -> Result<bool>;
	async fn delete_listings_for_job(&self, job_id: JobId) -> Result<u64>;
	async fn delete_listings_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
	async fn delete_all_listings(&self) -> Result<u64>;
	async fn count_listings(&self) -> Result<u64>;
}

#[derive(Clone)]
pub struct ArtifactIndexRepository {
	pool: SqlitePool,
}

impl ArtifactIndexRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_listing(&self, job_id: JobId, path: &str) -> Result<Option<ArtifactIndexEntry>> {
		let row: Option<(String,)> =
			sqlx::query_as("SELECT document FROM artifact_index WHERE job_id = ? AND path = ?")
				.bind(job_id)
				.bind(path)
				.fetch_optional(&self.pool)
				.await?;

		row
			.map(|(document,)| serde_json::from_str(&document).map_err(Into::into))
			.transpose()
	}

	#[tracing::instrument(skip(self, entry), fields(job_id = entry.job_id, path = %entry.path, files = entry.files.len()))]
	pub async fn put_listing(&self, entry: &ArtifactIndexEntry) -> Result<()> {
		let document = serde_json::to_string(entry)?;
		sqlx::query(
			r#"
			INSERT INTO artifact_index (job_id, path, document, cached_at)
			VALUES (?, ?, ?, ?)
			ON CONFLICT(job_id, path) DO UPDATE SET
				document = excluded.document,
				cached_at = excluded.cached_at
			"#,
		)
		.bind(entry.job_id)
		.bind(&entry.path)
		.bind(document)
		.bind(timestamp(entry.cached_at))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_listing(&self, job_id: JobId, path: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM artifact_index WHERE job_id = ? AND path = ?")
			.bind(job_id)
			.bind(path)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_listings_for_job(&self, job_id: JobId) -> Result<u64> {
		let result = sqlx::query("DELETE FROM artifact_index WHERE job_id = ?")
			.bind(job_id)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_listings_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM artifact_index WHERE cached_at < ?")
			.bind(timestamp(cutoff))
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_all_listings(&self) -> Result<u64> {
		let result = sqlx::query("DELETE FROM artifact_index")
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	pub async fn count_listings(&self) -> Result<u64> {
		let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM artifact_index")
			.fetch_one(&self.pool)
			.await?;
		Ok(count as u64)
	}
}

#[async_trait]
impl ArtifactIndexStore for ArtifactIndexRepository {
	async fn get_listing(&self, job_id: JobId, path: &str) -> Result<Option<ArtifactIndexEntry>> {
		self.get_listing(job_id, path).await
	}

	async fn put_listing(&self, entry: &ArtifactIndexEntry) -> Result<()> {
		self.put_listing(entry).await
	}

	async fn delete_listing(&self, job_id: JobId, path: &str) -> Result<bool> {
		self.delete_listing(job_id, path).await
	}

	async fn delete_listings_for_job(&self, job_id: JobId) -> Result<u64> {
		self.delete_listings_for_job(job_id).await
	}

	async fn delete_listings_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		self.delete_listings_before(cutoff).await
	}

	async fn delete_all_listings(&self) -> Result<u64> {
		self.delete_all_listings().await
	}

	async fn count_listings(&self) -> Result<u64> {
		self.count_listings().await
	}
}
