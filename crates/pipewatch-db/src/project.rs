// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::Utc;
use pipewatch_core::{Project, ProjectId};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::types::timestamp;

#[async_trait]
pub trait ProjectStore: Send + Sync {
	async fn upsert_project(&self, project: &Project) -> Result<()>;
	async fn get_project(&self, id: ProjectId) -> Result<Option<Project>>;
	async fn list_projects(&self) -> Result<Vec<Project>>;
}

#[derive(Clone)]
pub struct ProjectRepository {
	pool: SqlitePool,
}

impl ProjectRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, project), fields(project_id = project.id))]
	pub async fn upsert_project(&self, project: &Project) -> Result<()> {
		let document = serde_json::to_string(project)?;
		sqlx::query(
			r#"
			INSERT INTO projects (id, path, document, synced_at)
			VALUES (?, ?, ?, ?)
			ON CONFLICT(id) DO UPDATE SET
				path = excluded.path,
				document = excluded.document,
				synced_at = excluded.synced_at
			"#,
		)
		.bind(project.id)
		.bind(&project.path)
		.bind(document)
		.bind(timestamp(Utc::now()))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
		let row: Option<(String,)> = sqlx::query_as("SELECT document FROM projects WHERE id = ?")
			.bind(id)
			.fetch_optional(&self.pool)
			.await?;

		row
			.map(|(document,)| serde_json::from_str(&document).map_err(Into::into))
			.transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_projects(&self) -> Result<Vec<Project>> {
		let rows: Vec<(String,)> = sqlx::query_as("SELECT document FROM projects ORDER BY path")
			.fetch_all(&self.pool)
			.await?;

		rows
			.into_iter()
			.map(|(document,)| serde_json::from_str(&document).map_err(Into::into))
			.collect()
	}
}

#[async_trait]
impl ProjectStore for ProjectRepository {
	async fn upsert_project(&self, project: &Project) -> Result<()> {
		self.upsert_project(project).await
	}

	async fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
		self.get_project(id).await
	}

	async fn list_projects(&self) -> Result<Vec<Project>> {
		self.list_projects().await
	}
}
