// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::Utc;
use pipewatch_core::ProjectId;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::types::timestamp;

pub const ENABLED_PROJECTS_KEY: &str = "enabled_projects";

/// Small JSON key/value table for operator settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
	async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>>;
	async fn put_setting(&self, key: &str, value: &serde_json::Value) -> Result<()>;

	/// `None` means no selection was saved and every visible project is synced.
	async fn get_enabled_projects(&self) -> Result<Option<Vec<ProjectId>>> {
		match self.get_setting(ENABLED_PROJECTS_KEY).await? {
			Some(value) => Ok(Some(serde_json::from_value(value)?)),
			None => Ok(None),
		}
	}

	async fn set_enabled_projects(&self, ids: &[ProjectId]) -> Result<()> {
		let mut ids = ids.to_vec();
		ids.sort_unstable();
		ids.dedup();
		self
			.put_setting(ENABLED_PROJECTS_KEY, &serde_json::to_value(ids)?)
			.await
	}
}

#[derive(Clone)]
pub struct SettingsRepository {
	pool: SqlitePool,
}

impl SettingsRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>> {
		let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
			.bind(key)
			.fetch_optional(&self.pool)
			.await?;

		row
			.map(|(value,)| serde_json::from_str(&value).map_err(Into::into))
			.transpose()
	}

	#[tracing::instrument(skip(self, value))]
	pub async fn put_setting(&self, key: &str, value: &serde_json::Value) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO settings (key, value, updated_at)
			VALUES (?, ?, ?)
			ON CONFLICT(key) DO UPDATE SET
				value = excluded.value,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(key)
		.bind(value.to_string())
		.bind(timestamp(Utc::now()))
		.execute(&self.pool)
		.await?;

		Ok(())
	}
}

#[async_trait]
impl SettingsStore for SettingsRepository {
	async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>> {
		self.get_setting(key).await
	}

	async fn put_setting(&self, key: &str, value: &serde_json::Value) -> Result<()> {
		self.put_setting(key, value).await
	}
}
