// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Failures of the SQLite stores.

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("sqlite: {0}")]
	Sqlx(#[from] sqlx::Error),

	/// A stored JSON document no longer matches its Rust type.
	#[error("stored document is unreadable: {0}")]
	Document(#[from] serde_json::Error),

	#[error("invalid database url: {0}")]
	InvalidUrl(String),

	/// A column holds a value the stores never write, e.g. a malformed timestamp.
	#[error("corrupt column value: {0}")]
	Corrupt(String),

	#[error("not found: {0}")]
	NotFound(String),
}

impl DbError {
	/// The database is locked or the pool is exhausted; a later attempt may succeed.
	pub fn is_busy(&self) -> bool {
		matches!(self, DbError::Sqlx(sqlx::Error::PoolTimedOut))
			|| matches!(self, DbError::Sqlx(sqlx::Error::Database(e)) if e.message().contains("database is locked"))
	}
}

pub type Result<T> = std::result::Result<T, DbError>;
