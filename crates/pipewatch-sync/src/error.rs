// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use pipewatch_analysis::IndexError;
use pipewatch_common_http::TransientError;
use pipewatch_db::DbError;
use pipewatch_gitlab::GitLabError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Upstream error: {0}")]
	Upstream(#[from] GitLabError),

	#[error("Store error: {0}")]
	Store(#[from] DbError),

	#[error("Index error: {0}")]
	Index(#[from] IndexError),

	#[error("Concurrency limiter closed")]
	Limiter(#[from] tokio::sync::AcquireError),
}

impl SyncError {
	/// The requested record does not exist, here or upstream.
	pub fn is_not_found(&self) -> bool {
		match self {
			SyncError::NotFound(_) => true,
			SyncError::Upstream(e) => e.is_not_found(),
			SyncError::Store(DbError::NotFound(_)) => true,
			_ => false,
		}
	}

	/// Worth retrying on the next pass.
	pub fn is_transient(&self) -> bool {
		match self {
			SyncError::Upstream(e) => e.is_transient(),
			SyncError::Store(e) => e.is_busy(),
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn not_found_is_recognised_at_every_layer() {
		assert!(SyncError::NotFound("job 4".to_string()).is_not_found());
		assert!(SyncError::Upstream(GitLabError::NotFound("/jobs/4".to_string())).is_not_found());
		assert!(SyncError::Store(DbError::NotFound("task".to_string())).is_not_found());
		assert!(!SyncError::Index(IndexError::NoCentralDirectory).is_not_found());
	}

	#[test]
	fn transient_upstream_and_busy_store_errors_are_transient() {
		assert!(SyncError::Upstream(GitLabError::Timeout).is_transient());
		assert!(!SyncError::Upstream(GitLabError::Unauthorized).is_transient());
		assert!(!SyncError::NotFound("pipeline 1".to_string()).is_transient());
		assert!(SyncError::Store(DbError::Sqlx(sqlx::Error::PoolTimedOut)).is_transient());
		assert!(!SyncError::Store(DbError::Corrupt("cached_at".to_string())).is_transient());
	}
}
