// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the GitLab client.

use pipewatch_common_http::TransientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitLabError {
	/// Network-level error during HTTP communication.
	#[error("Network error: {0}")]
	Network(#[from] reqwest::Error),

	#[error("Request timed out")]
	Timeout,

	/// Missing or rejected access token.
	#[error("Unauthorized")]
	Unauthorized,

	#[error("Rate limit exceeded")]
	RateLimited,

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("GitLab API error: {status} - {message}")]
	Api { status: u16, message: String },

	#[error("Invalid response from GitLab: {0}")]
	InvalidResponse(String),

	#[error("Invalid URL: {0}")]
	InvalidUrl(String),
}

impl GitLabError {
	pub fn is_not_found(&self) -> bool {
		matches!(self, GitLabError::NotFound(_))
	}
}

impl TransientError for GitLabError {
	fn is_transient(&self) -> bool {
		match self {
			GitLabError::Network(e) => e.is_transient(),
			GitLabError::Timeout => true,
			GitLabError::RateLimited => true,
			GitLabError::Unauthorized => false,
			GitLabError::NotFound(_) => false,
			GitLabError::Api { status, .. } => *status >= 500 || *status == 408,
			GitLabError::InvalidResponse(_) => false,
			GitLabError::InvalidUrl(_) => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, GitLabError>;
