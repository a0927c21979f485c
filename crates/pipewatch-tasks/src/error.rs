// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use pipewatch_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
	#[error("no task registered as '{0}'")]
	Unknown(String),

	#[error("{message}")]
	Failed { message: String, retryable: bool },

	#[error("cancelled by shutdown")]
	Cancelled,

	#[error("run history: {0}")]
	History(#[from] DbError),
}

impl TaskError {
	pub fn failed(message: impl Into<String>) -> Self {
		TaskError::Failed {
			message: message.into(),
			retryable: false,
		}
	}

	pub fn retryable(message: impl Into<String>) -> Self {
		TaskError::Failed {
			message: message.into(),
			retryable: true,
		}
	}

	pub fn is_retryable(&self) -> bool {
		matches!(self, TaskError::Failed { retryable: true, .. })
	}
}

pub type Result<T> = std::result::Result<T, TaskError>;
