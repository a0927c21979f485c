// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Transient failure classification.
//!
//! Sync passes never retry in place. A transient failure skips the affected unit
//! of work and the next scheduled pass picks it up again; a permanent failure
//! (bad credentials, missing resource) will not heal by waiting.

use reqwest::StatusCode;

pub trait TransientError {
	fn is_transient(&self) -> bool;
}

/// Statuses that usually clear up on their own.
pub fn is_transient_status(status: StatusCode) -> bool {
	matches!(
		status,
		StatusCode::TOO_MANY_REQUESTS
			| StatusCode::REQUEST_TIMEOUT
			| StatusCode::INTERNAL_SERVER_ERROR
			| StatusCode::BAD_GATEWAY
			| StatusCode::SERVICE_UNAVAILABLE
			| StatusCode::GATEWAY_TIMEOUT
	)
}

impl TransientError for reqwest::Error {
	fn is_transient(&self) -> bool {
		if self.is_timeout() || self.is_connect() || self.is_request() {
			return true;
		}

		self.status().is_some_and(is_transient_status)
	}
}
