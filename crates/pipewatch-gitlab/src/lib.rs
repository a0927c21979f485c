// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GitLab access for pipewatch.
//!
//! [`GitOpsClient`] is the seam the sync engine talks through; [`GitLabClient`]
//! implements it against the GitLab v4 REST API. Response payloads are decoded
//! into `pipewatch-core` records here and nowhere else.

pub mod ci;
pub mod client;
pub mod error;
mod types;

pub use ci::parse_stage_order;
pub use client::{GitLabClient, GitOpsClient};
pub use error::{GitLabError, Result};
