// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod artifacts;
mod database;
mod gitlab;
mod logging;
mod sync;

pub use artifacts::{ArtifactsConfig, ArtifactsConfigLayer, MarkerPosition, TeamRuleConfig};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use gitlab::{GitLabConfig, GitLabConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use sync::{SyncConfig, SyncConfigLayer};
