// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Keeps the local store in step with upstream CI and answers queries over it.
//!
//! [`SyncOrchestrator`] runs sync passes. [`PipelineService`] is the facade a
//! CLI or API layer calls; it owns an orchestrator and shares its
//! [`SyncState`].

pub mod artifact_source;
pub mod cache;
pub mod error;
pub mod orchestrator;
pub mod policy;
pub mod service;
pub mod state;
pub mod testing;

pub use artifact_source::{is_missing_archive, ArtifactSource};
pub use cache::{ArtifactCache, CacheKey, Clock, PruneReport, SystemClock, DEFAULT_CACHE_TTL};
pub use error::{Result, SyncError};
pub use orchestrator::SyncOrchestrator;
pub use policy::SyncPolicy;
pub use service::{
	ArtifactDescriptor, BrowseNotice, BrowseResult, JobTests, PipelineService, PipelineTests,
	SyncStatus,
};
pub use state::{SyncPhase, SyncState, SyncSummary};
