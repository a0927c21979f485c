// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core records for pipewatch.
//!
//! Everything here is plain data: the mirrored CI state (projects, pipelines and
//! the jobs embedded in them) plus the derived records produced from job output
//! (processed logs, test reports, artifact listings). Upstream payloads are
//! decoded into these types at the client boundary and never carried around as
//! loose JSON.

pub mod artifact;
pub mod log;
pub mod pipeline;
pub mod project;
pub mod test_report;

pub use artifact::{ArtifactEntry, ArtifactIndexEntry, EntryKind, ZipEntry};
pub use log::{LogAnnotation, ProcessedLog, Severity};
pub use pipeline::{Job, JobArtifact, JobId, Pipeline, PipelineId, PipelineStatus};
pub use project::{Project, ProjectId};
pub use test_report::{TestCase, TestCounts, TestReport, TestStatus};
