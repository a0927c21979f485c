// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Analysis of CI job output: artifact archive listings, JUnit test reports,
//! failure signatures in job logs, team grouping and stage ordering.
//!
//! Nothing here performs I/O directly. Remote reads go through the
//! [`RangeFetcher`] and [`ArchiveReader`] traits.

pub mod error;
pub mod junit;
pub mod log_scan;
pub mod stages;
pub mod teams;
pub mod testing;
pub mod tree;
pub mod zip;

pub use error::{FetchError, IndexError};
pub use junit::{aggregate_report, parse_report, select_report, ArchiveReader};
pub use log_scan::annotate;
pub use stages::{order_stages, STANDARD_STAGES};
pub use teams::{MarkerPosition, TeamClassifier, TeamRule, DEFAULT_TEAM};
pub use tree::{children, normalize_path};
pub use zip::{RangeFetcher, ZipIndexer, ZipListing, TAIL_FETCH_BYTES};
