// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

/// Error returned by a [`RangeFetcher`](crate::RangeFetcher) or
/// [`ArchiveReader`](crate::ArchiveReader) implementation.
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
	#[error("no central directory found")]
	NoCentralDirectory,

	#[error("ZIP64 archives are not supported")]
	Zip64Unsupported,

	#[error("invalid central directory: {0}")]
	InvalidDirectory(String),

	#[error("failed to read archive: {0}")]
	Fetch(#[source] FetchError),
}
