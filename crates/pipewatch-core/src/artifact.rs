// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::JobId;

/// One central-directory entry of an artifact archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipEntry {
	/// Full path inside the archive; directories end in `/`.
	pub name: String,
	/// Uncompressed size in bytes.
	pub size: u64,
	pub is_directory: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
	Directory,
	File,
}

/// An immediate child of a directory inside an artifact archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
	pub name: String,
	/// Path from the archive root, without a trailing slash.
	pub path: String,
	pub kind: EntryKind,
	/// Only set for files.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub size: Option<u64>,
}

/// Cached listing of one directory of a job's artifact archive.
///
/// Keyed by `(job_id, path)`. The root entry (`path == ""`) also keeps the
/// complete flat listing so deeper directories can be answered without indexing
/// the archive again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactIndexEntry {
	pub job_id: JobId,
	pub path: String,
	pub files: Vec<ArtifactEntry>,
	#[serde(default)]
	pub flat_list: Option<Vec<ZipEntry>>,
	/// The archive's central directory was cut short; `files` is partial.
	#[serde(default)]
	pub truncated: bool,
	pub cached_at: DateTime<Utc>,
}

impl ArtifactIndexEntry {
	pub fn is_root(&self) -> bool {
		self.path.is_empty()
	}
}
