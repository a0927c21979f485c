// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProjectId = i64;

/// A project mirrored from the CI platform.
///
/// `path` is the full namespaced path (`group/subgroup/name`) and is what the
/// namespace filter matches against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
	pub id: ProjectId,
	pub name: String,
	pub path: String,
	pub web_url: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub default_branch: Option<String>,
	#[serde(default)]
	pub last_activity_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub avatar_url: Option<String>,
}

impl Project {
	/// Returns true if the project lives under `namespace`.
	///
	/// An empty namespace matches every project. Matching is by whole path
	/// segments, so `team` matches `team/api` but not `teamwork/api`.
	pub fn in_namespace(&self, namespace: &str) -> bool {
		let namespace = namespace.trim_matches('/');
		if namespace.is_empty() {
			return true;
		}
		self.path == namespace
			|| self
				.path
				.strip_prefix(namespace)
				.is_some_and(|rest| rest.starts_with('/'))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn project(path: &str) -> Project {
		Project {
			id: 1,
			name: path.rsplit('/').next().unwrap_or(path).to_string(),
			path: path.to_string(),
			web_url: format!("https://gitlab.example.com/{path}"),
			description: None,
			default_branch: None,
			last_activity_at: None,
			avatar_url: None,
		}
	}

	#[test]
	fn empty_namespace_matches_everything() {
		assert!(project("team/api").in_namespace(""));
		assert!(project("team/api").in_namespace("/"));
	}

	#[test]
	fn namespace_matches_whole_segments() {
		assert!(project("team/api").in_namespace("team"));
		assert!(project("team/sub/api").in_namespace("team/sub"));
		assert!(project("team/sub/api").in_namespace("team/"));
		assert!(!project("teamwork/api").in_namespace("team"));
		assert!(!project("other/api").in_namespace("team"));
	}
}
