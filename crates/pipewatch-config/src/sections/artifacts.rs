// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Artifact browsing, caching and test grouping.

use serde::{Deserialize, Serialize};

const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_MAX_BROWSE_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 60 * 60;

/// Which neighbour of a marker segment names the team.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerPosition {
	#[default]
	After,
	Before,
}

/// One entry of the ordered team classifier.
///
/// ```toml
/// [[artifacts.team_rules]]
/// project = "monorepo"
/// marker = "teams"
/// position = "after"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TeamRuleConfig {
	/// Case-insensitive substring of the project path. Absent matches any project.
	#[serde(default)]
	pub project: Option<String>,
	pub marker: String,
	#[serde(default)]
	pub position: MarkerPosition,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArtifactsConfigLayer {
	pub cache_ttl_secs: Option<u64>,
	pub max_browse_bytes: Option<u64>,
	pub prune_interval_secs: Option<u64>,
	pub team_rules: Option<Vec<TeamRuleConfig>>,
}

impl ArtifactsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.cache_ttl_secs.is_some() {
			self.cache_ttl_secs = other.cache_ttl_secs;
		}
		if other.max_browse_bytes.is_some() {
			self.max_browse_bytes = other.max_browse_bytes;
		}
		if other.prune_interval_secs.is_some() {
			self.prune_interval_secs = other.prune_interval_secs;
		}
		if other.team_rules.is_some() {
			self.team_rules = other.team_rules;
		}
	}

	pub fn finalize(self) -> ArtifactsConfig {
		ArtifactsConfig {
			cache_ttl_secs: self.cache_ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS),
			max_browse_bytes: self.max_browse_bytes.unwrap_or(DEFAULT_MAX_BROWSE_BYTES),
			prune_interval_secs: self
				.prune_interval_secs
				.unwrap_or(DEFAULT_PRUNE_INTERVAL_SECS),
			team_rules: self.team_rules.unwrap_or_default(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactsConfig {
	pub cache_ttl_secs: u64,
	/// Archives declared larger than this are not browsed.
	pub max_browse_bytes: u64,
	pub prune_interval_secs: u64,
	pub team_rules: Vec<TeamRuleConfig>,
}

impl Default for ArtifactsConfig {
	fn default() -> Self {
		ArtifactsConfigLayer::default().finalize()
	}
}
