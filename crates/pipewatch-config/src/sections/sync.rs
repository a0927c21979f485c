// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sync loop configuration section.

use serde::{Deserialize, Serialize};

fn default_test_stages() -> Vec<String> {
	vec!["test".to_string()]
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncConfigLayer {
	pub enabled: Option<bool>,
	pub interval_secs: Option<u64>,
	pub namespace: Option<String>,
	pub default_ref: Option<String>,
	pub lookback_days: Option<u32>,
	pub test_stages: Option<Vec<String>>,
	pub max_concurrent_api_calls: Option<usize>,
	pub max_concurrent_writes: Option<usize>,
	pub max_concurrent_pipelines: Option<usize>,
	pub max_concurrent_projects: Option<usize>,
}

impl SyncConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.interval_secs.is_some() {
			self.interval_secs = other.interval_secs;
		}
		if other.namespace.is_some() {
			self.namespace = other.namespace;
		}
		if other.default_ref.is_some() {
			self.default_ref = other.default_ref;
		}
		if other.lookback_days.is_some() {
			self.lookback_days = other.lookback_days;
		}
		if other.test_stages.is_some() {
			self.test_stages = other.test_stages;
		}
		if other.max_concurrent_api_calls.is_some() {
			self.max_concurrent_api_calls = other.max_concurrent_api_calls;
		}
		if other.max_concurrent_writes.is_some() {
			self.max_concurrent_writes = other.max_concurrent_writes;
		}
		if other.max_concurrent_pipelines.is_some() {
			self.max_concurrent_pipelines = other.max_concurrent_pipelines;
		}
		if other.max_concurrent_projects.is_some() {
			self.max_concurrent_projects = other.max_concurrent_projects;
		}
	}

	pub fn finalize(self) -> SyncConfig {
		let defaults = SyncConfig::default();
		SyncConfig {
			enabled: self.enabled.unwrap_or(defaults.enabled),
			interval_secs: self.interval_secs.unwrap_or(defaults.interval_secs),
			namespace: self
				.namespace
				.map(|ns| ns.trim_matches('/').to_string())
				.filter(|ns| !ns.is_empty()),
			default_ref: self.default_ref.unwrap_or(defaults.default_ref),
			lookback_days: self.lookback_days.unwrap_or(defaults.lookback_days),
			test_stages: self.test_stages.unwrap_or(defaults.test_stages),
			max_concurrent_api_calls: self
				.max_concurrent_api_calls
				.unwrap_or(defaults.max_concurrent_api_calls),
			max_concurrent_writes: self
				.max_concurrent_writes
				.unwrap_or(defaults.max_concurrent_writes),
			max_concurrent_pipelines: self
				.max_concurrent_pipelines
				.unwrap_or(defaults.max_concurrent_pipelines),
			max_concurrent_projects: self
				.max_concurrent_projects
				.unwrap_or(defaults.max_concurrent_projects),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
	pub enabled: bool,
	pub interval_secs: u64,
	/// Only projects under this path are synced. `None` syncs every project the
	/// token can see.
	pub namespace: Option<String>,
	pub default_ref: String,
	pub lookback_days: u32,
	/// Stage names whose jobs get JUnit aggregation.
	pub test_stages: Vec<String>,
	pub max_concurrent_api_calls: usize,
	pub max_concurrent_writes: usize,
	pub max_concurrent_pipelines: usize,
	pub max_concurrent_projects: usize,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			interval_secs: 30,
			namespace: None,
			default_ref: "main".to_string(),
			lookback_days: 7,
			test_stages: default_test_stages(),
			max_concurrent_api_calls: 20,
			max_concurrent_writes: 50,
			max_concurrent_pipelines: 10,
			max_concurrent_projects: 5,
		}
	}
}
