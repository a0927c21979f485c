// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for pipewatch.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`PIPEWATCH_*`)
//!
//! # Usage
//!
//! ```ignore
//! use pipewatch_config::load_config;
//!
//! let config = load_config()?;
//! println!("Syncing {} every {}s", config.gitlab.base_url, config.sync.interval_secs);
//! ```

pub mod error;
pub mod layer;
pub mod secret;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::PipewatchConfigLayer;
pub use secret::{load_secret_env, Secret, SecretString};
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info, warn};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct PipewatchConfig {
	pub database: DatabaseConfig,
	pub gitlab: GitLabConfig,
	pub sync: SyncConfig,
	pub artifacts: ArtifactsConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`PIPEWATCH_*`)
/// 2. Config file (`/etc/pipewatch/pipewatch.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<PipewatchConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<PipewatchConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<PipewatchConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = PipewatchConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: PipewatchConfigLayer) -> Result<PipewatchConfig, ConfigError> {
	let database = layer.database.unwrap_or_default().finalize();
	let gitlab = layer.gitlab.unwrap_or_default().finalize();
	let sync = layer.sync.unwrap_or_default().finalize();
	let artifacts = layer.artifacts.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&gitlab, &sync, &artifacts)?;

	if gitlab.token.is_none() {
		warn!("PIPEWATCH_GITLAB_TOKEN is not set; only public projects will be visible");
	}

	info!(
		database = %database.url,
		gitlab_url = %gitlab.base_url,
		namespace = sync.namespace.as_deref().unwrap_or("*"),
		default_ref = %sync.default_ref,
		lookback_days = sync.lookback_days,
		interval_secs = sync.interval_secs,
		sync_enabled = sync.enabled,
		team_rules = artifacts.team_rules.len(),
		"Configuration loaded"
	);

	Ok(PipewatchConfig {
		database,
		gitlab,
		sync,
		artifacts,
		logging,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(
	gitlab: &GitLabConfig,
	sync: &SyncConfig,
	artifacts: &ArtifactsConfig,
) -> Result<(), ConfigError> {
	if !(gitlab.base_url.starts_with("http://") || gitlab.base_url.starts_with("https://")) {
		return Err(ConfigError::InvalidValue {
			key: "gitlab.base_url".to_string(),
			message: format!("'{}' is not an http(s) URL", gitlab.base_url),
		});
	}

	let positive = [
		("sync.interval_secs", sync.interval_secs as usize),
		("sync.max_concurrent_api_calls", sync.max_concurrent_api_calls),
		("sync.max_concurrent_writes", sync.max_concurrent_writes),
		("sync.max_concurrent_pipelines", sync.max_concurrent_pipelines),
		("sync.max_concurrent_projects", sync.max_concurrent_projects),
		("artifacts.cache_ttl_secs", artifacts.cache_ttl_secs as usize),
		("artifacts.prune_interval_secs", artifacts.prune_interval_secs as usize),
	];
	for (key, value) in positive {
		if value == 0 {
			return Err(ConfigError::Validation(format!("{key} must be at least 1")));
		}
	}

	if sync.test_stages.is_empty() {
		return Err(ConfigError::Validation(
			"sync.test_stages must name at least one stage".to_string(),
		));
	}

	if artifacts.team_rules.iter().any(|r| r.marker.trim().is_empty()) {
		return Err(ConfigError::Validation(
			"artifacts.team_rules entries need a non-empty marker".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_finalize() {
		let config = finalize(PipewatchConfigLayer::default()).unwrap();
		assert_eq!(config.database.url, "sqlite:./pipewatch.db");
		assert_eq!(config.sync.default_ref, "main");
		assert_eq!(config.artifacts.cache_ttl_secs, 86_400);
	}

	#[test]
	fn test_zero_concurrency_rejected() {
		let layer = PipewatchConfigLayer {
			sync: Some(SyncConfigLayer {
				max_concurrent_writes: Some(0),
				..Default::default()
			}),
			..Default::default()
		};
		let err = finalize(layer).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("max_concurrent_writes")));
	}

	#[test]
	fn test_empty_test_stages_rejected() {
		let layer = PipewatchConfigLayer {
			sync: Some(SyncConfigLayer {
				test_stages: Some(Vec::new()),
				..Default::default()
			}),
			..Default::default()
		};
		assert!(finalize(layer).is_err());
	}

	#[test]
	fn test_non_http_base_url_rejected() {
		let layer = PipewatchConfigLayer {
			gitlab: Some(GitLabConfigLayer {
				base_url: Some("gitlab.example.com".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		let err = finalize(layer).unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "gitlab.base_url"));
	}

	#[test]
	fn test_blank_team_marker_rejected() {
		let layer = PipewatchConfigLayer {
			artifacts: Some(ArtifactsConfigLayer {
				team_rules: Some(vec![TeamRuleConfig {
					marker: " ".to_string(),
					..Default::default()
				}]),
				..Default::default()
			}),
			..Default::default()
		};
		assert!(finalize(layer).is_err());
	}
}
