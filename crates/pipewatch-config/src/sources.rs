// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::PipewatchConfigLayer;
use crate::secret::load_secret_env;
use crate::sections::{
	ArtifactsConfigLayer, DatabaseConfigLayer, GitLabConfigLayer, LogFormat, LoggingConfigLayer,
	SyncConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<PipewatchConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<PipewatchConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(PipewatchConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is not an error.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/pipewatch/pipewatch.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<PipewatchConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(PipewatchConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: PipewatchConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: PIPEWATCH_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<PipewatchConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(PipewatchConfigLayer {
			database: Some(load_database_from_env()?),
			gitlab: Some(load_gitlab_from_env()?),
			sync: Some(load_sync_from_env()?),
			artifacts: Some(load_artifacts_from_env()?),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: FromStr>(name: &str, kind: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {kind} value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_list(name: &str) -> Option<Vec<String>> {
	env_var(name).map(|v| {
		v.split(',')
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(str::to_string)
			.collect()
	})
}

fn load_database_from_env() -> Result<DatabaseConfigLayer, ConfigError> {
	Ok(DatabaseConfigLayer {
		url: env_var("PIPEWATCH_DATABASE_URL"),
		run_history_retention_days: env_parse(
			"PIPEWATCH_DATABASE_RUN_HISTORY_RETENTION_DAYS",
			"u32",
		)?,
	})
}

fn load_gitlab_from_env() -> Result<GitLabConfigLayer, ConfigError> {
	Ok(GitLabConfigLayer {
		base_url: env_var("PIPEWATCH_GITLAB_URL"),
		token: load_secret_env("PIPEWATCH_GITLAB_TOKEN")?,
		request_timeout_secs: env_parse("PIPEWATCH_GITLAB_REQUEST_TIMEOUT_SECS", "u64")?,
	})
}

fn load_sync_from_env() -> Result<SyncConfigLayer, ConfigError> {
	Ok(SyncConfigLayer {
		enabled: env_bool("PIPEWATCH_SYNC_ENABLED"),
		interval_secs: env_parse("PIPEWATCH_SYNC_INTERVAL_SECS", "u64")?,
		namespace: env_var("PIPEWATCH_SYNC_NAMESPACE"),
		default_ref: env_var("PIPEWATCH_SYNC_DEFAULT_REF"),
		lookback_days: env_parse("PIPEWATCH_SYNC_LOOKBACK_DAYS", "u32")?,
		test_stages: env_list("PIPEWATCH_SYNC_TEST_STAGES"),
		max_concurrent_api_calls: env_parse("PIPEWATCH_SYNC_MAX_API_CALLS", "usize")?,
		max_concurrent_writes: env_parse("PIPEWATCH_SYNC_MAX_WRITES", "usize")?,
		max_concurrent_pipelines: env_parse("PIPEWATCH_SYNC_MAX_PIPELINES", "usize")?,
		max_concurrent_projects: env_parse("PIPEWATCH_SYNC_MAX_PROJECTS", "usize")?,
	})
}

fn load_artifacts_from_env() -> Result<ArtifactsConfigLayer, ConfigError> {
	Ok(ArtifactsConfigLayer {
		cache_ttl_secs: env_parse("PIPEWATCH_ARTIFACTS_CACHE_TTL_SECS", "u64")?,
		max_browse_bytes: env_parse("PIPEWATCH_ARTIFACTS_MAX_BROWSE_BYTES", "u64")?,
		prune_interval_secs: env_parse("PIPEWATCH_ARTIFACTS_PRUNE_INTERVAL_SECS", "u64")?,
		team_rules: None,
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = match env_var("PIPEWATCH_LOG_FORMAT") {
		Some(v) => Some(
			v.parse::<LogFormat>()
				.map_err(|message| ConfigError::InvalidValue {
					key: "PIPEWATCH_LOG_FORMAT".to_string(),
					message,
				})?,
		),
		None => None,
	};
	Ok(LoggingConfigLayer {
		level: env_var("PIPEWATCH_LOG_LEVEL"),
		format,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Defaults < Precedence::ConfigFile);
		assert!(Precedence::ConfigFile < Precedence::Environment);
	}

	#[test]
	fn test_missing_toml_file_yields_empty_layer() {
		let layer = TomlSource::new("/nonexistent/pipewatch.toml").load().unwrap();
		assert!(layer.sync.is_none());
		assert!(layer.gitlab.is_none());
	}

	#[test]
	fn test_toml_file_is_parsed() {
		let mut file = NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[gitlab]
base_url = "https://gitlab.internal"

[sync]
namespace = "platform"
lookback_days = 3
"#
		)
		.unwrap();
		let layer = TomlSource::new(file.path()).load().unwrap();
		assert_eq!(
			layer.gitlab.unwrap().base_url.as_deref(),
			Some("https://gitlab.internal")
		);
		let sync = layer.sync.unwrap();
		assert_eq!(sync.namespace.as_deref(), Some("platform"));
		assert_eq!(sync.lookback_days, Some(3));
	}

	#[test]
	fn test_invalid_toml_reports_path() {
		let mut file = NamedTempFile::new().unwrap();
		writeln!(file, "[sync\nlookback_days = ").unwrap();
		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn test_env_list_splits_and_trims() {
		std::env::set_var("PIPEWATCH_TEST_LIST", " test, integration ,,e2e");
		assert_eq!(
			env_list("PIPEWATCH_TEST_LIST").unwrap(),
			vec!["test", "integration", "e2e"]
		);
		std::env::remove_var("PIPEWATCH_TEST_LIST");
	}

	#[test]
	fn test_env_parse_rejects_garbage() {
		std::env::set_var("PIPEWATCH_TEST_NUMBER", "ten");
		let err = env_parse::<u64>("PIPEWATCH_TEST_NUMBER", "u64").unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { .. }));
		std::env::remove_var("PIPEWATCH_TEST_NUMBER");
	}
}
