// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Why configuration could not be loaded.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("could not read {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("{path} is not valid TOML: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	/// A single setting, from a file or `PIPEWATCH_*` variable, failed to parse.
	#[error("{key}: {message}")]
	InvalidValue { key: String, message: String },

	/// Settings parsed but do not make sense together, e.g. a zero limit.
	#[error("invalid configuration: {0}")]
	Validation(String),

	#[error("secret unavailable: {0}")]
	Secret(String),
}
