// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Upstream GitLab connection settings.

use serde::Deserialize;

use crate::secret::SecretString;

const DEFAULT_BASE_URL: &str = "https://gitlab.com";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct GitLabConfig {
	pub base_url: String,
	pub token: Option<SecretString>,
	pub request_timeout_secs: u64,
}

impl Default for GitLabConfig {
	fn default() -> Self {
		GitLabConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitLabConfigLayer {
	#[serde(default)]
	pub base_url: Option<String>,
	#[serde(default)]
	pub token: Option<SecretString>,
	#[serde(default)]
	pub request_timeout_secs: Option<u64>,
}

impl GitLabConfigLayer {
	pub fn merge(&mut self, other: GitLabConfigLayer) {
		if other.base_url.is_some() {
			self.base_url = other.base_url;
		}
		if other.token.is_some() {
			self.token = other.token;
		}
		if other.request_timeout_secs.is_some() {
			self.request_timeout_secs = other.request_timeout_secs;
		}
	}

	pub fn finalize(self) -> GitLabConfig {
		GitLabConfig {
			base_url: self
				.base_url
				.map(|url| url.trim_end_matches('/').to_string())
				.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
			token: self.token,
			request_timeout_secs: self
				.request_timeout_secs
				.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = GitLabConfig::default();
		assert_eq!(config.base_url, "https://gitlab.com");
		assert!(config.token.is_none());
		assert_eq!(config.request_timeout_secs, 30);
	}

	#[test]
	fn test_trailing_slash_trimmed() {
		let layer = GitLabConfigLayer {
			base_url: Some("https://gitlab.example.com/".to_string()),
			..Default::default()
		};
		assert_eq!(layer.finalize().base_url, "https://gitlab.example.com");
	}

	#[test]
	fn test_token_from_toml_is_redacted_in_debug() {
		let layer: GitLabConfigLayer = toml::from_str(
			r#"
base_url = "https://gitlab.example.com"
token = "glpat-secret"
"#,
		)
		.unwrap();
		let config = layer.finalize();
		assert_eq!(config.token.as_ref().unwrap().expose(), "glpat-secret");
		assert!(!format!("{config:?}").contains("glpat-secret"));
	}

	#[test]
	fn test_merge_keeps_base_token_when_overlay_has_none() {
		let mut base = GitLabConfigLayer {
			token: Some(SecretString::new("a".to_string())),
			..Default::default()
		};
		base.merge(GitLabConfigLayer {
			base_url: Some("https://git.internal".to_string()),
			..Default::default()
		});
		assert_eq!(base.base_url.as_deref(), Some("https://git.internal"));
		assert_eq!(base.token.as_ref().unwrap().expose(), "a");
	}
}
