// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CiDefinition {
	#[serde(default)]
	stages: Option<Vec<String>>,
}

/// Reads the top-level `stages` list of a `.gitlab-ci.yml`.
///
/// Unparseable YAML and definitions without stages yield `None`.
pub fn parse_stage_order(yaml: &str) -> Option<Vec<String>> {
	match serde_yaml::from_str::<CiDefinition>(yaml) {
		Ok(definition) => definition.stages.filter(|stages| !stages.is_empty()),
		Err(e) => {
			debug!(error = %e, "could not parse CI definition");
			None
		}
	}
}
