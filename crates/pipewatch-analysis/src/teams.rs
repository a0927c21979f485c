// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Best-effort grouping of test reports by owning team.
//!
//! Rules are tried in order. A rule applies when its project pattern matches
//! and its marker is one of the report path's directory segments; the team is
//! the directory right after (or before) the marker.

pub const DEFAULT_TEAM: &str = "default";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MarkerPosition {
	#[default]
	After,
	Before,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRule {
	/// Case-insensitive substring of the project path; `None` matches all.
	pub project: Option<String>,
	pub marker: String,
	pub position: MarkerPosition,
}

impl TeamRule {
	fn applies_to(&self, project_path: &str) -> bool {
		match &self.project {
			Some(pattern) => project_path
				.to_lowercase()
				.contains(&pattern.to_lowercase()),
			None => true,
		}
	}

	fn team_in(&self, report_path: &str) -> Option<String> {
		let segments: Vec<&str> = report_path.split('/').filter(|s| !s.is_empty()).collect();
		// The last segment is the report file itself.
		let directories = segments.split_last().map(|(_, dirs)| dirs)?;

		let index = directories
			.iter()
			.position(|segment| segment.eq_ignore_ascii_case(&self.marker))?;
		let team = match self.position {
			MarkerPosition::After => directories.get(index + 1),
			MarkerPosition::Before => index.checked_sub(1).and_then(|i| directories.get(i)),
		}?;
		Some(team.to_string())
	}
}

#[derive(Debug, Clone, Default)]
pub struct TeamClassifier {
	rules: Vec<TeamRule>,
}

impl TeamClassifier {
	pub fn new(rules: Vec<TeamRule>) -> Self {
		Self { rules }
	}

	/// Team label for a report; [`DEFAULT_TEAM`] when no rule matches.
	pub fn classify(&self, project_path: &str, report_path: Option<&str>) -> String {
		report_path
			.and_then(|path| {
				self
					.rules
					.iter()
					.filter(|rule| rule.applies_to(project_path))
					.find_map(|rule| rule.team_in(path))
			})
			.unwrap_or_else(|| DEFAULT_TEAM.to_string())
	}
}
