// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

/// Stage order used when a project's CI definition is unavailable.
pub const STANDARD_STAGES: [&str; 5] = ["build", "test", "deploy", "release", "cleanup"];

/// Orders the distinct stages of a pipeline.
///
/// With a CI definition, stages follow the definition and stages it does not
/// mention keep their first-seen order at the end. Without one, the standard
/// stages come first and any others follow alphabetically.
pub fn order_stages(seen: &[String], ci_order: Option<&[String]>) -> Vec<String> {
	let mut distinct: Vec<&String> = Vec::new();
	for stage in seen {
		if !distinct.contains(&stage) {
			distinct.push(stage);
		}
	}

	let rank = |stage: &str| -> Option<usize> {
		match ci_order {
			Some(order) => order.iter().position(|s| s == stage),
			None => STANDARD_STAGES.iter().position(|s| *s == stage),
		}
	};

	let (mut known, mut unknown): (Vec<&String>, Vec<&String>) =
		distinct.into_iter().partition(|stage| rank(stage).is_some());
	known.sort_by_key(|stage| rank(stage));
	if ci_order.is_none() {
		unknown.sort();
	}

	known.into_iter().chain(unknown).cloned().collect()
}
