// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::LazyLock;

use pipewatch_core::{LogAnnotation, Severity};
use regex::RegexSet;

static FAILURE_SIGNATURES: LazyLock<RegexSet> = LazyLock::new(|| {
	RegexSet::new([
		r"(?i)ERROR",
		r"(?i)FAILED",
		r"(?i)Exception",
		r"(?i)Traceback",
		r"(?i)FATAL",
		r"(?i)\[ERR\]",
		r"(?i)error:",
		r"(?i)failed",
	])
	.unwrap()
});

/// Annotates every log line that matches a failure signature, in line order.
///
/// Lines are split on `\n` only and annotated with their content unchanged,
/// so a CRLF log keeps its `\r`. A line is annotated at most once. Lines
/// mentioning `ERROR` or `FAILED` are errors, other matches are warnings.
pub fn annotate(raw_log: &str) -> Vec<LogAnnotation> {
	raw_log
		.split('\n')
		.enumerate()
		.filter_map(|(index, line)| {
			if !FAILURE_SIGNATURES.is_match(line) {
				return None;
			}
			Some(LogAnnotation {
				line_number: index + 1,
				content: line.to_string(),
				severity: severity(line),
			})
		})
		.collect()
}

fn severity(line: &str) -> Severity {
	let upper = line.to_uppercase();
	if upper.contains("ERROR") || upper.contains("FAILED") {
		Severity::Error
	} else {
		Severity::Warning
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn single_error_line_in_ten() {
		let log = [
			"$ cargo test",
			"   Compiling app v0.1.0",
			"    Finished test profile",
			"     Running unittests",
			"WARN: deprecated flag",
			"running 12 tests",
			"ERROR: database unreachable",
			"test result: ok",
			"cleaning up",
			"done",
		]
		.join("\n");

		let annotations = annotate(&log);
		assert_eq!(
			annotations,
			vec![LogAnnotation {
				line_number: 7,
				content: "ERROR: database unreachable".to_string(),
				severity: Severity::Error,
			}]
		);
	}

	#[test]
	fn non_error_signatures_are_warnings() {
		let log = "Traceback (most recent call last):\nValueError raised\nFatal: disk full\n[err] retrying\nall good";
		let annotations = annotate(log);
		let summary: Vec<_> = annotations
			.iter()
			.map(|a| (a.line_number, a.severity))
			.collect();
		assert_eq!(
			summary,
			vec![
				(1, Severity::Warning),
				(2, Severity::Error),
				(3, Severity::Warning),
				(4, Severity::Warning),
			]
		);
	}

	#[test]
	fn matching_is_case_insensitive_and_keeps_line_content() {
		let annotations = annotate("step one\r\n2 tests Failed\r\n");
		assert_eq!(annotations.len(), 1);
		assert_eq!(annotations[0].line_number, 2);
		assert_eq!(annotations[0].content, "2 tests Failed\r");
		assert_eq!(annotations[0].severity, Severity::Error);
	}

	#[test]
	fn empty_log_has_no_annotations() {
		assert!(annotate("").is_empty());
	}

	proptest! {
		#[test]
		fn annotations_are_ordered_unique_and_in_range(
			lines in proptest::collection::vec("(ok|ERROR x|FAILED|fatal|[a-z ]{0,12}|Exception)", 0..50)
		) {
			let log = lines.join("\n");
			let annotations = annotate(&log);
			for pair in annotations.windows(2) {
				prop_assert!(pair[0].line_number < pair[1].line_number);
			}
			for annotation in &annotations {
				prop_assert!(annotation.line_number >= 1);
				prop_assert!(annotation.line_number <= lines.len().max(1));
				prop_assert_eq!(&annotation.content, &lines[annotation.line_number - 1]);
			}
		}
	}
}
