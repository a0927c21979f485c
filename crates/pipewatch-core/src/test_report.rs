// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
	Passed,
	Failed,
	Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
	pub name: String,
	pub classname: String,
	pub status: TestStatus,
	/// Seconds.
	pub duration: f64,
	#[serde(default)]
	pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
	pub total: u32,
	pub passed: u32,
	pub failed: u32,
	pub skipped: u32,
}

impl AddAssign for TestCounts {
	fn add_assign(&mut self, other: Self) {
		self.total += other.total;
		self.passed += other.passed;
		self.failed += other.failed;
		self.skipped += other.skipped;
	}
}

/// Normalized results of one JUnit report.
///
/// Built through [`TestReport::from_cases`] so `total == passed + failed +
/// skipped` and `tests.len() == total` always hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
	pub total: u32,
	pub passed: u32,
	pub failed: u32,
	pub skipped: u32,
	pub tests: Vec<TestCase>,
	/// Path of the report inside the artifact archive.
	#[serde(default)]
	pub report_path: Option<String>,
}

impl TestReport {
	pub fn from_cases(tests: Vec<TestCase>, report_path: Option<String>) -> Self {
		let mut counts = TestCounts::default();
		for case in &tests {
			counts.total += 1;
			match case.status {
				TestStatus::Passed => counts.passed += 1,
				TestStatus::Failed => counts.failed += 1,
				TestStatus::Skipped => counts.skipped += 1,
			}
		}
		Self {
			total: counts.total,
			passed: counts.passed,
			failed: counts.failed,
			skipped: counts.skipped,
			tests,
			report_path,
		}
	}

	pub fn counts(&self) -> TestCounts {
		TestCounts {
			total: self.total,
			passed: self.passed,
			failed: self.failed,
			skipped: self.skipped,
		}
	}

	pub fn is_consistent(&self) -> bool {
		self.total == self.passed + self.failed + self.skipped && self.tests.len() == self.total as usize
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn case(status: TestStatus) -> TestCase {
		TestCase {
			name: "t".to_string(),
			classname: "c".to_string(),
			status,
			duration: 0.1,
			message: None,
		}
	}

	#[test]
	fn from_cases_counts_each_status() {
		let report = TestReport::from_cases(
			vec![
				case(TestStatus::Passed),
				case(TestStatus::Failed),
				case(TestStatus::Skipped),
				case(TestStatus::Passed),
			],
			None,
		);
		assert_eq!(report.total, 4);
		assert_eq!(report.passed, 2);
		assert_eq!(report.failed, 1);
		assert_eq!(report.skipped, 1);
		assert!(report.is_consistent());
	}

	#[test]
	fn counts_accumulate() {
		let mut total = TestCounts::default();
		total += TestReport::from_cases(vec![case(TestStatus::Passed)], None).counts();
		total += TestReport::from_cases(vec![case(TestStatus::Failed)], None).counts();
		assert_eq!(
			total,
			TestCounts {
				total: 2,
				passed: 1,
				failed: 1,
				skipped: 0
			}
		);
	}
}
