// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! JUnit XML report selection and parsing.

use async_trait::async_trait;
use bytes::Bytes;
use pipewatch_core::{TestCase, TestReport, TestStatus, ZipEntry};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::error::{FetchError, IndexError};

const PREFERRED_REPORT: &str = "junit_report.xml";
const REPORT_HINTS: [&str; 5] = ["junit", "test-result", "test_result", "test-", "report"];
const NO_MESSAGE: &str = "No message";

/// Reads single files out of an artifact archive.
#[async_trait]
pub trait ArchiveReader: Send + Sync {
	async fn read_file(&self, path: &str) -> Result<Bytes, FetchError>;
}

/// Picks the report to parse from an archive listing.
///
/// A path ending in `junit_report.xml` wins; otherwise the first `.xml` file
/// whose path looks like a test report.
pub fn select_report(files: &[ZipEntry]) -> Option<&ZipEntry> {
	let candidates = || files.iter().filter(|f| !f.is_directory);

	candidates()
		.find(|f| f.name.ends_with(PREFERRED_REPORT))
		.or_else(|| {
			candidates().find(|f| {
				let lower = f.name.to_ascii_lowercase();
				lower.ends_with(".xml") && REPORT_HINTS.iter().any(|hint| lower.contains(hint))
			})
		})
}

/// Selects, reads and parses the test report of an archive.
///
/// `Ok(None)` when the archive has no candidate report or the candidate is not
/// valid JUnit XML. Only the first candidate is tried.
#[tracing::instrument(skip(files, reader), fields(files = files.len()))]
pub async fn aggregate_report<R>(files: &[ZipEntry], reader: &R) -> Result<Option<TestReport>, IndexError>
where
	R: ArchiveReader + ?Sized,
{
	let Some(candidate) = select_report(files) else {
		debug!("no test report candidate in archive");
		return Ok(None);
	};

	let raw = reader
		.read_file(&candidate.name)
		.await
		.map_err(IndexError::Fetch)?;
	let text = String::from_utf8_lossy(&raw);

	let report = parse_report(&text, Some(candidate.name.clone()));
	if report.is_none() {
		warn!(path = %candidate.name, "test report is not valid JUnit XML");
	}
	Ok(report)
}

#[derive(Default)]
struct CaseBuilder {
	name: String,
	classname: String,
	duration: f64,
	status: Option<TestStatus>,
	message: Option<String>,
}

impl CaseBuilder {
	fn from_element(element: &BytesStart<'_>) -> Self {
		Self {
			name: attribute(element, "name").unwrap_or_default(),
			classname: attribute(element, "classname").unwrap_or_default(),
			duration: attribute(element, "time")
				.and_then(|t| t.replace(',', "").trim().parse().ok())
				.unwrap_or(0.0),
			status: None,
			message: None,
		}
	}

	fn fail(&mut self, message: Option<String>) {
		self.status = Some(TestStatus::Failed);
		self.message = message;
	}

	fn skip(&mut self, message: Option<String>) {
		if self.status != Some(TestStatus::Failed) {
			self.status = Some(TestStatus::Skipped);
			self.message = message;
		}
	}

	fn build(self) -> TestCase {
		TestCase {
			name: self.name,
			classname: self.classname,
			status: self.status.unwrap_or(TestStatus::Passed),
			duration: self.duration,
			message: self.message,
		}
	}
}

/// Parses a JUnit document rooted at `<testsuites>` or `<testsuite>`.
///
/// Returns `None` for malformed XML or any other root element. A failure or
/// error child marks a case failed and takes precedence over skipped.
pub fn parse_report(xml: &str, report_path: Option<String>) -> Option<TestReport> {
	let mut reader = Reader::from_str(xml);
	reader.config_mut().trim_text(true);

	let mut seen_root = false;
	let mut depth = 0usize;
	let mut suite_depth = 0usize;
	let mut case: Option<CaseBuilder> = None;
	let mut failure_text: Option<String> = None;
	let mut tests = Vec::new();

	loop {
		let event = match reader.read_event() {
			Ok(event) => event,
			Err(e) => {
				debug!(error = %e, "malformed JUnit XML");
				return None;
			}
		};

		match event {
			Event::Start(element) => {
				let name = element.local_name();
				let name = name.as_ref();
				if !seen_root {
					if name != b"testsuites" && name != b"testsuite" {
						return None;
					}
					seen_root = true;
				}
				depth += 1;

				match name {
					b"testsuite" => suite_depth += 1,
					b"testcase" if suite_depth > 0 && case.is_none() => {
						case = Some(CaseBuilder::from_element(&element));
					}
					b"failure" | b"error" => {
						if let Some(case) = case.as_mut() {
							case.fail(attribute(&element, "message"));
							failure_text = Some(String::new());
						}
					}
					b"skipped" => {
						if let Some(case) = case.as_mut() {
							case.skip(attribute(&element, "message"));
						}
					}
					_ => {}
				}
			}
			Event::Empty(element) => {
				let name = element.local_name();
				let name = name.as_ref();
				if !seen_root {
					if name != b"testsuites" && name != b"testsuite" {
						return None;
					}
					seen_root = true;
				}

				match name {
					b"testcase" if suite_depth > 0 && case.is_none() => {
						tests.push(CaseBuilder::from_element(&element).build());
					}
					b"failure" | b"error" => {
						if let Some(case) = case.as_mut() {
							let message = attribute(&element, "message")
								.unwrap_or_else(|| NO_MESSAGE.to_string());
							case.fail(Some(message));
						}
					}
					b"skipped" => {
						if let Some(case) = case.as_mut() {
							case.skip(attribute(&element, "message"));
						}
					}
					_ => {}
				}
			}
			Event::Text(text) => {
				if let Some(buffer) = failure_text.as_mut() {
					let text = text.unescape().ok()?;
					buffer.push_str(&text);
				}
			}
			Event::CData(data) => {
				if let Some(buffer) = failure_text.as_mut() {
					buffer.push_str(&String::from_utf8_lossy(&data));
				}
			}
			Event::End(element) => {
				depth = depth.saturating_sub(1);
				match element.local_name().as_ref() {
					b"testsuite" => suite_depth = suite_depth.saturating_sub(1),
					b"testcase" => {
						if let Some(done) = case.take() {
							tests.push(done.build());
						}
					}
					b"failure" | b"error" => {
						if let (Some(case), Some(text)) = (case.as_mut(), failure_text.take()) {
							if case.message.is_none() {
								let text = text.trim();
								case.message = Some(if text.is_empty() {
									NO_MESSAGE.to_string()
								} else {
									text.to_string()
								});
							}
						}
					}
					_ => {}
				}
			}
			Event::Eof => break,
			_ => {}
		}
	}

	if !seen_root || depth != 0 {
		return None;
	}
	Some(TestReport::from_cases(tests, report_path))
}

/// A blank attribute counts as absent.
fn attribute(element: &BytesStart<'_>, key: &str) -> Option<String> {
	element
		.try_get_attribute(key)
		.ok()
		.flatten()
		.and_then(|attr| attr.unescape_value().ok())
		.filter(|value| !value.trim().is_empty())
		.map(|value| value.into_owned())
}
