// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lists the contents of a ZIP archive from its central directory.
//!
//! Only the tail of the archive is fetched: the End-Of-Central-Directory record
//! points at the central directory, which carries every entry's name and size.
//! A well-formed archive is listed with at most two range requests no matter
//! how large its body is.

use std::ops::Range;

use async_trait::async_trait;
use bytes::Bytes;
use pipewatch_core::ZipEntry;
use serde::Serialize;
use tracing::warn;

use crate::error::{FetchError, IndexError};

/// Size of the first request, taken from the end of the archive.
pub const TAIL_FETCH_BYTES: u64 = 256 * 1024;

pub(crate) const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
pub(crate) const EOCD_LEN: usize = 22;
pub(crate) const CENTRAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];
pub(crate) const CENTRAL_HEADER_LEN: usize = 46;
const ZIP64_MARKER: u32 = 0xFFFF_FFFF;

/// Reads byte ranges of a remote archive.
#[async_trait]
pub trait RangeFetcher: Send + Sync {
	/// Returns the bytes in `range` (end exclusive).
	async fn fetch_range(&self, range: Range<u64>) -> Result<Bytes, FetchError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ZipListing {
	pub entries: Vec<ZipEntry>,
	/// The central directory ended early; `entries` holds what was readable.
	pub truncated: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ZipIndexer {
	tail_bytes: u64,
}

impl Default for ZipIndexer {
	fn default() -> Self {
		Self {
			tail_bytes: TAIL_FETCH_BYTES,
		}
	}
}

struct EndOfCentralDirectory {
	entry_count: u16,
	offset: u64,
}

impl ZipIndexer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Lists every entry of an archive of `total_size` bytes.
	#[tracing::instrument(skip(self, fetcher))]
	pub async fn list_files<F>(&self, total_size: u64, fetcher: &F) -> Result<ZipListing, IndexError>
	where
		F: RangeFetcher + ?Sized,
	{
		if total_size < EOCD_LEN as u64 {
			return Err(IndexError::NoCentralDirectory);
		}

		let tail_len = self.tail_bytes.min(total_size);
		let tail = fetcher
			.fetch_range(total_size - tail_len..total_size)
			.await
			.map_err(IndexError::Fetch)?;
		let tail_start = total_size.saturating_sub(tail.len() as u64);

		let eocd = find_eocd(&tail)?;
		if eocd.offset > total_size {
			return Err(IndexError::InvalidDirectory(format!(
				"central directory offset {} beyond archive size {total_size}",
				eocd.offset
			)));
		}

		let directory = if eocd.offset >= tail_start {
			tail.slice((eocd.offset - tail_start) as usize..)
		} else {
			fetcher
				.fetch_range(eocd.offset..total_size)
				.await
				.map_err(IndexError::Fetch)?
		};

		Ok(read_central_directory(&directory, eocd.entry_count))
	}
}

fn find_eocd(tail: &[u8]) -> Result<EndOfCentralDirectory, IndexError> {
	if tail.len() < EOCD_LEN {
		return Err(IndexError::NoCentralDirectory);
	}

	let pos = (0..=tail.len() - EOCD_LEN)
		.rev()
		.find(|&i| tail[i..i + 4] == EOCD_SIGNATURE)
		.ok_or(IndexError::NoCentralDirectory)?;
	let record = &tail[pos..pos + EOCD_LEN];

	let entry_count = read_u16(record, 10);
	let size = read_u32(record, 12);
	let offset = read_u32(record, 16);
	if offset == ZIP64_MARKER || size == ZIP64_MARKER {
		return Err(IndexError::Zip64Unsupported);
	}

	Ok(EndOfCentralDirectory {
		entry_count,
		offset: u64::from(offset),
	})
}

fn read_central_directory(data: &[u8], entry_count: u16) -> ZipListing {
	let mut listing = ZipListing {
		entries: Vec::with_capacity(entry_count as usize),
		truncated: false,
	};

	let mut pos = 0usize;
	for index in 0..entry_count {
		let header_end = pos + CENTRAL_HEADER_LEN;
		if header_end > data.len() {
			warn!(index, entry_count, "central directory header exceeds buffered data");
			listing.truncated = true;
			break;
		}
		if data[pos..pos + 4] != CENTRAL_HEADER_SIGNATURE {
			warn!(index, entry_count, "bad central directory header signature");
			listing.truncated = true;
			break;
		}

		let size = read_u32(data, pos + 24);
		let name_len = read_u16(data, pos + 28) as usize;
		let extra_len = read_u16(data, pos + 30) as usize;
		let comment_len = read_u16(data, pos + 32) as usize;

		let name_end = header_end + name_len;
		if name_end > data.len() {
			warn!(index, entry_count, "central directory file name exceeds buffered data");
			listing.truncated = true;
			break;
		}

		let name = String::from_utf8_lossy(&data[header_end..name_end]).into_owned();
		listing.entries.push(ZipEntry {
			is_directory: name.ends_with('/'),
			name,
			size: u64::from(size),
		});

		pos = name_end + extra_len + comment_len;
	}

	listing
}

fn read_u16(data: &[u8], at: usize) -> u16 {
	u16::from_le_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
	u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{build_zip, build_zip_with_padding, RecordingFetcher};
	use proptest::prelude::*;

	#[tokio::test]
	async fn lists_small_archive_with_one_request() {
		let zip = build_zip(&[
			("reports/", ""),
			("reports/junit_report.xml", "<testsuite/>"),
			("coverage.txt", "87%"),
		]);
		let fetcher = RecordingFetcher::new(zip);

		let listing = ZipIndexer::new()
			.list_files(fetcher.len(), &fetcher)
			.await
			.unwrap();

		assert!(!listing.truncated);
		assert_eq!(
			listing.entries,
			vec![
				ZipEntry {
					name: "reports/".to_string(),
					size: 0,
					is_directory: true
				},
				ZipEntry {
					name: "reports/junit_report.xml".to_string(),
					size: 12,
					is_directory: false
				},
				ZipEntry {
					name: "coverage.txt".to_string(),
					size: 3,
					is_directory: false
				},
			]
		);
		assert_eq!(fetcher.requests(), vec![0..fetcher.len()]);
	}

	#[tokio::test]
	async fn large_body_still_fetches_only_the_tail() {
		let zip = build_zip_with_padding(&[("a.txt", "x")], 1_000_000);
		let fetcher = RecordingFetcher::new(zip);
		let total = fetcher.len();

		let listing = ZipIndexer::new().list_files(total, &fetcher).await.unwrap();

		assert_eq!(listing.entries.len(), 1);
		assert_eq!(fetcher.requests(), vec![total - TAIL_FETCH_BYTES..total]);
	}

	#[tokio::test]
	async fn directory_larger_than_tail_takes_a_second_request() {
		let names: Vec<String> = (0..2_000)
			.map(|i| format!("logs/{}/{i:05}.log", "x".repeat(120)))
			.collect();
		let entries: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "")).collect();
		let fetcher = RecordingFetcher::new(build_zip(&entries));
		let total = fetcher.len();

		let listing = ZipIndexer::new().list_files(total, &fetcher).await.unwrap();

		assert_eq!(listing.entries.len(), 2_000);
		assert!(!listing.truncated);
		let requests = fetcher.requests();
		assert_eq!(requests.len(), 2);
		assert_eq!(requests[0], total - TAIL_FETCH_BYTES..total);
		assert_eq!(requests[1].end, total);
		assert!(requests[1].start < requests[0].start);
	}

	#[tokio::test]
	async fn missing_eocd_is_an_error() {
		let fetcher = RecordingFetcher::new(vec![0u8; 4096]);
		let result = ZipIndexer::new().list_files(fetcher.len(), &fetcher).await;
		assert!(matches!(result, Err(IndexError::NoCentralDirectory)));

		let tiny = RecordingFetcher::new(vec![0u8; 4]);
		let result = ZipIndexer::new().list_files(tiny.len(), &tiny).await;
		assert!(matches!(result, Err(IndexError::NoCentralDirectory)));
		assert!(tiny.requests().is_empty());
	}

	#[tokio::test]
	async fn overstated_entry_count_degrades_to_partial_listing() {
		let mut zip = build_zip(&[("one.txt", "1"), ("two.txt", "22")]);
		let eocd = zip.len() - EOCD_LEN;
		zip[eocd + 10..eocd + 12].copy_from_slice(&5u16.to_le_bytes());
		let fetcher = RecordingFetcher::new(zip);

		let listing = ZipIndexer::new()
			.list_files(fetcher.len(), &fetcher)
			.await
			.unwrap();

		assert!(listing.truncated);
		assert_eq!(listing.entries.len(), 2);
	}

	#[tokio::test]
	async fn zip64_marker_is_rejected() {
		let mut zip = build_zip(&[("one.txt", "1")]);
		let eocd = zip.len() - EOCD_LEN;
		zip[eocd + 16..eocd + 20].copy_from_slice(&ZIP64_MARKER.to_le_bytes());
		let fetcher = RecordingFetcher::new(zip);

		let result = ZipIndexer::new().list_files(fetcher.len(), &fetcher).await;
		assert!(matches!(result, Err(IndexError::Zip64Unsupported)));
	}

	#[tokio::test]
	async fn offset_past_end_is_invalid() {
		let mut zip = build_zip(&[("one.txt", "1")]);
		let eocd = zip.len() - EOCD_LEN;
		zip[eocd + 16..eocd + 20].copy_from_slice(&0x00FF_FFFFu32.to_le_bytes());
		let fetcher = RecordingFetcher::new(zip);

		let result = ZipIndexer::new().list_files(fetcher.len(), &fetcher).await;
		assert!(matches!(result, Err(IndexError::InvalidDirectory(_))));
	}

	#[tokio::test]
	async fn fetch_failures_propagate() {
		struct Failing;

		#[async_trait]
		impl RangeFetcher for Failing {
			async fn fetch_range(&self, _range: Range<u64>) -> Result<Bytes, FetchError> {
				Err("upstream returned 502".into())
			}
		}

		let result = ZipIndexer::new().list_files(1024, &Failing).await;
		assert!(matches!(result, Err(IndexError::Fetch(_))));
	}

	proptest! {
		#[test]
		fn every_entry_is_listed(names in proptest::collection::vec("[a-z]{1,6}(/[a-z]{1,6}){0,3}/?", 1..60)) {
			let entries: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "data")).collect();
			let fetcher = RecordingFetcher::new(build_zip(&entries));

			let listing = futures::executor::block_on(ZipIndexer::new().list_files(fetcher.len(), &fetcher)).unwrap();

			prop_assert_eq!(listing.entries.len(), names.len());
			prop_assert!(fetcher.requests().len() <= 2);
			for (entry, name) in listing.entries.iter().zip(&names) {
				prop_assert_eq!(&entry.name, name);
				prop_assert_eq!(entry.is_directory, name.ends_with('/'));
			}
		}
	}
}
