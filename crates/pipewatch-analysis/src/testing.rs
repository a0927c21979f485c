// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory archives for tests of code that indexes artifacts.

use std::ops::Range;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FetchError;
use crate::zip::{
	RangeFetcher, CENTRAL_HEADER_LEN, CENTRAL_HEADER_SIGNATURE, EOCD_LEN, EOCD_SIGNATURE,
};

/// Builds a stored (uncompressed) archive of `(name, body)` entries.
///
/// The central directory and EOCD are exact; local headers carry only the
/// signature and name.
pub fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
	build_zip_with_padding(entries, 0)
}

/// Like [`build_zip`] with `padding` zero bytes before the first entry.
pub fn build_zip_with_padding(entries: &[(&str, &str)], padding: usize) -> Vec<u8> {
	let mut out = vec![0u8; padding];
	let mut offsets = Vec::with_capacity(entries.len());
	for (name, body) in entries {
		offsets.push(out.len() as u32);
		out.extend_from_slice(&[0x50, 0x4B, 0x03, 0x04]);
		out.extend_from_slice(&[0u8; 22]);
		out.extend_from_slice(&(name.len() as u16).to_le_bytes());
		out.extend_from_slice(&0u16.to_le_bytes());
		out.extend_from_slice(name.as_bytes());
		out.extend_from_slice(body.as_bytes());
	}

	let cd_offset = out.len() as u32;
	for ((name, body), offset) in entries.iter().zip(offsets) {
		let mut header = vec![0u8; CENTRAL_HEADER_LEN];
		header[..4].copy_from_slice(&CENTRAL_HEADER_SIGNATURE);
		header[20..24].copy_from_slice(&(body.len() as u32).to_le_bytes());
		header[24..28].copy_from_slice(&(body.len() as u32).to_le_bytes());
		header[28..30].copy_from_slice(&(name.len() as u16).to_le_bytes());
		header[42..46].copy_from_slice(&offset.to_le_bytes());
		out.extend_from_slice(&header);
		out.extend_from_slice(name.as_bytes());
	}
	let cd_size = out.len() as u32 - cd_offset;

	let mut eocd = vec![0u8; EOCD_LEN];
	eocd[..4].copy_from_slice(&EOCD_SIGNATURE);
	eocd[8..10].copy_from_slice(&(entries.len() as u16).to_le_bytes());
	eocd[10..12].copy_from_slice(&(entries.len() as u16).to_le_bytes());
	eocd[12..16].copy_from_slice(&cd_size.to_le_bytes());
	eocd[16..20].copy_from_slice(&cd_offset.to_le_bytes());
	out.extend_from_slice(&eocd);
	out
}

/// Serves ranges of an in-memory archive and records each request.
pub struct RecordingFetcher {
	data: Bytes,
	requests: Mutex<Vec<Range<u64>>>,
}

impl RecordingFetcher {
	pub fn new(data: Vec<u8>) -> Self {
		Self {
			data: Bytes::from(data),
			requests: Mutex::new(Vec::new()),
		}
	}

	pub fn len(&self) -> u64 {
		self.data.len() as u64
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	pub fn requests(&self) -> Vec<Range<u64>> {
		self.requests.lock().unwrap().clone()
	}
}

#[async_trait]
impl RangeFetcher for RecordingFetcher {
	async fn fetch_range(&self, range: Range<u64>) -> Result<Bytes, FetchError> {
		self.requests.lock().unwrap().push(range.clone());
		let end = (range.end as usize).min(self.data.len());
		let start = (range.start as usize).min(end);
		Ok(self.data.slice(start..end))
	}
}
