// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-wide sync cursor.
//!
//! Readers that must wait for the first sync check [`SyncState::phase`]. The
//! first pass moves the phase to `Complete` whatever its outcome, so a failing
//! upstream never leaves them waiting.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
	NotStarted,
	InProgress,
	Complete,
}

/// Outcome of one finished pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
	pub pipelines_synced: u64,
	pub projects_synced: u64,
	pub failures: u64,
	pub started_at: DateTime<Utc>,
	pub finished_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Cursor {
	phase: SyncPhase,
	last_summary: Option<SyncSummary>,
}

#[derive(Debug)]
pub struct SyncState {
	cursor: RwLock<Cursor>,
	loop_active: AtomicBool,
}

impl Default for SyncState {
	fn default() -> Self {
		Self::new()
	}
}

impl SyncState {
	pub fn new() -> Self {
		Self {
			cursor: RwLock::new(Cursor {
				phase: SyncPhase::NotStarted,
				last_summary: None,
			}),
			loop_active: AtomicBool::new(true),
		}
	}

	pub async fn phase(&self) -> SyncPhase {
		self.cursor.read().await.phase
	}

	pub async fn initial_sync_complete(&self) -> bool {
		self.phase().await == SyncPhase::Complete
	}

	pub async fn last_summary(&self) -> Option<SyncSummary> {
		self.cursor.read().await.last_summary.clone()
	}

	/// Marks a pass as started. Only the first pass changes the phase.
	pub async fn begin_pass(&self) {
		let mut cursor = self.cursor.write().await;
		if cursor.phase == SyncPhase::NotStarted {
			cursor.phase = SyncPhase::InProgress;
		}
	}

	pub async fn finish_pass(&self, summary: SyncSummary) {
		let mut cursor = self.cursor.write().await;
		if cursor.phase != SyncPhase::Complete {
			info!(
				pipelines_synced = summary.pipelines_synced,
				failures = summary.failures,
				"Initial sync complete"
			);
		}
		cursor.phase = SyncPhase::Complete;
		cursor.last_summary = Some(summary);
	}

	pub fn loop_active(&self) -> bool {
		self.loop_active.load(Ordering::SeqCst)
	}

	/// Stops or restarts scheduling of future passes. A pass already running
	/// is not interrupted.
	pub fn set_loop_active(&self, active: bool) {
		self.loop_active.store(active, Ordering::SeqCst);
	}
}
