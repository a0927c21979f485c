// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scheduled tasks run by `pipewatch serve`.

mod cache_prune;
mod history_prune;
mod sync;

pub use cache_prune::{CachePruneTask, CACHE_PRUNE_TASK_ID};
pub use history_prune::{HistoryPruneTask, HISTORY_PRUNE_TASK_ID};
pub use sync::{SyncTask, SYNC_TASK_ID};
