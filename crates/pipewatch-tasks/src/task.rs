// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use pipewatch_db::RunTrigger;
use tokio::sync::watch;

use crate::error::TaskError;

#[async_trait]
pub trait Task: Send + Sync {
	/// Stable identifier, the key of the task's run history.
	fn id(&self) -> &'static str;
	fn name(&self) -> &'static str;

	async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError>;
}

/// What a successful run did, stored with the run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
	pub summary: String,
	pub details: Option<serde_json::Value>,
}

impl TaskReport {
	pub fn new(summary: impl Into<String>) -> Self {
		Self {
			summary: summary.into(),
			details: None,
		}
	}

	pub fn with_details(mut self, details: serde_json::Value) -> Self {
		self.details = Some(details);
		self
	}
}

pub struct TaskContext {
	pub run_id: String,
	pub trigger: RunTrigger,
	/// Starts at 1; retries of the same run increment it.
	pub attempt: u32,
	pub shutdown: ShutdownSignal,
}

impl TaskContext {
	/// Context for a run outside any scheduler; shutdown is never requested.
	pub fn detached(trigger: RunTrigger) -> Self {
		Self {
			run_id: uuid::Uuid::new_v4().to_string(),
			trigger,
			attempt: 1,
			shutdown: ShutdownSignal::never(),
		}
	}

	/// `Err(Cancelled)` once the scheduler is shutting down.
	pub fn ensure_running(&self) -> Result<(), TaskError> {
		if self.shutdown.is_requested() {
			return Err(TaskError::Cancelled);
		}
		Ok(())
	}
}

/// Observes the owning scheduler's shutdown. Every run of one scheduler shares
/// the same signal.
#[derive(Clone, Debug)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
	/// The sending half requests shutdown with `send(true)`.
	pub fn channel() -> (watch::Sender<bool>, Self) {
		let (tx, rx) = watch::channel(false);
		(tx, Self(rx))
	}

	pub fn never() -> Self {
		Self::channel().1
	}

	pub fn is_requested(&self) -> bool {
		*self.0.borrow()
	}

	/// Resolves once shutdown is requested. Pends forever if the sender is gone
	/// without having requested it.
	pub async fn requested(&mut self) {
		if self.0.wait_for(|stop| *stop).await.is_err() {
			std::future::pending::<()>().await;
		}
	}
}
