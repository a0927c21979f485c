// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runs tasks on fixed intervals or on demand and records every run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use pipewatch_db::{RunStatus, RunTrigger, ScheduledTask, TaskRun, TaskRunStore};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, instrument, warn};

use crate::error::{Result, TaskError};
use crate::task::{ShutdownSignal, Task, TaskContext};

/// Retries of a run whose task failed with a retryable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// First attempt included.
	pub max_attempts: u32,
	pub first_delay: Duration,
	pub max_delay: Duration,
}

impl RetryPolicy {
	/// Wait after failed attempt `attempt`; doubles per attempt up to `max_delay`.
	pub fn delay_after(&self, attempt: u32) -> Duration {
		let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
		self.first_delay.saturating_mul(factor).min(self.max_delay)
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 4,
			first_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(60),
		}
	}
}

#[derive(Clone)]
struct Runner {
	task: Arc<dyn Task>,
	store: Arc<dyn TaskRunStore>,
	retry: RetryPolicy,
	shutdown: ShutdownSignal,
}

impl Runner {
	/// One run: attempts until success, a permanent failure, retries running
	/// out or shutdown. Only history writes surface as `Err`.
	async fn run(&self, trigger: RunTrigger) -> Result<TaskRun> {
		let task_id = self.task.id();
		let mut run = TaskRun::start(uuid::Uuid::new_v4().to_string(), task_id, trigger);
		self.store.record_run(&run).await?;

		loop {
			run.attempts += 1;
			let ctx = TaskContext {
				run_id: run.id.clone(),
				trigger,
				attempt: run.attempts,
				shutdown: self.shutdown.clone(),
			};

			match self.task.run(&ctx).await {
				Ok(report) => {
					run.summary = Some(report.summary);
					run.details = report.details;
					run.finish(RunStatus::Succeeded);
				}
				Err(TaskError::Cancelled) => run.finish(RunStatus::Cancelled),
				Err(e) if e.is_retryable() && run.attempts < self.retry.max_attempts => {
					let delay = self.retry.delay_after(run.attempts);
					warn!(
						task_id,
						run_id = %run.id,
						attempt = run.attempts,
						delay_ms = delay.as_millis() as u64,
						error = %e,
						"task attempt failed, retrying"
					);
					let mut shutdown = self.shutdown.clone();
					tokio::select! {
						_ = tokio::time::sleep(delay) => continue,
						_ = shutdown.requested() => {
							run.error = Some(e.to_string());
							run.finish(RunStatus::Cancelled);
						}
					}
				}
				Err(e) => {
					run.error = Some(e.to_string());
					run.finish(RunStatus::Failed);
				}
			}
			break;
		}

		self.store.record_run(&run).await?;
		match run.status {
			RunStatus::Failed => warn!(
				task_id,
				run_id = %run.id,
				attempts = run.attempts,
				error = run.error.as_deref().unwrap_or_default(),
				"task run failed"
			),
			status => info!(
				task_id,
				run_id = %run.id,
				?status,
				duration_ms = run.duration_ms(),
				summary = run.summary.as_deref().unwrap_or_default(),
				"task run finished"
			),
		}
		Ok(run)
	}
}

struct Entry {
	runner: Runner,
	every: Option<Duration>,
}

impl Entry {
	fn scheduled_task(&self) -> ScheduledTask {
		ScheduledTask {
			id: self.runner.task.id().to_string(),
			name: self.runner.task.name().to_string(),
			interval_secs: self.every.map(|every| every.as_secs()),
		}
	}
}

pub struct TaskScheduler {
	entries: BTreeMap<&'static str, Entry>,
	store: Arc<dyn TaskRunStore>,
	retry: RetryPolicy,
	shutdown_tx: watch::Sender<bool>,
	shutdown: ShutdownSignal,
	loops: Mutex<JoinSet<()>>,
}

impl TaskScheduler {
	pub fn new(store: Arc<dyn TaskRunStore>) -> Self {
		let (shutdown_tx, shutdown) = ShutdownSignal::channel();
		Self {
			entries: BTreeMap::new(),
			store,
			retry: RetryPolicy::default(),
			shutdown_tx,
			shutdown,
			loops: Mutex::new(JoinSet::new()),
		}
	}

	/// Applies to tasks added after this call.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;
		self
	}

	/// Runs `task` every `interval` once started; the first run is one interval in.
	pub fn every(&mut self, task: Arc<dyn Task>, interval: Duration) {
		self.add(task, Some(interval));
	}

	/// Runs `task` only through [`TaskScheduler::run_now`].
	pub fn on_demand(&mut self, task: Arc<dyn Task>) {
		self.add(task, None);
	}

	fn add(&mut self, task: Arc<dyn Task>, every: Option<Duration>) {
		let runner = Runner {
			task,
			store: Arc::clone(&self.store),
			retry: self.retry,
			shutdown: self.shutdown.clone(),
		};
		self.entries.insert(runner.task.id(), Entry { runner, every });
	}

	pub fn task_ids(&self) -> Vec<&'static str> {
		self.entries.keys().copied().collect()
	}

	/// Records every task in the run history and spawns the interval loops.
	#[instrument(skip(self))]
	pub async fn start(&self) -> Result<()> {
		let mut loops = self.loops.lock().await;

		for entry in self.entries.values() {
			self.store.register_task(&entry.scheduled_task()).await?;

			let Some(every) = entry.every else {
				continue;
			};
			let runner = entry.runner.clone();
			loops.spawn(async move {
				let mut ticks = tokio::time::interval_at(Instant::now() + every, every);
				ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
				let mut shutdown = runner.shutdown.clone();
				loop {
					tokio::select! {
						_ = ticks.tick() => {
							if let Err(e) = runner.run(RunTrigger::Schedule).await {
								warn!(task_id = runner.task.id(), error = %e, "could not record task run");
							}
						}
						_ = shutdown.requested() => break,
					}
				}
			});
		}

		info!(
			tasks = self.entries.len(),
			loops = loops.len(),
			"task scheduler started"
		);
		Ok(())
	}

	/// Runs a task now, outside its interval, and waits for the run to finish.
	#[instrument(skip(self))]
	pub async fn run_now(&self, task_id: &str, trigger: RunTrigger) -> Result<TaskRun> {
		let entry = self
			.entries
			.get(task_id)
			.ok_or_else(|| TaskError::Unknown(task_id.to_string()))?;
		self.store.register_task(&entry.scheduled_task()).await?;
		entry.runner.run(trigger).await
	}

	/// Signals every loop and in-flight run, then waits for the loops to exit.
	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(true);

		let mut loops = self.loops.lock().await;
		while let Some(joined) = loops.join_next().await {
			if let Err(e) = joined {
				warn!(error = %e, "task loop ended abnormally");
			}
		}
		info!("task scheduler shut down");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::task::TaskReport;
	use async_trait::async_trait;
	use pipewatch_db::testing::create_test_pool;
	use pipewatch_db::TaskRunRepository;
	use std::sync::atomic::{AtomicU32, Ordering};

	struct CountingTask {
		id: &'static str,
		calls: AtomicU32,
		fail_first: u32,
		retryable: bool,
	}

	impl CountingTask {
		fn new(id: &'static str) -> Self {
			Self {
				id,
				calls: AtomicU32::new(0),
				fail_first: 0,
				retryable: false,
			}
		}

		fn failing(id: &'static str, fail_first: u32, retryable: bool) -> Self {
			Self {
				fail_first,
				retryable,
				..Self::new(id)
			}
		}

		fn calls(&self) -> u32 {
			self.calls.load(Ordering::SeqCst)
		}
	}

	#[async_trait]
	impl Task for CountingTask {
		fn id(&self) -> &'static str {
			self.id
		}

		fn name(&self) -> &'static str {
			"Counting"
		}

		async fn run(&self, ctx: &TaskContext) -> std::result::Result<TaskReport, TaskError> {
			ctx.ensure_running()?;
			let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
			if call <= self.fail_first {
				return Err(TaskError::Failed {
					message: format!("attempt {call} failed"),
					retryable: self.retryable,
				});
			}
			Ok(TaskReport::new(format!("call {call}")).with_details(serde_json::json!({ "call": call })))
		}
	}

	fn quick_retry() -> RetryPolicy {
		RetryPolicy {
			max_attempts: 3,
			first_delay: Duration::from_millis(5),
			max_delay: Duration::from_millis(10),
		}
	}

	async fn scheduler() -> (TaskScheduler, Arc<dyn TaskRunStore>) {
		let store: Arc<dyn TaskRunStore> = Arc::new(TaskRunRepository::new(create_test_pool().await));
		let scheduler = TaskScheduler::new(Arc::clone(&store)).with_retry(quick_retry());
		(scheduler, store)
	}

	#[test]
	fn retry_delay_doubles_and_caps() {
		let policy = RetryPolicy::default();
		assert_eq!(policy.delay_after(1), Duration::from_secs(1));
		assert_eq!(policy.delay_after(2), Duration::from_secs(2));
		assert_eq!(policy.delay_after(3), Duration::from_secs(4));
		assert_eq!(policy.delay_after(10), Duration::from_secs(60));
		assert_eq!(policy.delay_after(u32::MAX), Duration::from_secs(60));
	}

	#[tokio::test]
	async fn task_ids_are_sorted() {
		let (mut scheduler, _) = scheduler().await;
		scheduler.every(Arc::new(CountingTask::new("pipeline-sync")), Duration::from_secs(30));
		scheduler.on_demand(Arc::new(CountingTask::new("cache-prune")));

		assert_eq!(scheduler.task_ids(), vec!["cache-prune", "pipeline-sync"]);
	}

	#[tokio::test]
	async fn unknown_task_cannot_run() {
		let (scheduler, _) = scheduler().await;
		match scheduler.run_now("missing", RunTrigger::Manual).await {
			Err(TaskError::Unknown(id)) => assert_eq!(id, "missing"),
			other => panic!("expected Unknown, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn run_now_records_the_finished_run() {
		let (mut scheduler, store) = scheduler().await;
		scheduler.on_demand(Arc::new(CountingTask::new("cache-prune")));

		let run = scheduler.run_now("cache-prune", RunTrigger::Manual).await.unwrap();

		assert_eq!(run.status, RunStatus::Succeeded);
		assert_eq!(run.trigger, RunTrigger::Manual);
		assert_eq!(run.attempts, 1);
		assert_eq!(run.summary.as_deref(), Some("call 1"));
		assert_eq!(store.recent_runs("cache-prune", 5).await.unwrap(), vec![run]);
		let tasks = store.list_tasks().await.unwrap();
		assert_eq!(tasks.len(), 1);
		assert_eq!(tasks[0].interval_secs, None);
	}

	#[tokio::test]
	async fn permanent_failure_is_recorded_without_retry() {
		let (mut scheduler, _) = scheduler().await;
		let task = Arc::new(CountingTask::failing("pipeline-sync", 10, false));
		scheduler.on_demand(task.clone());

		let run = scheduler.run_now("pipeline-sync", RunTrigger::Startup).await.unwrap();

		assert_eq!(run.status, RunStatus::Failed);
		assert_eq!(run.error.as_deref(), Some("attempt 1 failed"));
		assert_eq!(task.calls(), 1);
	}

	#[tokio::test]
	async fn retryable_failures_retry_within_one_run() {
		let (mut scheduler, store) = scheduler().await;
		let task = Arc::new(CountingTask::failing("pipeline-sync", 2, true));
		scheduler.on_demand(task.clone());

		let run = scheduler.run_now("pipeline-sync", RunTrigger::Manual).await.unwrap();

		assert_eq!(run.status, RunStatus::Succeeded);
		assert_eq!(run.attempts, 3);
		assert_eq!(store.recent_runs("pipeline-sync", 5).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn retries_stop_at_the_attempt_limit() {
		let (mut scheduler, _) = scheduler().await;
		let task = Arc::new(CountingTask::failing("pipeline-sync", 10, true));
		scheduler.on_demand(task.clone());

		let run = scheduler.run_now("pipeline-sync", RunTrigger::Manual).await.unwrap();

		assert_eq!(run.status, RunStatus::Failed);
		assert_eq!(run.attempts, quick_retry().max_attempts);
		assert_eq!(task.calls(), 3);
	}

	#[tokio::test]
	async fn interval_loops_run_until_shutdown() {
		let (mut scheduler, store) = scheduler().await;
		let task = Arc::new(CountingTask::new("pipeline-sync"));
		scheduler.every(task.clone(), Duration::from_millis(20));
		scheduler.start().await.unwrap();

		tokio::time::sleep(Duration::from_millis(300)).await;
		scheduler.shutdown().await;

		let calls = task.calls();
		assert!(calls >= 1);
		tokio::time::sleep(Duration::from_millis(100)).await;
		assert_eq!(task.calls(), calls);

		let runs = store.recent_runs("pipeline-sync", 100).await.unwrap();
		let succeeded = runs.iter().filter(|r| r.status == RunStatus::Succeeded).count();
		assert_eq!(succeeded as u32, calls);
		assert!(runs.iter().all(|r| r.trigger == RunTrigger::Schedule));
		assert!(store.list_tasks().await.unwrap()[0].interval_secs.is_some());
	}

	#[tokio::test]
	async fn runs_after_shutdown_are_cancelled() {
		let (mut scheduler, _) = scheduler().await;
		let task = Arc::new(CountingTask::new("cache-prune"));
		scheduler.on_demand(task.clone());
		scheduler.shutdown().await;

		let run = scheduler.run_now("cache-prune", RunTrigger::Manual).await.unwrap();

		assert_eq!(run.status, RunStatus::Cancelled);
		assert_eq!(task.calls(), 0);
	}
}
