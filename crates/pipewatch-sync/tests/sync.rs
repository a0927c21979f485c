// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end sync passes against the in-process upstream and an in-memory
//! store.

use std::sync::Arc;
use std::time::Duration;

use pipewatch_config::{ArtifactsConfig, SyncConfig};
use pipewatch_core::PipelineStatus;
use pipewatch_db::testing::create_test_pool;
use pipewatch_db::{PipelineFilter, Stores};
use pipewatch_sync::testing::{
	job, job_with_archive, pipeline, project, FakeArchive, FakeGitOpsClient, PeakUsage,
};
use pipewatch_sync::{PipelineService, SyncPhase};

const JUNIT: &str = r#"<testsuite name="api">
	<testcase classname="api" name="health"/>
	<testcase classname="api" name="login"/>
	<testcase classname="api" name="logout"><skipped/></testcase>
</testsuite>"#;

async fn service(client: FakeGitOpsClient) -> (PipelineService, Arc<FakeGitOpsClient>, Stores) {
	let client = Arc::new(client);
	let stores = Stores::sqlite(create_test_pool().await);
	let service = PipelineService::new(
		client.clone(),
		stores.clone(),
		SyncConfig::default(),
		&ArtifactsConfig::default(),
	);
	(service, client, stores)
}

fn upstream() -> FakeGitOpsClient {
	let archive = FakeArchive::new(&[("junit_report.xml", JUNIT)]);
	let unit = job_with_archive(102, 10, "test", PipelineStatus::Success, &archive);
	FakeGitOpsClient::new()
		.with_project(project(1, "platform/api"))
		.with_project(project(2, "platform/web"))
		.with_pipeline(pipeline(
			10,
			1,
			PipelineStatus::Success,
			vec![job(101, 10, "build", PipelineStatus::Success), unit],
		))
		.with_pipeline(pipeline(
			20,
			2,
			PipelineStatus::Running,
			vec![job(201, 20, "build", PipelineStatus::Running)],
		))
		.with_log(101, "cargo build\nFinished")
		.with_log(102, "cargo test\nok")
		.with_archive(102, archive)
}

#[tokio::test]
async fn repeated_passes_do_not_duplicate_records() {
	let (service, _, stores) = service(upstream()).await;

	assert_eq!(service.trigger_sync().await, 2);
	let first = stores.pipelines.count_pipelines().await.unwrap();
	let first_projects = stores.projects.list_projects().await.unwrap();

	assert_eq!(service.trigger_sync().await, 2);
	assert_eq!(stores.pipelines.count_pipelines().await.unwrap(), first);
	assert_eq!(first, 2);
	assert_eq!(stores.projects.list_projects().await.unwrap(), first_projects);

	let stored = service.get_pipeline(10).await.unwrap();
	assert_eq!(stored.jobs.len(), 2);
	assert_eq!(service.cache_stats().await.unwrap().test_reports, 1);
}

#[tokio::test]
async fn failing_log_fetch_does_not_block_siblings_or_pipeline() {
	let archive = FakeArchive::new(&[("junit_report.xml", JUNIT)]);
	let unit = job_with_archive(12, 1, "test", PipelineStatus::Success, &archive);
	let client = FakeGitOpsClient::new()
		.with_project(project(1, "platform/api"))
		.with_pipeline(pipeline(
			1,
			1,
			PipelineStatus::Failed,
			vec![
				job(11, 1, "build", PipelineStatus::Failed),
				unit,
				job(13, 1, "lint", PipelineStatus::Success),
			],
		))
		.with_failing_log(11)
		.with_failing_log(12)
		.with_log(13, "lint ok")
		.with_archive(12, archive);
	let (service, client, stores) = service(client).await;

	let count = service.trigger_sync().await;

	assert_eq!(count, 1);
	assert_eq!(client.log_fetches(), 3);
	assert!(stores.pipelines.get_pipeline(1).await.unwrap().is_some());
	assert!(stores.logs.get_processed_log(13).await.unwrap().is_some());
	assert!(stores.logs.get_processed_log(11).await.unwrap().is_none());
	// The job whose log failed still had its report aggregated.
	assert_eq!(
		stores.test_reports.get_test_report(12).await.unwrap().map(|r| r.report.total),
		Some(3)
	);

	let summary = service.sync_status().await.last_sync.unwrap();
	assert_eq!(summary.failures, 2);
	assert_eq!(summary.pipelines_synced, 1);
}

#[tokio::test]
async fn first_pass_completes_even_when_upstream_is_down() {
	let (service, _, _) = service(FakeGitOpsClient::new().with_failing_projects()).await;

	assert_eq!(service.trigger_sync().await, 0);

	let status = service.sync_status().await;
	assert!(status.complete);
	assert_eq!(status.phase, SyncPhase::Complete);
	assert_eq!(status.last_sync.map(|s| s.failures), Some(1));
}

#[tokio::test]
async fn upstream_changes_replace_stored_pipelines() {
	let (service, client, _) = service(upstream()).await;
	service.trigger_sync().await;

	client.update_pipeline(pipeline(
		20,
		2,
		PipelineStatus::Success,
		vec![job(201, 20, "build", PipelineStatus::Success)],
	));
	service.trigger_sync().await;

	let stored = service.get_pipeline(20).await.unwrap();
	assert_eq!(stored.status, PipelineStatus::Success);
	assert_eq!(stored.jobs[0].status, PipelineStatus::Success);

	let stats = service.pipeline_stats().await.unwrap();
	assert_eq!((stats.total, stats.success, stats.running), (2, 2, 0));
}

#[tokio::test]
async fn allow_list_limits_the_next_pass() {
	let (service, _, _) = service(upstream()).await;
	service.set_enabled_projects(&[2]).await.unwrap();

	assert_eq!(service.trigger_sync().await, 1);

	let stored = service
		.list_pipelines(&PipelineFilter::default())
		.await
		.unwrap();
	assert_eq!(stored.len(), 1);
	assert_eq!(stored[0].project_id, 2);
	assert_eq!(service.list_projects().await.unwrap().len(), 2);
	assert_eq!(service.get_enabled_projects().await.unwrap(), Some(vec![2]));
}

#[tokio::test]
async fn synced_data_answers_queries() {
	let (service, _, _) = service(upstream()).await;
	service.trigger_sync().await;

	assert_eq!(service.list_branches().await.unwrap(), vec!["main".to_string()]);

	let browse = service.browse_artifact(102, "").await.unwrap();
	assert!(browse.cached);
	assert_eq!(browse.files[0].name, "junit_report.xml");

	let tests = service.get_pipeline_tests(10).await.unwrap();
	assert_eq!(tests.counts.total, 3);
	assert_eq!(tests.counts.skipped, 1);
	assert_eq!(tests.teams.keys().collect::<Vec<_>>(), vec!["default"]);

	let logs = service.list_pipeline_logs(10).await.unwrap();
	assert_eq!(logs.len(), 2);
	assert!(service.list_pipeline_logs(20).await.unwrap().is_empty());
}

/// Four projects with four pipelines of two jobs each, every call slowed down
/// so concurrent work overlaps.
fn busy_upstream() -> FakeGitOpsClient {
	let mut client = FakeGitOpsClient::new().with_latency(Duration::from_millis(5));
	for project_id in 1..=4 {
		client = client.with_project(project(project_id, &format!("platform/p{project_id}")));
		for n in 0..4 {
			let pipeline_id = project_id * 10 + n;
			let jobs = vec![
				job(pipeline_id * 10, pipeline_id, "build", PipelineStatus::Success),
				job(pipeline_id * 10 + 1, pipeline_id, "lint", PipelineStatus::Success),
			];
			client = client
				.with_pipeline(pipeline(pipeline_id, project_id, PipelineStatus::Success, jobs))
				.with_log(pipeline_id * 10, "ok")
				.with_log(pipeline_id * 10 + 1, "ok");
		}
	}
	client
}

async fn sync_with(config: SyncConfig) -> (PeakUsage, u64) {
	let client = Arc::new(busy_upstream());
	let stores = Stores::sqlite(create_test_pool().await);
	let service = PipelineService::new(client.clone(), stores, config, &ArtifactsConfig::default());
	let synced = service.trigger_sync().await;
	(client.peak_usage(), synced)
}

#[tokio::test]
async fn upstream_calls_never_exceed_the_api_limit() {
	let (peak, synced) = sync_with(SyncConfig {
		max_concurrent_api_calls: 3,
		max_concurrent_projects: 4,
		max_concurrent_pipelines: 4,
		..SyncConfig::default()
	})
	.await;

	assert_eq!(synced, 16);
	assert!(peak.calls <= 3, "{peak:?}");
	assert!(peak.calls >= 2, "{peak:?}");
}

#[tokio::test]
async fn projects_and_pipelines_in_flight_stay_bounded() {
	let (peak, synced) = sync_with(SyncConfig {
		max_concurrent_api_calls: 64,
		max_concurrent_projects: 2,
		max_concurrent_pipelines: 2,
		..SyncConfig::default()
	})
	.await;

	assert_eq!(synced, 16);
	assert!(peak.projects <= 2, "{peak:?}");
	assert!(peak.pipelines_per_project <= 2, "{peak:?}");
	assert_eq!(peak.projects, 2, "{peak:?}");
	assert_eq!(peak.pipelines_per_project, 2, "{peak:?}");
}

#[tokio::test]
async fn a_single_permit_serializes_all_upstream_calls() {
	let (peak, synced) = sync_with(SyncConfig {
		max_concurrent_api_calls: 1,
		max_concurrent_writes: 1,
		..SyncConfig::default()
	})
	.await;

	assert_eq!(synced, 16);
	assert_eq!(peak.calls, 1, "{peak:?}");
}
