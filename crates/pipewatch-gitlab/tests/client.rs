// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use chrono::{TimeZone, Utc};
use pipewatch_common_http::TransientError;
use pipewatch_config::SecretString;
use pipewatch_core::PipelineStatus;
use pipewatch_gitlab::{GitLabClient, GitLabError, GitOpsClient};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GitLabClient {
	GitLabClient::new(
		&server.uri(),
		Some(SecretString::new("glpat-test".to_string())),
		Duration::from_secs(5),
	)
	.unwrap()
}

fn project_json(id: i64, path: &str) -> serde_json::Value {
	json!({
		"id": id,
		"name": path.rsplit('/').next().unwrap(),
		"path_with_namespace": path,
		"web_url": format!("https://gitlab.example.com/{path}"),
		"default_branch": "main",
		"star_count": 3
	})
}

#[tokio::test]
async fn lists_projects_across_pages_with_token() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects"))
		.and(query_param("membership", "true"))
		.and(query_param("page", "1"))
		.and(header("PRIVATE-TOKEN", "glpat-test"))
		.respond_with(
			ResponseTemplate::new(200)
				.insert_header("X-Next-Page", "2")
				.set_body_json(json!([project_json(1, "team/api")])),
		)
		.mount(&server)
		.await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects"))
		.and(query_param("page", "2"))
		.respond_with(
			ResponseTemplate::new(200)
				.insert_header("X-Next-Page", "")
				.set_body_json(json!([project_json(2, "team/web")])),
		)
		.mount(&server)
		.await;

	let projects = client(&server).list_projects(None).await.unwrap();

	let paths: Vec<&str> = projects.iter().map(|p| p.path.as_str()).collect();
	assert_eq!(paths, vec!["team/api", "team/web"]);
	assert_eq!(projects[0].default_branch.as_deref(), Some("main"));
}

#[tokio::test]
async fn namespace_listing_uses_group_endpoint_and_filters() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/v4/groups/team/projects"))
		.and(query_param("include_subgroups", "true"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!([
			project_json(1, "team/api"),
			project_json(2, "teamwork/shared")
		])))
		.mount(&server)
		.await;

	let projects = client(&server).list_projects(Some("team")).await.unwrap();

	assert_eq!(projects.len(), 1);
	assert_eq!(projects[0].id, 1);
}

#[tokio::test]
async fn pipeline_listing_returns_summaries_without_jobs() {
	let server = MockServer::start().await;
	let since = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/pipelines"))
		.and(query_param("ref", "main"))
		.and(query_param("updated_after", "2025-03-01T00:00:00Z"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!([
			{
				"id": 41, "project_id": 5, "status": "running", "ref": "main",
				"created_at": "2025-03-02T11:00:00Z", "updated_at": "2025-03-02T11:01:00Z"
			},
			{
				"id": 40, "project_id": 5, "status": "success", "ref": "main",
				"created_at": "2025-03-02T10:00:00Z", "updated_at": "2025-03-02T10:05:00Z"
			}
		])))
		.expect(1)
		.mount(&server)
		.await;

	let pipelines = client(&server).list_pipelines(5, "main", since).await.unwrap();

	let ids: Vec<i64> = pipelines.iter().map(|p| p.id).collect();
	assert_eq!(ids, vec![41, 40]);
	assert_eq!(pipelines[0].status, PipelineStatus::Running);
	assert!(pipelines.iter().all(|p| p.jobs.is_empty()));
}

#[tokio::test]
async fn pipeline_detail_and_jobs_are_separate_reads() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/pipelines/40"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"id": 40,
			"project_id": 5,
			"status": "success",
			"ref": "main",
			"sha": "abc123",
			"created_at": "2025-03-02T10:00:00Z",
			"updated_at": "2025-03-02T10:05:00Z",
			"started_at": "2025-03-02T10:00:10Z",
			"finished_at": "2025-03-02T10:05:00Z",
			"duration": 290
		})))
		.mount(&server)
		.await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/pipelines/40/jobs"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!([
			{"id": 401, "name": "compile", "stage": "build", "status": "success"},
			{
				"id": 402, "name": "unit", "stage": "test", "status": "failed",
				"artifacts_file": {"filename": "artifacts.zip", "size": 4096}
			}
		])))
		.mount(&server)
		.await;

	let client = client(&server);
	let pipeline = client.fetch_pipeline(5, 40).await.unwrap();
	assert_eq!(pipeline.sha.as_deref(), Some("abc123"));
	assert_eq!(pipeline.duration, Some(290.0));
	assert!(pipeline.jobs.is_empty());

	let jobs = client.list_pipeline_jobs(5, 40).await.unwrap();
	assert_eq!(jobs.len(), 2);
	assert_eq!(jobs[1].status, PipelineStatus::Failed);
	assert_eq!(jobs[1].artifact_size(), 4096);
	assert_eq!(jobs[1].pipeline_id, 40);
}

#[tokio::test]
async fn failing_pipeline_detail_is_an_error() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/pipelines/41"))
		.respond_with(ResponseTemplate::new(500))
		.mount(&server)
		.await;

	let err = client(&server).fetch_pipeline(5, 41).await.unwrap_err();
	assert!(matches!(err, GitLabError::Api { status: 500, .. }));
	assert!(err.is_transient());
}

#[tokio::test]
async fn range_request_returns_partial_content() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/jobs/9/artifacts"))
		.and(header("Range", "bytes=10-19"))
		.respond_with(ResponseTemplate::new(206).set_body_bytes(b"0123456789".to_vec()))
		.mount(&server)
		.await;

	let bytes = client(&server)
		.fetch_artifact_range(5, 9, 10..20)
		.await
		.unwrap();
	assert_eq!(&bytes[..], b"0123456789");
}

#[tokio::test]
async fn ignored_range_is_sliced_from_full_body() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/jobs/9/artifacts"))
		.respond_with(ResponseTemplate::new(200).set_body_bytes(b"abcdefghij".to_vec()))
		.mount(&server)
		.await;

	let client = client(&server);
	let bytes = client.fetch_artifact_range(5, 9, 2..5).await.unwrap();
	assert_eq!(&bytes[..], b"cde");

	let bytes = client.fetch_artifact_range(5, 9, 8..64).await.unwrap();
	assert_eq!(&bytes[..], b"ij");

	let bytes = client.fetch_artifact_range(5, 9, 4..4).await.unwrap();
	assert!(bytes.is_empty());
}

#[tokio::test]
async fn job_log_server_error_is_transient() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/jobs/9/trace"))
		.respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
		.mount(&server)
		.await;

	let err = client(&server).fetch_job_log(5, 9).await.unwrap_err();
	assert!(matches!(err, GitLabError::Api { status: 503, .. }));
	assert!(err.is_transient());
}

#[tokio::test]
async fn status_codes_map_to_error_kinds() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/jobs/1/trace"))
		.respond_with(ResponseTemplate::new(401))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/jobs/2/trace"))
		.respond_with(ResponseTemplate::new(404))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/jobs/3/trace"))
		.respond_with(ResponseTemplate::new(429))
		.mount(&server)
		.await;

	let client = client(&server);
	assert!(matches!(
		client.fetch_job_log(5, 1).await,
		Err(GitLabError::Unauthorized)
	));
	let not_found = client.fetch_job_log(5, 2).await.unwrap_err();
	assert!(not_found.is_not_found());
	assert!(!not_found.is_transient());
	assert!(matches!(
		client.fetch_job_log(5, 3).await,
		Err(GitLabError::RateLimited)
	));
}

#[tokio::test]
async fn artifact_metadata_and_file_reads() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/jobs/9"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"id": 9, "name": "unit", "stage": "test", "status": "success",
			"artifacts_file": {"filename": "artifacts.zip", "size": 1234}
		})))
		.mount(&server)
		.await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/jobs/9/artifacts/reports/junit_report.xml"))
		.respond_with(ResponseTemplate::new(200).set_body_string("<testsuite/>"))
		.mount(&server)
		.await;

	let client = client(&server);
	let artifact = client.fetch_job_artifact_metadata(5, 9).await.unwrap();
	assert_eq!(artifact.map(|a| a.size), Some(1234));

	let body = client
		.fetch_artifact_file(5, 9, "reports/junit_report.xml")
		.await
		.unwrap();
	assert_eq!(&body[..], b"<testsuite/>");
}

#[tokio::test]
async fn invalid_json_is_an_invalid_response() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/jobs/9"))
		.respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
		.mount(&server)
		.await;

	let result = client(&server).fetch_job_artifact_metadata(5, 9).await;
	assert!(matches!(result, Err(GitLabError::InvalidResponse(_))));
}

#[tokio::test]
async fn ci_stage_order_is_read_from_definition() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/repository/files/.gitlab-ci.yml/raw"))
		.and(query_param("ref", "main"))
		.respond_with(
			ResponseTemplate::new(200).set_body_string("stages:\n  - lint\n  - build\n  - test\n"),
		)
		.mount(&server)
		.await;

	let stages = client(&server).fetch_ci_stage_order(5, "main").await.unwrap();
	assert_eq!(
		stages,
		Some(vec!["lint".to_string(), "build".to_string(), "test".to_string()])
	);
}

#[tokio::test]
async fn missing_ci_definition_is_absent() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/v4/projects/5/repository/files/.gitlab-ci.yml/raw"))
		.respond_with(ResponseTemplate::new(404))
		.mount(&server)
		.await;

	let stages = client(&server).fetch_ci_stage_order(5, "main").await.unwrap();
	assert_eq!(stages, None);
}
