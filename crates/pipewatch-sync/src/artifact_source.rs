// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Adapts the upstream client to the archive traits of `pipewatch-analysis`.

use std::ops::Range;

use async_trait::async_trait;
use bytes::Bytes;
use pipewatch_analysis::{ArchiveReader, FetchError, IndexError, RangeFetcher};
use pipewatch_core::{JobId, ProjectId};
use pipewatch_gitlab::{GitLabError, GitOpsClient};
use tokio::sync::{Semaphore, SemaphorePermit};

/// One job's artifact archive, read through the upstream API.
pub struct ArtifactSource<'a> {
	client: &'a dyn GitOpsClient,
	project_id: ProjectId,
	job_id: JobId,
	limit: Option<&'a Semaphore>,
}

impl<'a> ArtifactSource<'a> {
	pub fn new(client: &'a dyn GitOpsClient, project_id: ProjectId, job_id: JobId) -> Self {
		Self {
			client,
			project_id,
			job_id,
			limit: None,
		}
	}

	/// Each request holds a permit of `limit` while in flight.
	pub fn with_limit(mut self, limit: &'a Semaphore) -> Self {
		self.limit = Some(limit);
		self
	}

	async fn permit(&self) -> Result<Option<SemaphorePermit<'a>>, FetchError> {
		match self.limit {
			Some(limit) => Ok(Some(limit.acquire().await?)),
			None => Ok(None),
		}
	}
}

#[async_trait]
impl<'a> RangeFetcher for ArtifactSource<'a> {
	async fn fetch_range(&self, range: Range<u64>) -> Result<Bytes, FetchError> {
		let _permit = self.permit().await?;
		Ok(self
			.client
			.fetch_artifact_range(self.project_id, self.job_id, range)
			.await?)
	}
}

#[async_trait]
impl<'a> ArchiveReader for ArtifactSource<'a> {
	async fn read_file(&self, path: &str) -> Result<Bytes, FetchError> {
		let _permit = self.permit().await?;
		Ok(self
			.client
			.fetch_artifact_file(self.project_id, self.job_id, path)
			.await?)
	}
}

/// The archive read failed because upstream has no artifact for the job.
pub fn is_missing_archive(err: &IndexError) -> bool {
	match err {
		IndexError::Fetch(source) => source
			.downcast_ref::<GitLabError>()
			.is_some_and(GitLabError::is_not_found),
		_ => false,
	}
}
