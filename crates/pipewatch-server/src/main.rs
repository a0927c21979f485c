// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! pipewatch: mirrors CI pipelines from GitLab and answers queries over them.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pipewatch_core::{JobId, PipelineId, ProjectId};
use pipewatch_db::PipelineFilter;
use pipewatch_server::{logging, App};
use pipewatch_tasks::{health_report, RunTrigger};
use serde::Serialize;

/// pipewatch - CI pipeline mirror
#[derive(Parser, Debug)]
#[command(name = "pipewatch", version, about, long_about = None)]
struct Args {
	/// Path to a configuration file (defaults to /etc/pipewatch/pipewatch.toml)
	#[arg(short, long, env = "PIPEWATCH_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the initial sync, then scheduled sync and cache pruning until Ctrl-C
	Serve,
	/// Run one sync pass and print its summary
	Sync,
	/// Show sync state, stored counts and task health
	Status,
	/// List stored pipelines, newest first
	Pipelines {
		#[arg(long)]
		project: Option<ProjectId>,
		#[arg(long = "ref")]
		ref_name: Option<String>,
		#[arg(long)]
		status: Option<String>,
		/// Maximum number of pipelines (capped at 200)
		#[arg(short, long)]
		limit: Option<u32>,
	},
	/// Pipeline counts by status
	Stats,
	/// Refs with stored pipelines
	Branches,
	/// List a directory of a job's artifact archive
	Browse {
		job: JobId,
		/// Directory inside the archive; the root when omitted
		#[arg(default_value = "")]
		path: String,
	},
	/// Artifact archives declared by stored jobs
	Artifacts {
		#[command(subcommand)]
		target: ArtifactsTarget,
	},
	/// Write one file from a job's artifact archive to stdout or a file
	Download {
		job: JobId,
		/// Path of the file inside the archive
		path: String,
		#[arg(short, long)]
		output: Option<PathBuf>,
	},
	/// Test results
	Tests {
		#[command(subcommand)]
		target: TestsTarget,
	},
	/// Processed log of a job
	Logs { job: JobId },
	/// Stages of a pipeline in CI definition order
	Stages { pipeline: PipelineId },
	/// Stored projects and the sync allow-list
	Projects {
		#[command(subcommand)]
		command: ProjectsCommand,
	},
	/// Derived-data cache maintenance
	Cache {
		#[command(subcommand)]
		command: CacheCommand,
	},
}

#[derive(Subcommand, Debug)]
enum TestsTarget {
	/// Report of one job
	Job { id: JobId },
	/// Totals of a pipeline's test jobs, grouped by team
	Pipeline { id: PipelineId },
}

#[derive(Subcommand, Debug)]
enum ArtifactsTarget {
	/// Artifact of one job
	Job { id: JobId },
	/// Artifacts of every job in a pipeline
	Pipeline { id: PipelineId },
}

#[derive(Subcommand, Debug)]
enum ProjectsCommand {
	/// Stored projects, sorted by path
	List,
	/// Restrict syncing to these projects; no ids enables every project
	Enable { ids: Vec<ProjectId> },
	/// Show the current allow-list
	Enabled,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
	/// Entry counts per kind
	Stats,
	/// Remove every cached listing, report and log
	Clear,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => pipewatch_config::load_config_with_file(path),
		None => pipewatch_config::load_config(),
	}
	.context("loading configuration")?;

	logging::init_tracing(&config.logging);

	let app = App::build(config).await?;
	let service = app.service.clone();

	match args.command {
		Command::Serve => app.serve().await?,
		Command::Sync => {
			app.sync_now(RunTrigger::Manual).await?;
			print_json(&service.sync_status().await.last_sync)?;
		}
		Command::Status => {
			let health = health_report(app.stores.task_runs.as_ref())
				.await
				.context("reading task run history")?;
			print_json(&serde_json::json!({
				"sync": service.sync_status().await,
				"pipelines": app.stores.pipelines.count_pipelines().await?,
				"cache": service.cache_stats().await?,
				"tasks": health,
			}))?;
		}
		Command::Pipelines {
			project,
			ref_name,
			status,
			limit,
		} => {
			let filter = PipelineFilter {
				project_id: project,
				ref_name,
				status,
				limit,
			};
			print_json(&service.list_pipelines(&filter).await?)?;
		}
		Command::Stats => print_json(&service.pipeline_stats().await?)?,
		Command::Branches => print_json(&service.list_branches().await?)?,
		Command::Browse { job, path } => print_json(&service.browse_artifact(job, &path).await?)?,
		Command::Artifacts { target } => match target {
			ArtifactsTarget::Job { id } => print_json(&service.list_job_artifacts(id).await?)?,
			ArtifactsTarget::Pipeline { id } => {
				print_json(&service.list_pipeline_artifacts(id).await?)?
			}
		},
		Command::Download { job, path, output } => {
			let body = service.download_artifact_file(job, &path).await?;
			match output {
				Some(output) => tokio::fs::write(&output, &body)
					.await
					.with_context(|| format!("writing {}", output.display()))?,
				None => std::io::stdout()
					.write_all(&body)
					.context("writing to stdout")?,
			}
		}
		Command::Tests { target } => match target {
			TestsTarget::Job { id } => print_json(&service.get_job_tests(id).await?)?,
			TestsTarget::Pipeline { id } => print_json(&service.get_pipeline_tests(id).await?)?,
		},
		Command::Logs { job } => print_json(&service.get_job_log(job).await?)?,
		Command::Stages { pipeline } => print_json(&service.get_pipeline_stages(pipeline).await?)?,
		Command::Projects { command } => match command {
			ProjectsCommand::List => print_json(&service.list_projects().await?)?,
			ProjectsCommand::Enable { ids } => {
				service.set_enabled_projects(&ids).await?;
				print_json(&service.get_enabled_projects().await?)?;
			}
			ProjectsCommand::Enabled => print_json(&service.get_enabled_projects().await?)?,
		},
		Command::Cache { command } => match command {
			CacheCommand::Stats => print_json(&service.cache_stats().await?)?,
			CacheCommand::Clear => print_json(&service.clear_cache().await?)?,
		},
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn cli_definition_is_valid() {
		Args::command().debug_assert();
	}

	#[test]
	fn parses_nested_subcommands() {
		let args = Args::parse_from(["pipewatch", "tests", "pipeline", "42"]);
		assert!(matches!(
			args.command,
			Command::Tests {
				target: TestsTarget::Pipeline { id: 42 }
			}
		));

		let args = Args::parse_from(["pipewatch", "browse", "7", "reports/unit"]);
		assert!(matches!(args.command, Command::Browse { job: 7, ref path } if path == "reports/unit"));

		let args = Args::parse_from(["pipewatch", "download", "7", "reports/junit.xml", "-o", "junit.xml"]);
		assert!(matches!(args.command, Command::Download {
			job: 7,
			ref path,
			output: Some(ref output),
		} if path == "reports/junit.xml" && output == &PathBuf::from("junit.xml")));

		let args = Args::parse_from(["pipewatch", "artifacts", "pipeline", "3"]);
		assert!(matches!(
			args.command,
			Command::Artifacts {
				target: ArtifactsTarget::Pipeline { id: 3 }
			}
		));

		let args = Args::parse_from(["pipewatch", "projects", "enable", "1", "2"]);
		assert!(matches!(args.command, Command::Projects {
			command: ProjectsCommand::Enable { ref ids }
		} if ids == &[1, 2]));
	}

	#[test]
	fn pipeline_filters_map_to_flags() {
		let args = Args::parse_from([
			"pipewatch", "pipelines", "--project", "3", "--ref", "main", "--limit", "5",
		]);
		match args.command {
			Command::Pipelines {
				project,
				ref_name,
				status,
				limit,
			} => {
				assert_eq!(project, Some(3));
				assert_eq!(ref_name.as_deref(), Some("main"));
				assert_eq!(status, None);
				assert_eq!(limit, Some(5));
			}
			other => panic!("unexpected command: {other:?}"),
		}
	}
}
