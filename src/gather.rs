/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Gather`] utility that blocks on a whole batch
//! of jobs and collects their outcomes

use std::{collections::HashMap, time::Duration};

use futures::future::join_all;
use tokio::time::timeout;

use crate::{error::JobError, job::Job, payload::TaskPayload};

/// Collects the outcomes of a batch of jobs.
///
/// All jobs are awaited concurrently. A job that fails, or that is not
/// terminal within [`timeout`](`GatherBuilder::timeout`), contributes the
/// configured default value instead of a result, unless
/// [`raise_on_error`](`GatherBuilder::raise_on_error`) is set, in which case
/// the first job error is returned as a whole.
#[derive(bon::Builder)]
pub struct Gather {
	/// The jobs to wait for
	#[builder(start_fn)]
	jobs: Vec<Job>,

	/// Per-job wait budget. Waiting out the budget does not cancel the job.
	timeout: Option<Duration>,

	/// Substitute outcome for failed or timed-out jobs
	default_value: Option<TaskPayload>,

	/// Propagate the first job error instead of substituting `default_value`
	#[builder(default)]
	raise_on_error: bool,
}

impl Gather {
	/// Waits for all jobs and keys their outcomes by job name; jobs repeating
	/// an already-seen name are keyed by their id instead.
	///
	/// # Errors
	/// With `raise_on_error`, the first failing or cancelled job's [`JobError`].
	pub async fn results(self) -> Result<HashMap<String, Option<TaskPayload>>, JobError> {
		let outcomes = join_all(self.jobs.iter().map(|job| self.outcome_or_default(job))).await;

		let mut results = HashMap::new();
		for (job, outcome) in self.jobs.iter().zip(outcomes) {
			let key = if results.contains_key(job.name()) {
				job.id()
			} else {
				job.name()
			};

			results.insert(key.to_owned(), outcome?);
		}

		Ok(results)
	}

	/// Waits for all jobs and returns their outcomes in the order the jobs
	/// were given.
	///
	/// # Errors
	/// With `raise_on_error`, the first failing or cancelled job's [`JobError`].
	pub async fn outputs(self) -> Result<Vec<Option<TaskPayload>>, JobError> {
		join_all(self.jobs.iter().map(|job| self.outcome_or_default(job)))
			.await
			.into_iter()
			.collect()
	}

	async fn outcome_or_default(&self, job: &Job) -> Result<Option<TaskPayload>, JobError> {
		let outcome = match self.timeout {
			Some(limit) => match timeout(limit, job.outcome()).await {
				Ok(outcome) => outcome,
				Err(_elapsed) => {
					tracing::debug!("Job {} didn't finish in time", job.name());
					return Ok(self.default_value.clone());
				}
			},
			None => job.outcome().await,
		};

		match outcome {
			Ok(result) => Ok(result),
			Err(error) if self.raise_on_error => Err(error),
			Err(error) => {
				tracing::debug!("Job {} substituted with the default: {error}", job.name());
				Ok(self.default_value.clone())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::Gather;
	use crate::{error::JobError, job::Job, payload::payload};

	/// Walks a single-task job to Success with the given output
	fn finished_job(name: &str, output: i64) -> Job {
		let job = Job::builder().name(name).build().expect("valid config");
		job.advance();
		job.set_task_output(payload(output));
		job.advance();
		job
	}

	fn failed_job(name: &str) -> Job {
		let job = Job::builder().name(name).build().expect("valid config");
		job.advance();
		job.record_error(std::io::Error::other("broken"));
		job
	}

	#[tokio::test]
	async fn results_are_keyed_by_name_then_id() {
		let first = finished_job("twin", 1);
		let second = finished_job("twin", 2);

		let results = Gather::builder(vec![first, second.clone()])
			.build()
			.results()
			.await
			.expect("no job errored");

		assert_eq!(results.len(), 2, "both jobs must be present");
		assert!(results.contains_key("twin"));
		assert!(
			results.contains_key(second.id()),
			"the duplicate name must fall back to the job id"
		);
	}

	#[tokio::test]
	async fn outputs_keep_submission_order() {
		let jobs = vec![finished_job("a", 10), finished_job("b", 20)];

		let outputs = Gather::builder(jobs)
			.build()
			.outputs()
			.await
			.expect("no job errored");

		let values: Vec<_> = outputs
			.into_iter()
			.map(|output| {
				output.and_then(|v| v.downcast_ref::<i64>().copied())
			})
			.collect();
		assert_eq!(values, [Some(10), Some(20)]);
	}

	#[tokio::test]
	async fn failures_become_the_default_value() {
		let results = Gather::builder(vec![failed_job("bad")])
			.default_value(payload(-1_i64))
			.build()
			.results()
			.await
			.expect("failures are substituted, not raised");

		let substituted = results
			.get("bad")
			.expect("the failed job is present")
			.clone()
			.and_then(|v| v.downcast_ref::<i64>().copied());
		assert_eq!(substituted, Some(-1));
	}

	#[tokio::test]
	async fn raise_on_error_propagates_the_job_error() {
		let result = Gather::builder(vec![finished_job("fine", 1), failed_job("bad")])
			.raise_on_error(true)
			.build()
			.results()
			.await;

		assert_matches!(result, Err(JobError::Failed(err)) if err.message == "broken");
	}
}
