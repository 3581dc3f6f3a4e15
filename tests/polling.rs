/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! These tests confirm the polling wrapper keeps re-dispatching a stage until
//! its handler stops asking to poll again, and gives up once the configured
//! timeout has elapsed.

use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::{Duration, Instant},
};

use assert_matches::assert_matches;
use taskmill::{
	Executor, Handler, HandlerOutput, JobError, POLLING_STATE_KEY, PollAgain, Polling,
	PollingError, TerminationState, payload,
};

fn job(tasks: &[&str]) -> taskmill::Job {
	taskmill::Job::builder()
		.tasks(tasks.iter().map(|task| (*task).to_owned()).collect())
		.build()
		.expect("task list is not empty")
}

#[tokio::test(flavor = "multi_thread")]
async fn polls_until_the_handler_succeeds() {
	let attempts = Arc::new(AtomicUsize::new(0));

	let attempt = {
		let attempts = Arc::clone(&attempts);
		Handler::new(move |_job: taskmill::Job| {
			let attempts = Arc::clone(&attempts);
			async move {
				if attempts.fetch_add(1, Ordering::SeqCst) < 3 {
					HandlerOutput::PollAgain(Some("waiting".to_owned()))
				} else {
					HandlerOutput::Value(payload("ok".to_owned()))
				}
			}
		})
	};

	let wrapped = Polling::builder()
		.interval(Duration::from_millis(10))
		.timeout(Duration::from_secs(1))
		.build()
		.wrap(attempt)
		.expect("config is valid");

	let executor = Executor::new([("poll", wrapped)]).expect("a single task name");

	let started = Instant::now();
	let job = executor.submit(job(&["poll"]));

	let result = job.clone().await.expect("polling eventually succeeds");
	assert_eq!(
		result.and_then(|v| v.downcast_ref::<String>().cloned()),
		Some("ok".to_owned())
	);
	assert_eq!(attempts.load(Ordering::SeqCst), 4, "three retries, then ok");
	assert!(
		started.elapsed() >= Duration::from_millis(30),
		"three poll delays of 10ms must have been honored"
	);
	assert!(
		job.signal(POLLING_STATE_KEY).is_none(),
		"the polling state must be cleared once polling completes"
	);
	assert_eq!(job.termination_state(), Some(TerminationState::Success));

	executor.shutdown(true).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn gives_up_once_the_timeout_elapses() {
	let attempt = Handler::new(async |_job: taskmill::Job| {
		HandlerOutput::PollAgain(Some("still waiting".to_owned()))
	});

	let wrapped = Polling::builder()
		.interval(Duration::from_millis(10))
		.timeout(Duration::from_millis(200))
		.build()
		.wrap(attempt)
		.expect("config is valid");

	let executor = Executor::new([("poll_forever", wrapped)]).expect("a single task name");

	let started = Instant::now();
	let job = executor.submit(job(&["poll_forever"]));

	let error = job.clone().await.expect_err("polling must time out");
	assert_matches!(error, JobError::Failed(_));
	assert!(
		started.elapsed() >= Duration::from_millis(200),
		"the whole timeout budget must have been used up"
	);

	assert_eq!(job.termination_state(), Some(TerminationState::Failed));
	assert_eq!(job.errors().len(), 1, "a timeout is a single recorded error");

	let task_error = job.error().expect("an error was recorded");
	assert!(task_error.message.contains("timed out"));
	assert!(
		task_error.message.contains("polling"),
		"the report must carry the handler's type path"
	);

	let cause = task_error.cause.as_ref().expect("the cause is kept");
	let polling_error = cause
		.downcast_ref::<PollingError>()
		.expect("the cause must be a polling error");
	assert_eq!(polling_error.task, "poll_forever");
	assert_eq!(polling_error.last_reason.as_deref(), Some("still waiting"));

	executor.shutdown(true).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn poll_again_outside_the_wrapper_is_a_normal_output() {
	let executor = Executor::new([(
		"raw",
		Handler::new(async |_job: taskmill::Job| PollAgain::because("status")),
	)])
	.expect("a single task name");

	let job = executor.submit(job(&["raw"]));

	let result = job.await.expect("the job succeeds");
	let value = result.expect("the poll-again value is the stage output");
	assert_eq!(
		value
			.downcast_ref::<PollAgain>()
			.expect("the output is the signal itself")
			.reason
			.as_deref(),
		Some("status")
	);
}

#[tokio::test(flavor = "multi_thread")]
async fn a_blocking_attempt_can_be_polled() {
	let attempts = Arc::new(AtomicUsize::new(0));

	let attempt = {
		let attempts = Arc::clone(&attempts);
		Handler::blocking_without_job(move || {
			if attempts.fetch_add(1, Ordering::SeqCst) < 1 {
				HandlerOutput::PollAgain(None)
			} else {
				HandlerOutput::Value(payload(5_i64))
			}
		})
	};

	let wrapped = Polling::builder()
		.interval(Duration::from_millis(5))
		.timeout(Duration::from_secs(1))
		.build()
		.wrap(attempt)
		.expect("config is valid");

	let executor = Executor::new([("poll_blocking", wrapped)]).expect("a single task name");

	let result = executor
		.submit(job(&["poll_blocking"]))
		.await
		.expect("polling succeeds");
	assert_eq!(
		result.and_then(|v| v.downcast_ref::<i64>().copied()),
		Some(5)
	);
	assert_eq!(attempts.load(Ordering::SeqCst), 2, "one retry, then a value");

	executor.shutdown(true).await;
}
