/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Executor`], the runtime that drives submitted
//! jobs through their task pipelines concurrently.
//!
//! Every submitted job gets its own driver task. Within one job, stages run
//! strictly in sequence; across jobs, drivers multiplex cooperatively on the
//! tokio runtime. The only suspension points are inside handlers, during
//! [`Repeat`](`crate::Repeat`) delays, and while joining an offloaded
//! blocking handler; everything else a driver does to its job happens within
//! one scheduling slice.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};

use tokio::{select, task::JoinSet, time::sleep};

use crate::{
	error::ConfigError,
	handler::{Handler, HandlerOutput},
	job::Job,
	payload::payload,
	signal::PollAgain,
};

/// No handler is registered for a job's current task
#[derive(thiserror::Error, Clone, Debug)]
#[error("no handler registered for task '{task}'")]
pub struct UnknownTaskError {
	/// The task name the job asked for
	pub task: String,
}

/// Drives jobs through their task pipelines on a shared set of handlers.
///
/// The handler registry is fixed at construction. Jobs are accepted with
/// [`Executor::submit`], run in the background and given back to the caller
/// immediately; awaiting the job handle observes its completion.
#[derive(Debug)]
pub struct Executor {
	handlers: Arc<HashMap<String, Handler>>,
	drivers: Mutex<JoinSet<()>>,
	submitted: Mutex<Vec<Job>>,
}

impl Executor {
	/// Creates an executor from `task name -> handler` pairs.
	///
	/// # Errors
	/// [`ConfigError::DuplicateHandler`] if a task name appears twice.
	pub fn new<I, N>(handlers: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = (N, Handler)>,
		N: Into<String>,
	{
		let mut registry = HashMap::new();
		for (name, handler) in handlers {
			let name = name.into();
			if registry.insert(name.clone(), handler).is_some() {
				return Err(ConfigError::DuplicateHandler(name));
			}
		}

		Ok(Self {
			handlers: Arc::new(registry),
			drivers: Mutex::new(JoinSet::new()),
			submitted: Mutex::new(Vec::new()),
		})
	}

	/// Accepts a job for execution and returns the same handle back, now
	/// running in the background.
	///
	/// Must be called within a tokio runtime.
	pub fn submit(&self, job: Job) -> Job {
		self.submitted
			.lock()
			.expect("submitted job list lock poisoned")
			.push(job.clone());

		self.drivers
			.lock()
			.expect("driver set lock poisoned")
			.spawn(drive(Arc::clone(&self.handlers), job.clone()));

		job
	}

	/// Shuts the executor down.
	///
	/// With `wait` set, outstanding jobs are drained: the call returns once
	/// every driver has finished on its own. Without it, every job that is
	/// not yet terminal is cancelled first and the drivers are then joined;
	/// they stop at their next suspension point.
	pub async fn shutdown(self, wait: bool) {
		let Self {
			handlers: _,
			drivers,
			submitted,
		} = self;

		if !wait {
			for job in submitted
				.into_inner()
				.expect("submitted job list lock poisoned")
			{
				job.cancel();
			}
		}

		let mut drivers = drivers.into_inner().expect("driver set lock poisoned");
		while drivers.join_next().await.is_some() {}
	}
}

/// Drives one job from its first task to a terminal state
#[tracing::instrument(skip_all, fields(job = %job.name()))]
async fn drive(handlers: Arc<HashMap<String, Handler>>, job: Job) {
	tracing::debug!("Starting job {}", job.id());

	'job: loop {
		job.advance();
		if job.is_terminal() {
			break;
		}

		let Some(task) = job.task_name() else {
			break;
		};

		let Some(handler) = handlers.get(&task) else {
			job.record_error(UnknownTaskError { task });
			break;
		};

		// Stage loop: re-dispatches the same handler on Repeat, never advances
		loop {
			let result = select! {
				result = handler.call(job.clone()) => result,
				() = job.terminated() => break 'job,
			};

			if job.is_terminal() {
				// cancelled while the handler was running; its result is dropped
				break 'job;
			}

			match result {
				Ok(HandlerOutput::Repeat(delay)) => {
					tracing::trace!("Task {task} asked to run again in {delay:?}");

					select! {
						() = sleep(delay) => (),
						() = job.terminated() => break 'job,
					}
				}
				Ok(HandlerOutput::None) => break,
				Ok(HandlerOutput::Value(value)) => {
					job.set_task_output(value);
					break;
				}
				Ok(HandlerOutput::PollAgain(reason)) => {
					// not under the polling wrapper: passed through as a normal output
					job.set_task_output(payload(PollAgain { reason }));
					break;
				}
				Err(error) => {
					tracing::debug!("Task {task} failed: {error}");
					job.record_error(error);
					break 'job;
				}
			}
		}
	}

	tracing::debug!(
		"Job {} finished as {:?}",
		job.name(),
		job.termination_state()
	);
}
