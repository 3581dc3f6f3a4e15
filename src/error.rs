/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the error types shared across the crate:
//! [`TaskError`], [`JobError`] and [`ConfigError`].
//!
//! Operation-specific errors live next to the operation that raises them,
//! e.g. [`PollingError`](`crate::polling::PollingError`) in the polling module
//! and [`UnknownTaskError`](`crate::executor::UnknownTaskError`) in the executor module.

use std::{error::Error as StdError, sync::Arc};

use chrono::{DateTime, Utc};

/// Boxed opaque error, the form in which handler failures cross the dispatch boundary
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// An error raised during the execution of one task of a job.
///
/// Recorded by [`Job::record_error`](`crate::Job::record_error`) and kept in the
/// job's error list. The original cause is shared, not cloned, so every awaiter
/// that re-observes a failed job sees the very same underlying error.
#[derive(thiserror::Error, Clone, Debug)]
#[error("task '{task}' failed: {message}")]
pub struct TaskError {
	/// Name of the task the error occurred in
	pub task: String,

	/// Human-readable description, usually the display form of the cause
	pub message: String,

	/// The original error, if one was captured
	#[source]
	pub cause: Option<Arc<dyn StdError + Send + Sync>>,

	/// When the error was recorded
	pub timestamp: DateTime<Utc>,
}

impl TaskError {
	pub(crate) fn new(task: impl Into<String>, cause: BoxError) -> Self {
		Self {
			task: task.into(),
			message: cause.to_string(),
			cause: Some(Arc::from(cause)),
			timestamp: Utc::now(),
		}
	}

	pub(crate) fn from_message(task: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			task: task.into(),
			message: message.into(),
			cause: None,
			timestamp: Utc::now(),
		}
	}
}

/// The terminal failure of a job, observed when awaiting it.
///
/// Awaiting a job that reached [`TerminationState::Success`](`crate::TerminationState::Success`)
/// yields its result instead.
#[derive(thiserror::Error, Clone, Debug)]
pub enum JobError {
	/// The job stopped at a failed task
	#[error(transparent)]
	Failed(#[from] TaskError),

	/// The job was cancelled before finishing its tasks
	#[error("job '{job}' was cancelled")]
	Cancelled {
		/// Name of the cancelled job
		job: String,
	},
}

/// Malformed constructor arguments
#[expect(missing_docs, reason = "error messages are self-documenting")]
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("a job requires at least one task")]
	EmptyTasks,

	#[error("a handler for task '{0}' is already registered")]
	DuplicateHandler(String),

	#[error("poll interval must be greater than zero")]
	ZeroPollInterval,

	#[error("poll timeout must be greater than zero")]
	ZeroPollTimeout,
}
