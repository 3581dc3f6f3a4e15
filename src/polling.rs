/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Polling`] wrapper that turns a single-attempt
//! handler into a retry-until-success stage.
//!
//! The wrapped handler performs one attempt and returns either a real output
//! or [`PollAgain`](`crate::PollAgain`). The wrapper translates every
//! `PollAgain` into a [`Repeat`](`crate::Repeat`) with the configured
//! interval, so the executor re-dispatches the stage without advancing, until
//! the attempt succeeds or the total timeout elapses. Attempt-to-attempt
//! state lives in the job's signal scratchpad under [`POLLING_STATE_KEY`] and
//! is cleared when polling ends.

use std::time::{Duration, Instant};

use crate::{
	error::{BoxError, ConfigError},
	handler::{Handler, HandlerOutput},
	job::Job,
	payload::payload,
};

/// Signal-scratchpad key the polling wrapper keeps its state under
pub const POLLING_STATE_KEY: &str = "_polling_state";

/// A polling stage ran out of time before its handler produced a value
#[derive(thiserror::Error, Clone, Debug)]
#[error(
	"polling task '{task}' timed out in {handler} after {}s{}",
	.timeout.as_secs_f64(),
	format_reason(.last_reason)
)]
pub struct PollingError {
	/// Task the polling stage belonged to
	pub task: String,

	/// Type path of the wrapped handler function
	pub handler: &'static str,

	/// The configured total time budget
	pub timeout: Duration,

	/// The reason attached to the most recent [`PollAgain`](`crate::PollAgain`)
	pub last_reason: Option<String>,
}

fn format_reason(reason: &Option<String>) -> String {
	reason
		.as_ref()
		.map(|reason| format!(" (last status: {reason})"))
		.unwrap_or_default()
}

/// Attempt-to-attempt bookkeeping, kept in the job's signal scratchpad
#[derive(Clone, Debug)]
struct PollingState {
	started: Instant,
	interval: Duration,
	timeout: Duration,
	last_reason: Option<String>,
}

/// Configuration of the polling wrapper.
///
/// Defaults to one attempt per second with a five minute total budget.
///
/// ```
/// use std::time::Duration;
/// use taskmill::{Handler, HandlerOutput, Job, Polling};
///
/// # fn main() -> Result<(), taskmill::ConfigError> {
/// let attempt = Handler::new(async |_job: Job| {
///     // one poll against some remote state
///     HandlerOutput::PollAgain(Some("still converting".to_owned()))
/// });
///
/// let _stage = Polling::builder()
///     .interval(Duration::from_secs(5))
///     .timeout(Duration::from_secs(60))
///     .build()
///     .wrap(attempt)?;
/// # Ok(())
/// # }
/// ```
#[derive(bon::Builder, Clone, Copy, Debug)]
pub struct Polling {
	/// Delay between attempts
	#[builder(default = Duration::from_secs(1))]
	pub interval: Duration,

	/// Total time budget before the stage fails with [`PollingError`]
	#[builder(default = Duration::from_secs(300))]
	pub timeout: Duration,
}

impl Default for Polling {
	fn default() -> Self {
		Self::builder().build()
	}
}

impl Polling {
	/// Wraps `inner` so that returning [`PollAgain`](`crate::PollAgain`)
	/// re-schedules it after [`Polling::interval`] until it returns anything
	/// else or [`Polling::timeout`] elapses.
	///
	/// Works with every handler shape: sync or cooperative, with or without
	/// the job parameter.
	///
	/// # Errors
	/// [`ConfigError::ZeroPollInterval`] or [`ConfigError::ZeroPollTimeout`]
	/// if the respective duration is zero.
	pub fn wrap(self, inner: Handler) -> Result<Handler, ConfigError> {
		if self.interval.is_zero() {
			return Err(ConfigError::ZeroPollInterval);
		}

		if self.timeout.is_zero() {
			return Err(ConfigError::ZeroPollTimeout);
		}

		let fn_name = inner.fn_name();
		let handler = Handler::new(move |job: Job| {
			let inner = inner.clone();
			async move { poll_once(self, inner, fn_name, job).await }
		})
		.with_fn_name(fn_name);

		Ok(handler)
	}
}

/// One executor dispatch of a polling stage: a single attempt of the inner
/// handler, translated into an output, a repeat, or a timeout failure
async fn poll_once(
	config: Polling,
	inner: Handler,
	fn_name: &'static str,
	job: Job,
) -> Result<HandlerOutput, BoxError> {
	let state = match job
		.signal(POLLING_STATE_KEY)
		.and_then(|state| state.downcast_ref::<PollingState>().cloned())
	{
		Some(state) => state,
		None => {
			let state = PollingState {
				started: Instant::now(),
				interval: config.interval,
				timeout: config.timeout,
				last_reason: None,
			};

			job.set_signal(POLLING_STATE_KEY, payload(state.clone()));
			job.set_task_progress(Some(0.0), Some("Polling initiated".to_owned()));

			state
		}
	};

	// attempt errors are not retried, they fail the stage like any handler error
	let output = inner.call(job.clone()).await?;

	match output {
		HandlerOutput::PollAgain(reason) => {
			let last_reason = reason.or_else(|| state.last_reason.clone());

			if state.started.elapsed() > state.timeout {
				return Err(PollingError {
					task: job.task_name().unwrap_or_else(|| job.name().to_owned()),
					handler: fn_name,
					timeout: state.timeout,
					last_reason,
				}
				.into());
			}

			let interval = state.interval;
			job.set_signal(
				POLLING_STATE_KEY,
				payload(PollingState {
					last_reason,
					..state
				}),
			);

			Ok(HandlerOutput::Repeat(interval))
		}
		output => {
			job.clear_signal(POLLING_STATE_KEY);
			job.set_task_progress(None, Some("Polling completed".to_owned()));

			Ok(output)
		}
	}
}
