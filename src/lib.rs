/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! An in-process task-pipeline orchestrator.
//!
//! A [`Job`] is a named workload that advances through an ordered list of
//! tasks. An [`Executor`] drives many jobs concurrently on the tokio runtime,
//! dispatching each job's current stage to its registered [`Handler`] and
//! chaining every stage's output into the next one. The [`Polling`] wrapper
//! turns a single-attempt handler into a retry-until-success stage, and
//! [`Gather`] collects the outcomes of a whole batch of jobs.
//!
//! # Example
//!
//! ```
//! use taskmill::{Executor, Handler, Job, payload};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = Executor::new([
//!     ("double", Handler::new(async |job: Job| {
//!         let input = job
//!             .input()
//!             .and_then(|v| v.downcast_ref::<i64>().copied())
//!             .unwrap_or_default();
//!         payload(input * 2)
//!     })),
//! ])?;
//!
//! let job = Job::builder()
//!     .tasks(vec!["double".to_owned()])
//!     .data(payload(21_i64))
//!     .build()?;
//!
//! let result = executor.submit(job).await?;
//! assert_eq!(result.and_then(|v| v.downcast_ref::<i64>().copied()), Some(42));
//!
//! executor.shutdown(true).await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod executor;
pub mod gather;
pub mod handler;
pub mod job;
pub mod payload;
pub mod polling;
#[cfg(feature = "scaffold")]
pub mod scaffold;
pub mod signal;

pub use self::{
	error::{BoxError, ConfigError, JobError, TaskError},
	executor::{Executor, UnknownTaskError},
	gather::Gather,
	handler::{Handler, HandlerOutput, HandlerPanicked, IntoHandlerOutput},
	job::{BadTaskRef, Job, TaskMeta, TaskProgress, TaskRef, TerminationState},
	payload::{TaskPayload, payload},
	polling::{POLLING_STATE_KEY, Polling, PollingError},
	signal::{PollAgain, Repeat},
};
