/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Handler`] type, the executor-facing form of a
//! user task function, and the [`IntoHandlerOutput`] return-value conversion.
//!
//! Task functions come in four shapes: cooperative or synchronous, taking the
//! [`Job`] or taking nothing. Each shape has its own constructor, so the
//! dispatch kind is decided exactly once and invoking a handler is a plain
//! match. Synchronous handlers are offloaded to the blocking thread pool and
//! never stall the drivers of other jobs.

use std::{
	any::{Any, type_name},
	fmt,
	future::Future,
	panic::AssertUnwindSafe,
	sync::Arc,
	time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use tokio::task;

use crate::{
	error::BoxError,
	job::Job,
	payload::TaskPayload,
	signal::{PollAgain, Repeat},
};

type AsyncTaskFn = Arc<dyn Fn(Job) -> BoxFuture<'static, Result<HandlerOutput, BoxError>> + Send + Sync>;
type BlockingTaskFn = Arc<dyn Fn(Job) -> Result<HandlerOutput, BoxError> + Send + Sync>;

/// What one handler invocation resolved to, after return-value conversion
pub enum HandlerOutput {
	/// The handler produced no value; the stage completes without an output
	None,

	/// A regular stage output
	Value(TaskPayload),

	/// Run the same stage again after the delay
	Repeat(Duration),

	/// Keep polling; meaningful only under the polling wrapper
	PollAgain(Option<String>),
}

impl fmt::Debug for HandlerOutput {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::None => f.write_str("None"),
			Self::Value(_) => f.write_str("Value(..)"),
			Self::Repeat(delay) => f.debug_tuple("Repeat").field(delay).finish(),
			Self::PollAgain(reason) => f.debug_tuple("PollAgain").field(reason).finish(),
		}
	}
}

/// Conversion of handler return values into a [`HandlerOutput`].
///
/// Lets a task function return whatever reads most naturally at its call
/// site: `()` for no output, a [`TaskPayload`](`crate::payload::payload`) for
/// a value, a [`Repeat`] or [`PollAgain`] signal, a ready [`HandlerOutput`],
/// or a [`Result`] of any of these with any boxable error.
pub trait IntoHandlerOutput {
	/// Converts self into the output of the stage or a handler error
	///
	/// # Errors
	/// If self carries an error, e.g. it is an `Err` variant.
	fn into_handler_output(self) -> Result<HandlerOutput, BoxError>;
}

impl IntoHandlerOutput for HandlerOutput {
	fn into_handler_output(self) -> Result<HandlerOutput, BoxError> {
		Ok(self)
	}
}

impl IntoHandlerOutput for () {
	fn into_handler_output(self) -> Result<HandlerOutput, BoxError> {
		Ok(HandlerOutput::None)
	}
}

impl IntoHandlerOutput for TaskPayload {
	fn into_handler_output(self) -> Result<HandlerOutput, BoxError> {
		Ok(HandlerOutput::Value(self))
	}
}

impl IntoHandlerOutput for Repeat {
	fn into_handler_output(self) -> Result<HandlerOutput, BoxError> {
		Ok(HandlerOutput::Repeat(self.0))
	}
}

impl IntoHandlerOutput for PollAgain {
	fn into_handler_output(self) -> Result<HandlerOutput, BoxError> {
		Ok(HandlerOutput::PollAgain(self.reason))
	}
}

impl<T, E> IntoHandlerOutput for Result<T, E>
where
	T: IntoHandlerOutput,
	E: Into<BoxError>,
{
	fn into_handler_output(self) -> Result<HandlerOutput, BoxError> {
		self.map_err(Into::into)?.into_handler_output()
	}
}

/// A handler panicked instead of returning
#[derive(thiserror::Error, Clone, Debug)]
#[error("handler {handler} panicked: {message}")]
pub struct HandlerPanicked {
	/// Type path of the handler function
	pub handler: &'static str,

	/// The panic payload, when it was a string
	pub message: String,
}

impl HandlerPanicked {
	fn from_payload(handler: &'static str, panic_payload: &(dyn Any + Send)) -> Self {
		let message = panic_payload
			.downcast_ref::<&str>()
			.map(|s| (*s).to_owned())
			.or_else(|| panic_payload.downcast_ref::<String>().cloned())
			.unwrap_or_else(|| "<opaque panic payload>".to_owned());

		Self { handler, message }
	}
}

/// A registered task function with its dispatch kind fixed at construction.
///
/// Cloning a [`Handler`] shares the underlying function.
#[derive(Clone)]
pub struct Handler {
	kind: HandlerKind,

	/// Type path of the user function, kept for error reports
	fn_name: &'static str,
}

#[derive(Clone)]
enum HandlerKind {
	/// Cooperative: awaited right on the job's driver
	Async(AsyncTaskFn),

	/// Synchronous: offloaded to a blocking worker thread
	Blocking(BlockingTaskFn),
}

impl Handler {
	/// A cooperative handler that receives the job it runs for
	pub fn new<F, Fut, O>(func: F) -> Self
	where
		F: Fn(Job) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = O> + Send + 'static,
		O: IntoHandlerOutput,
	{
		let fn_name = type_name::<F>();
		Self {
			kind: HandlerKind::Async(Arc::new(move |job| {
				let fut = func(job);
				Box::pin(async move { fut.await.into_handler_output() })
			})),
			fn_name,
		}
	}

	/// A cooperative handler that doesn't need the job
	pub fn without_job<F, Fut, O>(func: F) -> Self
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = O> + Send + 'static,
		O: IntoHandlerOutput,
	{
		let fn_name = type_name::<F>();
		Self {
			kind: HandlerKind::Async(Arc::new(move |_job| {
				let fut = func();
				Box::pin(async move { fut.await.into_handler_output() })
			})),
			fn_name,
		}
	}

	/// A synchronous handler that receives the job it runs for.
	///
	/// It is run on the blocking thread pool, so it may be CPU-bound or
	/// perform blocking IO without stalling other jobs.
	pub fn blocking<F, O>(func: F) -> Self
	where
		F: Fn(Job) -> O + Send + Sync + 'static,
		O: IntoHandlerOutput,
	{
		let fn_name = type_name::<F>();
		Self {
			kind: HandlerKind::Blocking(Arc::new(move |job| func(job).into_handler_output())),
			fn_name,
		}
	}

	/// A synchronous handler that doesn't need the job, offloaded like
	/// [`Handler::blocking`]
	pub fn blocking_without_job<F, O>(func: F) -> Self
	where
		F: Fn() -> O + Send + Sync + 'static,
		O: IntoHandlerOutput,
	{
		let fn_name = type_name::<F>();
		Self {
			kind: HandlerKind::Blocking(Arc::new(move |_job| func().into_handler_output())),
			fn_name,
		}
	}

	/// Type path of the wrapped user function
	#[must_use]
	pub fn fn_name(&self) -> &'static str {
		self.fn_name
	}

	/// Keeps reporting the identity of the function this handler was built
	/// around even after it is wrapped by a decorator
	pub(crate) fn with_fn_name(mut self, fn_name: &'static str) -> Self {
		self.fn_name = fn_name;
		self
	}

	/// Invokes the handler for `job`, capturing panics as errors
	pub(crate) async fn call(&self, job: Job) -> Result<HandlerOutput, BoxError> {
		match &self.kind {
			HandlerKind::Async(func) => match AssertUnwindSafe(func(job)).catch_unwind().await {
				Ok(result) => result,
				Err(panic_payload) => {
					Err(HandlerPanicked::from_payload(self.fn_name, &*panic_payload).into())
				}
			},
			HandlerKind::Blocking(func) => {
				let func = Arc::clone(func);
				match task::spawn_blocking(move || func(job)).await {
					Ok(result) => result,
					Err(join_error) if join_error.is_panic() => Err(HandlerPanicked::from_payload(
						self.fn_name,
						&*join_error.into_panic(),
					)
					.into()),
					Err(join_error) => Err(join_error.into()),
				}
			}
		}
	}
}

impl fmt::Debug for Handler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let kind = match &self.kind {
			HandlerKind::Async(_) => "async",
			HandlerKind::Blocking(_) => "blocking",
		};

		f.debug_struct("Handler")
			.field("kind", &kind)
			.field("fn", &self.fn_name)
			.finish()
	}
}
