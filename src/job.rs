/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Job`] type, the state machine at the heart of the crate

mod metadata;
mod task_ref;
mod termination;

pub use self::{
	metadata::{TaskMeta, TaskProgress},
	task_ref::{BadTaskRef, TaskRef},
	termination::TerminationState,
};

use std::{
	collections::HashMap,
	fmt,
	future::IntoFuture,
	sync::{Arc, Condvar, Mutex, MutexGuard},
	time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
	error::{BoxError, ConfigError, JobError, TaskError},
	payload::TaskPayload,
};

/// Task list used when a job is built without one
const DEFAULT_TASK: &str = "single_task";

/// A workload progressing through a fixed, ordered list of named stages.
///
/// A [`Job`] is a cheap handle: cloning it shares the same underlying job, so
/// the [`Executor`](`crate::Executor`) can drive it while any number of other
/// parties await or inspect it. All state access is internally synchronized.
///
/// The job is created with [`Job::builder`], submitted to an executor, and
/// then awaited (it implements [`IntoFuture`]) or blocked on with
/// [`Job::wait_for_result`]. While a stage runs, its handler reads the output
/// of the previous stage through [`Job::prev_output`] and reports progress
/// through [`Job::set_task_progress`].
#[derive(Clone)]
pub struct Job {
	inner: Arc<JobInner>,
}

struct JobInner {
	id: String,
	name: Option<String>,
	tasks: Vec<String>,
	created_at: DateTime<Utc>,
	state: Mutex<JobState>,

	/// Wakes synchronous [`Job::wait_for_result`] callers; paired with `state`
	state_changed: Condvar,

	/// Flipped to `true` exactly once, when the job becomes terminal
	done: watch::Sender<bool>,
}

#[derive(Default)]
struct JobState {
	/// `None` until the job enters its first task
	current: Option<usize>,
	input: Option<TaskPayload>,
	task_data: HashMap<usize, TaskPayload>,
	task_outputs: HashMap<usize, TaskPayload>,
	task_metadata: HashMap<usize, TaskMeta>,
	signals: HashMap<String, TaskPayload>,
	errors: Vec<TaskError>,
	termination: Option<TerminationState>,
}

#[bon::bon]
impl Job {
	/// Creates a new [`Job`] using the builder syntax.
	///
	/// # Errors
	/// [`ConfigError::EmptyTasks`] if an empty task list is provided.
	#[builder]
	pub fn new(
		/// Ordered names of the stages the job will run through.
		/// Defaults to a single stage called `single_task`.
		tasks: Option<Vec<String>>,

		/// Input available to the first task via [`Job::input`]
		data: Option<TaskPayload>,

		/// Human-readable name; the generated id is used when absent
		#[builder(into)]
		name: Option<String>,
	) -> Result<Self, ConfigError> {
		let tasks = match tasks {
			Some(tasks) if tasks.is_empty() => return Err(ConfigError::EmptyTasks),
			Some(tasks) => tasks,
			None => vec![DEFAULT_TASK.to_owned()],
		};

		let (done, _) = watch::channel(false);

		Ok(Self {
			inner: Arc::new(JobInner {
				id: format!("job_{}", Uuid::new_v4().simple()),
				name,
				tasks,
				created_at: Utc::now(),
				state: Mutex::new(JobState {
					input: data,
					..JobState::default()
				}),
				state_changed: Condvar::new(),
				done,
			}),
		})
	}
}

impl Job {
	fn lock(&self) -> MutexGuard<'_, JobState> {
		self.inner.state.lock().expect("job state lock poisoned")
	}

	/// Unique id of this job
	#[must_use]
	pub fn id(&self) -> &str {
		&self.inner.id
	}

	/// Human-readable name of the job, falling back to its id
	#[must_use]
	pub fn name(&self) -> &str {
		self.inner.name.as_deref().unwrap_or(&self.inner.id)
	}

	/// The task names the job runs through, in order
	#[must_use]
	pub fn tasks(&self) -> &[String] {
		&self.inner.tasks
	}

	/// Number of stages in the pipeline
	#[must_use]
	pub fn n_tasks(&self) -> usize {
		self.inner.tasks.len()
	}

	/// Name of the current task, or `None` before the job entered its first one
	#[must_use]
	pub fn task_name(&self) -> Option<String> {
		self.lock()
			.current
			.map(|index| self.inner.tasks[index].clone())
	}

	/// Index of the current task, or `None` before the job entered its first one
	#[must_use]
	pub fn current_task_index(&self) -> Option<usize> {
		self.lock().current
	}

	/// Whether the job has reached one of the terminal states
	#[must_use]
	pub fn is_terminal(&self) -> bool {
		self.lock().termination.is_some()
	}

	/// The terminal state, once one is reached
	#[must_use]
	pub fn termination_state(&self) -> Option<TerminationState> {
		self.lock().termination
	}

	/// Moves the job to its next stage.
	///
	/// Finishes the stage the job was in, if any: its progress becomes 1.0 and
	/// its leave time is stamped. Advancing past the last stage terminates the
	/// job as [`TerminationState::Success`]; otherwise the next stage's enter
	/// time is stamped. A no-op on a terminal job.
	///
	/// Normally only the driving executor calls this.
	///
	/// Returns the index of the now-current stage.
	pub fn advance(&self) -> Option<usize> {
		let mut state = self.lock();
		if state.termination.is_some() {
			return state.current;
		}

		let Some(current) = state.current else {
			state.task_metadata.insert(0, TaskMeta::entered_now());
			state.current = Some(0);
			return state.current;
		};

		{
			let meta = state
				.task_metadata
				.get_mut(&current)
				.expect("every entered stage has metadata");
			meta.progress = Some(TaskProgress {
				percent: 1.0,
				message: None,
			});
			meta.left_at = Some(Utc::now());
		}

		if current + 1 >= self.inner.tasks.len() {
			return self.finish(state, TerminationState::Success);
		}

		state
			.task_metadata
			.insert(current + 1, TaskMeta::entered_now());
		state.current = Some(current + 1);
		state.current
	}

	/// Marks the job terminal, stamps the current stage and wakes all waiters
	fn finish(
		&self,
		mut state: MutexGuard<'_, JobState>,
		termination: TerminationState,
	) -> Option<usize> {
		state.termination = Some(termination);

		if let Some(current) = state.current {
			let meta = state
				.task_metadata
				.get_mut(&current)
				.expect("every entered stage has metadata");
			if meta.left_at.is_none() {
				meta.left_at = Some(Utc::now());
			}
		}

		let current = state.current;
		drop(state);

		self.inner.state_changed.notify_all();
		self.inner.done.send_replace(true);

		current
	}

	/// Jumps to the given stage, by index or name.
	///
	/// The target stage's enter time is stamped if the job never visited it.
	/// A no-op on a terminal job.
	///
	/// # Errors
	/// [`BadTaskRef`] if the index is out of range or the name is not in the task list.
	pub fn set_current_task(&self, task: impl Into<TaskRef>) -> Result<usize, BadTaskRef> {
		let index = self.resolve(&task.into())?;

		let mut state = self.lock();
		if state.termination.is_none() {
			state
				.task_metadata
				.entry(index)
				.or_insert_with(TaskMeta::entered_now);
			state.current = Some(index);
		}

		Ok(index)
	}

	fn resolve(&self, task: &TaskRef) -> Result<usize, BadTaskRef> {
		match task {
			TaskRef::Index(index) if *index < self.inner.tasks.len() => Ok(*index),
			TaskRef::Index(_) => Err(BadTaskRef(task.clone())),
			TaskRef::Name(name) => self
				.inner
				.tasks
				.iter()
				.position(|t| t == name)
				.ok_or_else(|| BadTaskRef(task.clone())),
		}
	}

	/// The input the job was created with
	#[must_use]
	pub fn input(&self) -> Option<TaskPayload> {
		self.lock().input.clone()
	}

	/// Stores data for the current stage, or replaces the job input before the
	/// job entered its first stage. Ignored on a terminal job.
	pub fn set_task_data(&self, data: TaskPayload) {
		let mut state = self.lock();
		if state.termination.is_some() {
			return;
		}

		match state.current {
			Some(current) => {
				state.task_data.insert(current, data);
			}
			None => state.input = Some(data),
		}
	}

	/// Data stored for the current stage, or the job input before the first stage
	#[must_use]
	pub fn task_data(&self) -> Option<TaskPayload> {
		let state = self.lock();
		match state.current {
			Some(current) => state.task_data.get(&current).cloned(),
			None => state.input.clone(),
		}
	}

	/// Data stored for the given stage, by index or name
	///
	/// # Errors
	/// [`BadTaskRef`] if the index is out of range or the name is not in the task list.
	pub fn task_data_for(&self, task: impl Into<TaskRef>) -> Result<Option<TaskPayload>, BadTaskRef> {
		let index = self.resolve(&task.into())?;
		Ok(self.lock().task_data.get(&index).cloned())
	}

	/// Records the output of the current stage. Ignored on a terminal job or
	/// before the job entered its first stage.
	pub fn set_task_output(&self, output: TaskPayload) {
		let mut state = self.lock();
		if state.termination.is_some() {
			return;
		}

		if let Some(current) = state.current {
			state.task_outputs.insert(current, output);
		}
	}

	/// Output recorded for the given stage, by index or name
	///
	/// # Errors
	/// [`BadTaskRef`] if the index is out of range or the name is not in the task list.
	pub fn task_output_for(
		&self,
		task: impl Into<TaskRef>,
	) -> Result<Option<TaskPayload>, BadTaskRef> {
		let index = self.resolve(&task.into())?;
		Ok(self.lock().task_outputs.get(&index).cloned())
	}

	/// Output of the stage before the current one; `None` for the first stage
	#[must_use]
	pub fn prev_output(&self) -> Option<TaskPayload> {
		let state = self.lock();
		match state.current {
			Some(current) if current > 0 => state.task_outputs.get(&(current - 1)).cloned(),
			_ => None,
		}
	}

	/// Output of the final stage, if it produced one
	#[must_use]
	pub fn result(&self) -> Option<TaskPayload> {
		self.lock()
			.task_outputs
			.get(&(self.inner.tasks.len() - 1))
			.cloned()
	}

	/// Updates the current stage's progress.
	///
	/// A `None` percent keeps the previously reported value (0 when none was
	/// ever reported). Values above 1 are read as a 0-100 scale and divided by
	/// 100; the result is clamped to `0.0..=1.0`. The message always replaces
	/// the previous one. Ignored on a terminal job.
	pub fn set_task_progress(&self, percent: Option<f64>, message: Option<String>) {
		let mut state = self.lock();
		if state.termination.is_some() {
			return;
		}

		let Some(current) = state.current else {
			return;
		};

		let meta = state
			.task_metadata
			.get_mut(&current)
			.expect("every entered stage has metadata");

		let percent = percent.map_or_else(
			|| meta.progress.as_ref().map_or(0.0, |progress| progress.percent),
			TaskProgress::normalize,
		);

		meta.progress = Some(TaskProgress { percent, message });
	}

	/// Progress of the current stage, if any was reported
	#[must_use]
	pub fn task_progress(&self) -> Option<TaskProgress> {
		let state = self.lock();
		let current = state.current?;
		state
			.task_metadata
			.get(&current)
			.and_then(|meta| meta.progress.clone())
	}

	/// Timing and progress snapshot of the current stage
	#[must_use]
	pub fn task_meta(&self) -> Option<TaskMeta> {
		let state = self.lock();
		let current = state.current?;
		state.task_metadata.get(&current).cloned()
	}

	/// Timing and progress snapshot of the given stage, by index or name
	///
	/// # Errors
	/// [`BadTaskRef`] if the index is out of range or the name is not in the task list.
	pub fn task_meta_for(&self, task: impl Into<TaskRef>) -> Result<Option<TaskMeta>, BadTaskRef> {
		let index = self.resolve(&task.into())?;
		Ok(self.lock().task_metadata.get(&index).cloned())
	}

	/// Value stored in the signal scratchpad under `key`
	#[must_use]
	pub fn signal(&self, key: &str) -> Option<TaskPayload> {
		self.lock().signals.get(key).cloned()
	}

	/// Stores a scratchpad value for control-flow helpers.
	///
	/// Keys should be namespaced by the owning helper, and the helper is
	/// expected to clear its keys when it completes. Ignored on a terminal job.
	pub fn set_signal(&self, key: impl Into<String>, value: TaskPayload) {
		let mut state = self.lock();
		if state.termination.is_some() {
			return;
		}

		state.signals.insert(key.into(), value);
	}

	/// Removes and returns the scratchpad value under `key`
	pub fn clear_signal(&self, key: &str) -> Option<TaskPayload> {
		let mut state = self.lock();
		if state.termination.is_some() {
			return None;
		}

		state.signals.remove(key)
	}

	/// Records an error against the current task and terminates the job as
	/// [`TerminationState::Failed`].
	///
	/// The error is wrapped into a [`TaskError`] carrying the task name and a
	/// UTC timestamp and appended to the job's error list. Always returns
	/// `true`: the first unrecovered error is fatal, recovery is something a
	/// handler does explicitly before the error ever reaches the job.
	pub fn record_error(&self, error: impl Into<BoxError>) -> bool {
		let mut state = self.lock();
		if state.termination.is_some() {
			return true;
		}

		let task = match state.current {
			Some(current) => self.inner.tasks[current].clone(),
			None => "<not started>".to_owned(),
		};

		state.errors.push(TaskError::new(task, error.into()));
		self.finish(state, TerminationState::Failed);

		true
	}

	/// All errors recorded so far, oldest first
	#[must_use]
	pub fn errors(&self) -> Vec<TaskError> {
		self.lock().errors.clone()
	}

	/// The most recent recorded error
	#[must_use]
	pub fn error(&self) -> Option<TaskError> {
		self.lock().errors.last().cloned()
	}

	/// Cancels the job: it terminates as [`TerminationState::Cancelled`], its
	/// driver stops at the next suspension point and all waiters are woken.
	/// A no-op on a terminal job.
	pub fn cancel(&self) {
		let state = self.lock();
		if state.termination.is_some() {
			return;
		}

		self.finish(state, TerminationState::Cancelled);
	}

	/// Overall progress of the job in `0.0..=1.0`.
	///
	/// Every finished stage contributes its final percent (1.0 when it never
	/// reported progress); the currently running stage is not counted.
	#[must_use]
	pub fn progress(&self) -> f64 {
		let state = self.lock();

		let finished: f64 = state
			.task_metadata
			.values()
			.filter(|meta| meta.left_at.is_some())
			.map(|meta| {
				meta.progress
					.as_ref()
					.map_or(1.0, |progress| progress.percent)
			})
			.sum();

		#[expect(
			clippy::cast_precision_loss,
			reason = "task counts are nowhere near 2^52"
		)]
		let n_tasks = self.inner.tasks.len() as f64;

		finished / n_tasks
	}

	/// Wall-clock milliseconds from the job's creation to the moment it left
	/// its terminal stage, or to now while it is still live
	#[must_use]
	pub fn total_duration_ms(&self) -> i64 {
		let state = self.lock();

		let end = if state.termination.is_some() {
			state
				.current
				.and_then(|current| state.task_metadata.get(&current))
				.and_then(|meta| meta.left_at)
				.unwrap_or_else(Utc::now)
		} else {
			Utc::now()
		};

		end.signed_duration_since(self.inner.created_at)
			.num_milliseconds()
	}

	/// The job's outcome if it is terminal: the final stage's output on
	/// success, the [`JobError`] otherwise. `None` while the job is live.
	#[must_use]
	pub fn try_outcome(&self) -> Option<Result<Option<TaskPayload>, JobError>> {
		let state = self.lock();
		self.outcome_of(&state)
	}

	fn outcome_of(&self, state: &JobState) -> Option<Result<Option<TaskPayload>, JobError>> {
		Some(match state.termination? {
			TerminationState::Success => Ok(state
				.task_outputs
				.get(&(self.inner.tasks.len() - 1))
				.cloned()),
			TerminationState::Failed => Err(JobError::Failed(
				state.errors.last().cloned().unwrap_or_else(|| {
					TaskError::from_message(self.name(), "job failed without a recorded error")
				}),
			)),
			TerminationState::Cancelled => Err(JobError::Cancelled {
				job: self.name().to_owned(),
			}),
		})
	}

	/// Resolves when the job reaches a terminal state
	pub(crate) async fn terminated(&self) {
		let mut done = self.inner.done.subscribe();
		// returns immediately if the job is already terminal
		_ = done.wait_for(|done| *done).await;
	}

	/// Waits until the job is terminal.
	///
	/// Repeated calls on a terminal job observe the same outcome.
	///
	/// # Errors
	/// The recorded [`TaskError`] if the job failed, [`JobError::Cancelled`]
	/// if it was cancelled.
	pub async fn outcome(&self) -> Result<Option<TaskPayload>, JobError> {
		loop {
			if let Some(outcome) = self.try_outcome() {
				return outcome;
			}

			self.terminated().await;
		}
	}

	/// Blocks the calling thread until the job is terminal or the timeout elapses.
	///
	/// Returns the job's result on success and `default` when the timeout
	/// elapsed first. Timing out does not cancel the job.
	///
	/// Call this from synchronous code only. Awaiting the job (or
	/// [`Job::outcome`]) is the async equivalent; blocking a runtime worker
	/// thread here would stall the very driver this call is waiting on.
	///
	/// # Errors
	/// The recorded [`TaskError`] if the job failed, [`JobError::Cancelled`]
	/// if it was cancelled.
	pub fn wait_for_result(
		&self,
		timeout: Option<Duration>,
		default: Option<TaskPayload>,
	) -> Result<Option<TaskPayload>, JobError> {
		let deadline = timeout.map(|timeout| Instant::now() + timeout);
		let mut state = self.lock();

		loop {
			if let Some(outcome) = self.outcome_of(&state) {
				return outcome;
			}

			state = match deadline {
				Some(deadline) => {
					let now = Instant::now();
					if now >= deadline {
						return Ok(default);
					}

					self.inner
						.state_changed
						.wait_timeout(state, deadline - now)
						.expect("job state lock poisoned")
						.0
				}
				None => self
					.inner
					.state_changed
					.wait(state)
					.expect("job state lock poisoned"),
			};
		}
	}
}

impl fmt::Debug for Job {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.lock();
		f.debug_struct("Job")
			.field("id", &self.inner.id)
			.field("name", &self.inner.name)
			.field("tasks", &self.inner.tasks)
			.field("current", &state.current)
			.field("termination", &state.termination)
			.finish_non_exhaustive()
	}
}

/// Awaiting a job waits for it to terminate, like [`Job::outcome`]
impl IntoFuture for Job {
	type Output = Result<Option<TaskPayload>, JobError>;
	type IntoFuture = BoxFuture<'static, Self::Output>;

	fn into_future(self) -> Self::IntoFuture {
		Box::pin(async move { self.outcome().await })
	}
}

/// Awaiting a borrowed job waits for it to terminate, like [`Job::outcome`]
impl<'a> IntoFuture for &'a Job {
	type Output = Result<Option<TaskPayload>, JobError>;
	type IntoFuture = BoxFuture<'a, Self::Output>;

	fn into_future(self) -> Self::IntoFuture {
		Box::pin(self.outcome())
	}
}

#[cfg(test)]
mod tests {
	use std::{thread, time::Duration};

	use assert_matches::assert_matches;

	use super::{Job, TaskRef, TerminationState};
	use crate::{
		error::{ConfigError, JobError},
		payload::payload,
	};

	fn three_stage_job() -> Job {
		Job::builder()
			.tasks(vec!["a".to_owned(), "b".to_owned(), "c".to_owned()])
			.build()
			.expect("three tasks are a valid task list")
	}

	#[test]
	fn empty_task_list_is_rejected() {
		let result = Job::builder().tasks(Vec::new()).build();
		assert_matches!(result, Err(ConfigError::EmptyTasks));
	}

	#[test]
	fn default_task_list_is_a_single_task() {
		let job = Job::builder().build().expect("no tasks is a valid config");
		assert_eq!(job.tasks(), ["single_task"]);
	}

	#[test]
	fn name_falls_back_to_id() {
		let unnamed = Job::builder().build().expect("valid config");
		assert_eq!(unnamed.name(), unnamed.id());

		let named = Job::builder()
			.name("crunch")
			.build()
			.expect("valid config");
		assert_eq!(named.name(), "crunch");
	}

	#[test]
	fn advance_walks_every_stage_and_terminates() {
		let job = three_stage_job();
		assert_eq!(job.current_task_index(), None);

		assert_eq!(job.advance(), Some(0));
		assert_eq!(job.task_name().as_deref(), Some("a"));
		assert_eq!(job.advance(), Some(1));
		assert_eq!(job.advance(), Some(2));
		assert!(!job.is_terminal());

		assert_eq!(job.advance(), Some(2));
		assert_eq!(job.termination_state(), Some(TerminationState::Success));

		for index in 0..3_usize {
			let meta = job
				.task_meta_for(index)
				.expect("index is in range")
				.expect("stage was entered");
			assert!(meta.left_at.is_some(), "every stage must have been left");
		}

		// terminal jobs don't move
		assert_eq!(job.advance(), Some(2));
		assert_eq!(job.termination_state(), Some(TerminationState::Success));
	}

	#[test]
	fn task_data_round_trips_by_index_and_name() {
		let job = three_stage_job();
		job.advance();
		job.set_task_data(payload("for a"));
		job.advance();
		job.set_task_data(payload("for b"));

		let by_index = job
			.task_data_for(0_usize)
			.expect("index is in range")
			.expect("data was set");
		assert_eq!(by_index.downcast_ref::<&str>(), Some(&"for a"));

		let by_name = job
			.task_data_for("b")
			.expect("name is in the task list")
			.expect("data was set");
		assert_eq!(by_name.downcast_ref::<&str>(), Some(&"for b"));
	}

	#[test]
	fn unknown_task_refs_are_rejected() {
		let job = three_stage_job();
		assert_matches!(job.task_data_for("ghost"), Err(err) if err.0 == TaskRef::Name("ghost".to_owned()));
		assert_matches!(job.task_data_for(3_usize), Err(err) if err.0 == TaskRef::Index(3));
	}

	#[test]
	fn data_set_before_start_is_the_input() {
		let job = three_stage_job();
		job.set_task_data(payload(5_i64));
		assert_eq!(
			job.input().and_then(|input| input.downcast_ref::<i64>().copied()),
			Some(5)
		);
	}

	#[test]
	fn progress_is_normalized_and_read_back() {
		let job = three_stage_job();
		job.advance();

		job.set_task_progress(Some(50.0), Some("halfway".to_owned()));
		let progress = job.task_progress().expect("progress was set");
		assert!((progress.percent - 0.5).abs() < f64::EPSILON);
		assert_eq!(progress.message.as_deref(), Some("halfway"));

		// absent percent keeps the old value, message is replaced
		job.set_task_progress(None, None);
		let progress = job.task_progress().expect("progress was set");
		assert!((progress.percent - 0.5).abs() < f64::EPSILON);
		assert_eq!(progress.message, None);
	}

	#[test]
	fn overall_progress_counts_finished_stages_only() {
		let job = three_stage_job();
		assert!(job.progress().abs() < f64::EPSILON);

		job.advance();
		job.set_task_progress(Some(0.9), None);
		// the running stage is not counted
		assert!(job.progress().abs() < f64::EPSILON);

		job.advance();
		assert!((job.progress() - 1.0 / 3.0).abs() < f64::EPSILON);

		job.advance();
		job.advance();
		assert_eq!(job.termination_state(), Some(TerminationState::Success));
		assert!((job.progress() - 1.0).abs() < f64::EPSILON);
	}

	#[test]
	fn record_error_fails_the_job_at_the_current_task() {
		let job = three_stage_job();
		job.advance();
		job.advance();

		assert!(job.record_error(std::io::Error::other("disk on fire")));
		assert_eq!(job.termination_state(), Some(TerminationState::Failed));

		let error = job.error().expect("an error was recorded");
		assert_eq!(error.task, "b");
		assert_eq!(error.message, "disk on fire");
		assert!(error.cause.is_some(), "the original error must be kept");

		// terminal: no further advancement or outputs
		job.set_task_output(payload(1_i64));
		assert_eq!(job.advance(), Some(1));
		assert!(job.result().is_none());
	}

	#[test]
	fn awaiting_a_terminal_job_is_idempotent() {
		let job = three_stage_job();
		job.advance();
		job.record_error(std::io::Error::other("boom"));

		let first = tokio_test::block_on(job.outcome());
		let second = tokio_test::block_on(job.outcome());
		assert_matches!(&first, Err(JobError::Failed(err)) if err.message == "boom");
		assert_matches!(&second, Err(JobError::Failed(err)) if err.message == "boom");
	}

	#[test]
	fn wait_for_result_returns_the_default_on_timeout() {
		let job = three_stage_job();
		let result = job
			.wait_for_result(Some(Duration::from_millis(20)), Some(payload(-1_i64)))
			.expect("a timed out wait is not an error");
		assert_eq!(
			result.and_then(|v| v.downcast_ref::<i64>().copied()),
			Some(-1)
		);
		assert!(!job.is_terminal(), "timing out must not cancel the job");
	}

	#[test]
	fn wait_for_result_wakes_up_on_completion() {
		let job = three_stage_job();

		let walker = {
			let job = job.clone();
			thread::spawn(move || {
				thread::sleep(Duration::from_millis(30));
				job.advance();
				job.set_task_output(payload(1_i64));
				job.advance();
				job.set_task_output(payload(2_i64));
				job.advance();
				job.set_task_output(payload(3_i64));
				job.advance();
			})
		};

		let result = job
			.wait_for_result(Some(Duration::from_secs(5)), None)
			.expect("the job succeeds");
		assert_eq!(
			result.and_then(|v| v.downcast_ref::<i64>().copied()),
			Some(3)
		);

		walker.join().expect("walker thread doesn't panic");
	}

	#[test]
	fn cancel_terminates_and_reports_cancelled() {
		let job = three_stage_job();
		job.advance();
		job.cancel();

		assert_eq!(job.termination_state(), Some(TerminationState::Cancelled));
		assert_matches!(
			job.try_outcome().expect("job is terminal"),
			Err(JobError::Cancelled { .. })
		);

		// cancelling again changes nothing
		job.cancel();
		assert_eq!(job.termination_state(), Some(TerminationState::Cancelled));
	}

	#[test]
	fn jumping_by_name_moves_the_current_task() {
		let job = three_stage_job();
		job.advance();

		assert_eq!(job.set_current_task("c").expect("c is a task"), 2);
		assert_eq!(job.task_name().as_deref(), Some("c"));
		assert!(
			job.task_meta().expect("stage was entered").left_at.is_none(),
			"jumping must stamp entered_at but not left_at"
		);

		assert_matches!(job.set_current_task("ghost"), Err(_));
	}
}
