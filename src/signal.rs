/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the control-flow signals [`Repeat`] and [`PollAgain`]
//! that a handler may return in place of a regular output.
//!
//! Signals share the return channel with real outputs, which makes them
//! reserved wire values: a handler cannot emit a [`Repeat`] or, inside the
//! polling wrapper, a [`PollAgain`] as data.

use std::time::Duration;

/// Asks the executor to run the current stage again after the delay instead of advancing.
///
/// The job stays on its current task, keeps its data and metadata, and the
/// driver re-dispatches the same handler once the delay has passed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Repeat(pub Duration);

/// Returned by a handler wrapped with [`Polling`](`crate::Polling`) to request another attempt.
///
/// Only the polling wrapper interprets this value. A handler registered
/// without the wrapper that returns [`PollAgain`] just produces it as a normal
/// stage output.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PollAgain {
	/// The latest observed status, carried into the timeout report
	pub reason: Option<String>,
}

impl PollAgain {
	/// Polls again without attaching a status
	#[must_use]
	pub const fn new() -> Self {
		Self { reason: None }
	}

	/// Polls again, remembering the latest observed status
	#[must_use]
	pub fn because(reason: impl Into<String>) -> Self {
		Self {
			reason: Some(reason.into()),
		}
	}
}
