/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`TerminationState`] type

use serde::{Deserialize, Serialize};

/// The final state of a job. Once entered, the job never changes again.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TerminationState {
	/// Every task of the job ran to completion
	Success,

	/// A task failed and the job stopped at it
	Failed,

	/// The job was cancelled before finishing its tasks
	Cancelled,
}
