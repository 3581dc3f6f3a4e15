/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`TaskMeta`] and [`TaskProgress`] types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress of a single pipeline stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
	/// Completion of the stage, always within `0.0..=1.0`
	pub percent: f64,

	/// Status line describing what the stage is currently doing
	pub message: Option<String>,
}

impl TaskProgress {
	/// Normalizes a raw percent value: values above 1 are read as a 0-100
	/// scale and divided by 100, the result is clamped to `0.0..=1.0`.
	pub(crate) fn normalize(percent: f64) -> f64 {
		let percent = if percent > 1.0 {
			percent / 100.0
		} else {
			percent
		};

		percent.clamp(0.0, 1.0)
	}
}

/// Timing and progress records of one stage of a job
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskMeta {
	/// When the job entered the stage
	pub entered_at: DateTime<Utc>,

	/// When the job advanced past, failed in, or was cancelled during the stage
	pub left_at: Option<DateTime<Utc>>,

	/// The last progress recorded for the stage, if any
	pub progress: Option<TaskProgress>,
}

impl TaskMeta {
	pub(crate) fn entered_now() -> Self {
		Self {
			entered_at: Utc::now(),
			left_at: None,
			progress: None,
		}
	}

	/// Wall-clock time spent in this stage so far, or in total once it was left
	#[must_use]
	pub fn duration_ms(&self) -> i64 {
		self.left_at
			.unwrap_or_else(Utc::now)
			.signed_duration_since(self.entered_at)
			.num_milliseconds()
	}
}

#[cfg(test)]
mod tests {
	use super::TaskProgress;

	#[test]
	fn percent_above_one_is_read_as_percentage() {
		assert!((TaskProgress::normalize(50.0) - 0.5).abs() < f64::EPSILON);
	}

	#[test]
	fn fractional_percent_is_kept() {
		assert!((TaskProgress::normalize(0.25) - 0.25).abs() < f64::EPSILON);
	}

	#[test]
	fn negative_percent_is_clamped_to_zero() {
		assert!(TaskProgress::normalize(-3.0).abs() < f64::EPSILON);
	}

	#[test]
	fn runaway_percentage_is_clamped_to_one() {
		assert!((TaskProgress::normalize(250.0) - 1.0).abs() < f64::EPSILON);
	}
}
