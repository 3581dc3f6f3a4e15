/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`TaskRef`] type and its lookup error [`BadTaskRef`]

use std::fmt::{self, Display};

/// A way to point at one stage of a job, either positionally or by name
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TaskRef {
	/// Zero-based stage index
	Index(usize),

	/// Task name as given at job construction
	Name(String),
}

impl From<usize> for TaskRef {
	fn from(index: usize) -> Self {
		Self::Index(index)
	}
}

impl From<&str> for TaskRef {
	fn from(name: &str) -> Self {
		Self::Name(name.to_owned())
	}
}

impl From<String> for TaskRef {
	fn from(name: String) -> Self {
		Self::Name(name)
	}
}

impl Display for TaskRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Index(index) => write!(f, "#{index}"),
			Self::Name(name) => write!(f, "'{name}'"),
		}
	}
}

/// The referenced task is not part of the job's task list
#[derive(thiserror::Error, Clone, Debug)]
#[error("task {0} is not in this job's task list")]
pub struct BadTaskRef(pub TaskRef);
