/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`TaskPayload`] type and the [`payload`] helper

use std::{any::Any, sync::Arc};

/// A type-erased value flowing through a job's pipeline.
///
/// Stage inputs, stage outputs, and signal-map entries are all [`TaskPayload`]s.
/// The payload is reference-counted so the executor's driver and any number of
/// awaiters can hold the same value without copying the user's data.
///
/// Use [`payload`] to wrap a value and [`downcast_ref`](`std::any::Any::downcast_ref`)
/// to get it back out:
///
/// ```
/// use taskmill::payload;
///
/// let value = payload(42_i64);
/// assert_eq!(value.downcast_ref::<i64>().copied(), Some(42));
/// ```
pub type TaskPayload = Arc<dyn Any + Send + Sync>;

/// Wraps a value into a [`TaskPayload`]
#[must_use]
pub fn payload<T>(value: T) -> TaskPayload
where
	T: Any + Send + Sync,
{
	Arc::new(value)
}
