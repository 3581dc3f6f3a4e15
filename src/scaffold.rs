/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains a "scaffold", in other words, functions that
//! pre-configure common needs of an application embedding an
//! [`Executor`](`crate::Executor`): logging and Ctrl-C handling.

use tokio::sync::watch;
use tracing::subscriber::SetGlobalDefaultError;

/// The receiving end of a channel that is notified when Ctrl-C is pressed.
///
/// Meant to be wired to job cancellation: on notification, cancel the jobs
/// you submitted and shut the executor down.
#[derive(Clone, Debug)]
pub struct CtrlCSignalChannel(watch::Receiver<()>);

impl CtrlCSignalChannel {
	/// Blocks the current task until Ctrl-C is received
	pub async fn recv(&mut self) {
		// assume closed channel = shutdown requested
		_ = self.0.changed().await;
	}
}

/// Installs a tracing subscriber as the default.
///
/// The subscriber shows compact one-line log messages when the log level is
/// above DEBUG, and pretty multi-line log messages when it's set to DEBUG or
/// below. The level is taken from the standard `RUST_LOG` environment
/// variable, defaulting to INFO.
///
/// # Errors
/// If a different global tracing subscriber has already been registered.
///
/// # Panics
/// If the local timezone can't be determined.
pub fn set_up_logging() -> Result<(), SetGlobalDefaultError> {
	use tracing::Level;
	use tracing_subscriber::{
		EnvFilter, Layer, filter::LevelFilter, fmt::time::OffsetTime, layer::SubscriberExt,
	};

	let env_filter = EnvFilter::builder()
		.with_default_directive(LevelFilter::INFO.into())
		.from_env_lossy();

	let is_debug_log_level = env_filter
		.max_level_hint()
		.map_or_else(|| false, |level| level >= Level::DEBUG);

	let stdout = tracing_subscriber::fmt::layer()
		.with_target(is_debug_log_level)
		.with_file(is_debug_log_level)
		.with_line_number(is_debug_log_level)
		.with_thread_ids(is_debug_log_level)
		.with_timer(OffsetTime::local_rfc_3339().expect("could not get local time offset"));

	let stdout = if is_debug_log_level {
		stdout.pretty().boxed()
	} else {
		stdout.boxed()
	};

	let subscriber = tracing_subscriber::registry().with(stdout.with_filter(env_filter));

	tracing::subscriber::set_global_default(subscriber)
}

/// Starts a detached tokio task that waits for a Ctrl-C signal.
///
/// When the signal is received, every clone of the returned
/// [`CtrlCSignalChannel`] is notified.
#[must_use]
pub fn set_up_ctrl_c_handler() -> CtrlCSignalChannel {
	let (shutdown_tx, shutdown_rx) = watch::channel(());

	tokio::spawn(async move {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!("Failed to set up a CtrlC signal handler: {e}");
			return;
		}

		_ = shutdown_tx.send(());
	});

	CtrlCSignalChannel(shutdown_rx)
}
