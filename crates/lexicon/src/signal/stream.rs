use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use super::Subscription;

/// Why an async wait ended without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
	/// No value arrived before the deadline.
	#[error("timed out waiting for a value")]
	Timeout,
	/// The source stopped emitting.
	#[error("stream closed")]
	Closed,
}

/// Async receiver for a publisher subscription.
///
/// Owns the subscription; dropping the stream cancels it.
pub struct Stream<T> {
	rx: mpsc::UnboundedReceiver<T>,
	subscription: Subscription,
}

impl<T> Stream<T> {
	pub(super) fn new(rx: mpsc::UnboundedReceiver<T>, subscription: Subscription) -> Self {
		Self { rx, subscription }
	}

	pub async fn next(&mut self) -> Option<T> {
		self.rx.recv().await
	}

	/// Waits at most `timeout` for the next value.
	pub async fn next_within(&mut self, timeout: Duration) -> Result<T, WaitError> {
		match tokio::time::timeout(timeout, self.rx.recv()).await {
			Ok(Some(value)) => Ok(value),
			Ok(None) => Err(WaitError::Closed),
			Err(_) => Err(WaitError::Timeout),
		}
	}

	/// A value that has already arrived, without waiting.
	pub fn try_next(&mut self) -> Option<T> {
		self.rx.try_recv().ok()
	}

	/// Cancels the subscription; values already delivered stay readable.
	pub fn close(&mut self) {
		std::mem::replace(&mut self.subscription, Subscription::empty()).cancel();
		self.rx.close();
	}
}
