use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
	listener: Listener<T>,
	live: Arc<AtomicBool>,
}

struct Entries<T> {
	next: u64,
	/// Keyed by registration sequence, so iteration is registration order.
	live: BTreeMap<u64, Entry<T>>,
}

/// Multi-subscriber channel with synchronous, ordered delivery.
pub struct Broadcast<T> {
	entries: Arc<Mutex<Entries<T>>>,
}

impl<T> Clone for Broadcast<T> {
	fn clone(&self) -> Self {
		Self {
			entries: Arc::clone(&self.entries),
		}
	}
}

impl<T> Default for Broadcast<T> {
	fn default() -> Self {
		Self {
			entries: Arc::new(Mutex::new(Entries {
				next: 0,
				live: BTreeMap::new(),
			})),
		}
	}
}

impl<T: 'static> Broadcast<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `listener` until the returned [`Subscription`] is cancelled or dropped.
	pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
		let live = Arc::new(AtomicBool::new(true));
		let key = {
			let mut entries = self.entries.lock();
			let key = entries.next;
			entries.next += 1;
			entries.live.insert(
				key,
				Entry {
					listener: Arc::new(listener),
					live: Arc::clone(&live),
				},
			);
			key
		};
		let entries = Arc::downgrade(&self.entries);
		Subscription::new(move || {
			live.store(false, Ordering::Release);
			if let Some(entries) = entries.upgrade() {
				// The listener may own subscriptions of its own; drop it unlocked.
				let removed = entries.lock().live.remove(&key);
				drop(removed);
			}
		})
	}

	/// Delivers `value` to every live listener, in subscription order.
	///
	/// Listeners cancelled by an earlier listener during the same send are skipped.
	pub fn send(&self, value: &T) {
		let entries: Vec<(Listener<T>, Arc<AtomicBool>)> = self
			.entries
			.lock()
			.live
			.values()
			.map(|e| (Arc::clone(&e.listener), Arc::clone(&e.live)))
			.collect();
		for (listener, live) in entries {
			if live.load(Ordering::Acquire) {
				listener(value);
			}
		}
	}

	pub fn len(&self) -> usize {
		self.entries.lock().live.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().live.is_empty()
	}
}

impl<T> fmt::Debug for Broadcast<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Broadcast").field("listeners", &self.entries.lock().live.len()).finish()
	}
}

/// Handle to a registered listener.
///
/// Cancelling or dropping the handle deregisters the listener; no further
/// deliveries happen after either returns. [`Subscription::detach`] keeps the
/// listener alive for as long as its source exists.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
	cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
	pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
		Self {
			cancel: Some(Box::new(cancel)),
		}
	}

	/// A subscription with nothing to cancel.
	pub fn empty() -> Self {
		Self { cancel: None }
	}

	/// Cancels every subscription in `subscriptions` together.
	pub fn merge(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
		let subscriptions: Vec<Subscription> = subscriptions.into_iter().collect();
		Self::new(move || drop(subscriptions))
	}

	pub fn is_active(&self) -> bool {
		self.cancel.is_some()
	}

	pub fn cancel(mut self) {
		self.run();
	}

	/// Forgets the handle without cancelling.
	pub fn detach(mut self) {
		self.cancel = None;
	}

	fn run(&mut self) {
		if let Some(cancel) = self.cancel.take() {
			cancel();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.run();
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription").field("active", &self.is_active()).finish()
	}
}
