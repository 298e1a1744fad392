use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Stream, Subscription};

/// Receiving end of a [`Publisher`] subscription.
pub type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

type Subscribe<T> = Arc<dyn Fn(Sink<T>) -> Subscription + Send + Sync>;

/// A cold, restartable description of a value source.
///
/// Nothing happens until [`Publisher::sink`] is called; every call starts an
/// independent subscription that ends when its [`Subscription`] is dropped.
pub struct Publisher<T> {
	subscribe: Subscribe<T>,
}

impl<T> Clone for Publisher<T> {
	fn clone(&self) -> Self {
		Self {
			subscribe: Arc::clone(&self.subscribe),
		}
	}
}

impl<T> fmt::Debug for Publisher<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Publisher")
	}
}

impl<T: Send + 'static> Publisher<T> {
	pub fn new(subscribe: impl Fn(Sink<T>) -> Subscription + Send + Sync + 'static) -> Self {
		Self {
			subscribe: Arc::new(subscribe),
		}
	}

	/// A publisher that never emits.
	pub fn empty() -> Self {
		Self::new(|_| Subscription::empty())
	}

	pub fn sink(&self, receive: impl Fn(T) + Send + Sync + 'static) -> Subscription {
		(self.subscribe)(Arc::new(receive))
	}

	pub fn map<U: Send + 'static>(self, transform: impl Fn(T) -> U + Send + Sync + 'static) -> Publisher<U> {
		let transform = Arc::new(transform);
		Publisher::new(move |sink: Sink<U>| {
			let transform = Arc::clone(&transform);
			self.sink(move |value| sink(transform(value)))
		})
	}

	pub fn filter(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Publisher<T> {
		let predicate = Arc::new(predicate);
		Publisher::new(move |sink: Sink<T>| {
			let predicate = Arc::clone(&predicate);
			self.sink(move |value| {
				if predicate(&value) {
					sink(value);
				}
			})
		})
	}

	pub fn filter_map<U: Send + 'static>(self, transform: impl Fn(T) -> Option<U> + Send + Sync + 'static) -> Publisher<U> {
		let transform = Arc::new(transform);
		Publisher::new(move |sink: Sink<U>| {
			let transform = Arc::clone(&transform);
			self.sink(move |value| {
				if let Some(value) = transform(value) {
					sink(value);
				}
			})
		})
	}

	/// Maps each value to a publisher and forwards only the latest one.
	///
	/// The previous inner subscription is cancelled before the next starts.
	pub fn switch_map<U: Send + 'static>(self, transform: impl Fn(T) -> Publisher<U> + Send + Sync + 'static) -> Publisher<U> {
		let transform = Arc::new(transform);
		Publisher::new(move |sink: Sink<U>| {
			let inner: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
			let transform = Arc::clone(&transform);
			let current = Arc::clone(&inner);
			let outer = self.sink(move |value| {
				let next = transform(value);
				let previous = current.lock().take();
				drop(previous);
				let sink = Arc::clone(&sink);
				let subscription = next.sink(move |value| sink(value));
				let replaced = current.lock().replace(subscription);
				drop(replaced);
			});
			Subscription::new(move || {
				drop(outer);
				let last = inner.lock().take();
				drop(last);
			})
		})
	}

	/// The first value emitted synchronously on subscription, if any.
	pub fn first(&self) -> Option<T> {
		let slot: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
		let subscription = {
			let slot = Arc::clone(&slot);
			self.sink(move |value| {
				let mut slot = slot.lock();
				if slot.is_none() {
					*slot = Some(value);
				}
			})
		};
		subscription.cancel();
		slot.lock().take()
	}

	/// Bridges this publisher into async code.
	pub fn stream(&self) -> Stream<T> {
		let (tx, rx) = mpsc::unbounded_channel();
		let subscription = self.sink(move |value| {
			let _ = tx.send(value);
		});
		Stream::new(rx, subscription)
	}
}

impl<T: Clone + Send + Sync + 'static> Publisher<T> {
	/// Emits `value` once on every subscription.
	pub fn just(value: T) -> Self {
		Self::new(move |sink| {
			sink(value.clone());
			Subscription::empty()
		})
	}

	/// Emits a `Vec` of the latest value of each publisher once all have emitted,
	/// then again whenever any of them emits.
	pub fn combine_latest(publishers: Vec<Publisher<T>>) -> Publisher<Vec<T>> {
		Publisher::new(move |sink: Sink<Vec<T>>| {
			let latest: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new(vec![None; publishers.len()]));
			let subscriptions = publishers.iter().enumerate().map(|(i, publisher)| {
				let latest = Arc::clone(&latest);
				let sink = Arc::clone(&sink);
				publisher.sink(move |value| {
					let complete = {
						let mut latest = latest.lock();
						latest[i] = Some(value);
						latest.iter().cloned().collect::<Option<Vec<T>>>()
					};
					if let Some(values) = complete {
						sink(values);
					}
				})
			});
			Subscription::merge(subscriptions.collect::<Vec<_>>())
		})
	}
}

impl<T: PartialEq + Clone + Send + 'static> Publisher<T> {
	/// Drops values equal to the previous one.
	pub fn dedup(self) -> Publisher<T> {
		Publisher::new(move |sink: Sink<T>| {
			let last: Mutex<Option<T>> = Mutex::new(None);
			self.sink(move |value| {
				{
					let mut last = last.lock();
					if last.as_ref() == Some(&value) {
						return;
					}
					*last = Some(value.clone());
				}
				sink(value);
			})
		})
	}
}
