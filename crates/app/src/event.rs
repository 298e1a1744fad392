use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use namespace_lexicon::signal::{Publisher, Subscription};
use namespace_lexicon::{Context, Reference, Tag};
use parking_lot::Mutex;

/// Call site of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source {
	pub file: &'static str,
	pub line: u32,
}

impl Source {
	#[track_caller]
	pub fn caller() -> Self {
		let location = Location::caller();
		Self {
			file: location.file(),
			line: location.line(),
		}
	}
}

/// A posted event: the fired reference and the context it was posted with.
#[derive(Debug, Clone)]
pub struct Event {
	pub reference: Reference,
	pub context: Context,
	pub source: Source,
}

impl Event {
	pub fn tag(&self) -> Tag {
		self.reference.tag()
	}

	/// True if a subscription to `key` receives this event.
	///
	/// The event's tag must be `key`'s tag or one of its subtypes, and every
	/// index the subscription names must be bound the same way in the event.
	/// At the same tag a collection's own id must match exactly, so
	/// `collection` and `collection[test]` never see each other's events.
	pub fn matches(&self, key: &Reference) -> bool {
		let tag = self.tag();
		if !tag.is(key.tag()) {
			return false;
		}
		if tag == key.tag()
			&& let Some(id) = tag.collection_id()
			&& self.reference.index(id) != key.index(id)
		{
			return false;
		}
		key.indices().iter().all(|binding| self.reference.indices().contains(binding))
	}
}

/// A handler bound to an event publisher that can be started and stopped.
///
/// Nothing is delivered until [`EventObserver::start`]; dropping the observer
/// stops it.
pub struct EventObserver {
	publisher: Publisher<Event>,
	handler: Arc<dyn Fn(&Event) + Send + Sync>,
	subscription: Mutex<Option<Subscription>>,
	count: Arc<AtomicUsize>,
}

impl EventObserver {
	pub(crate) fn new(publisher: Publisher<Event>, handler: impl Fn(&Event) + Send + Sync + 'static) -> Self {
		Self {
			publisher,
			handler: Arc::new(handler),
			subscription: Mutex::new(None),
			count: Arc::new(AtomicUsize::new(0)),
		}
	}

	/// Starts delivering; a no-op if already running.
	pub fn start(&self) {
		let mut subscription = self.subscription.lock();
		if subscription.is_some() {
			return;
		}
		let handler = Arc::clone(&self.handler);
		let count = Arc::clone(&self.count);
		*subscription = Some(self.publisher.sink(move |event| {
			count.fetch_add(1, Ordering::SeqCst);
			handler(&event);
		}));
	}

	pub fn stop(&self) {
		let subscription = self.subscription.lock().take();
		drop(subscription);
	}

	pub fn is_running(&self) -> bool {
		self.subscription.lock().is_some()
	}

	/// Events handled since creation.
	pub fn count(&self) -> usize {
		self.count.load(Ordering::SeqCst)
	}
}
