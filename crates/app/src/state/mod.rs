//! Session state: an observable, transactional store keyed by [`Reference`].
//!
//! Values typed as `blockchain.session.state.preference.value` are also written
//! through to [`Preferences`], scoped to the signed-in user or to the shared
//! scope for `blockchain.session.state.shared.value`, and are read back from
//! there when the in-memory store has no entry.

use std::sync::Arc;

use namespace_lexicon::signal::{Broadcast, Publisher, Subscription};
use namespace_lexicon::{Context, FetchError, FetchResult, Language, Metadata, Origin, Reference, TagKey, Value, ids, index_string};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::preferences::Preferences;

/// Preferences object holding persisted state values, keyed by scope.
pub const PREFERENCES_KEY: &str = "blockchain.session.state";

/// Scope shared by every user.
pub const SHARED_SCOPE: &str = "ø";

type Compute = Arc<dyn Fn() -> Value + Send + Sync>;

#[derive(Clone)]
enum Slot {
	Value(Value),
	Computed(Compute),
}

type Write = (Reference, Option<Slot>);

#[derive(Default)]
struct Pending {
	depth: u32,
	rolled_back: bool,
	/// Writes in order; `None` clears.
	writes: Vec<Write>,
}

#[derive(Default)]
struct Data {
	store: FxHashMap<Reference, Slot>,
	pending: Option<Pending>,
}

impl Data {
	/// `Some(None)` is a clear pending in the current transaction.
	fn slot(&self, reference: &Reference) -> Option<Option<Slot>> {
		if let Some(pending) = &self.pending
			&& let Some((_, slot)) = pending.writes.iter().rev().find(|(r, _)| r == reference)
		{
			return Some(slot.clone());
		}
		self.store.get(reference).cloned().map(Some)
	}

	fn apply(&mut self, reference: &Reference, slot: Option<Slot>) {
		match slot {
			Some(slot) => {
				self.store.insert(reference.clone(), slot);
			}
			None => {
				self.store.remove(reference);
			}
		}
	}

	fn keys(&self) -> Vec<Reference> {
		let mut keys: Vec<Reference> = self.store.keys().cloned().collect();
		if let Some(pending) = &self.pending {
			for (reference, _) in &pending.writes {
				if !keys.contains(reference) {
					keys.push(reference.clone());
				}
			}
		}
		keys
	}
}

struct Inner {
	language: &'static Language,
	data: Mutex<Data>,
	subjects: Mutex<FxHashMap<Reference, Broadcast<FetchResult>>>,
	preferences: Arc<dyn Preferences>,
}

/// Observable session state.
///
/// Cloning is cheap and shares the store.
#[derive(Clone)]
pub struct State {
	inner: Arc<Inner>,
}

impl State {
	pub fn new(language: &'static Language, preferences: Arc<dyn Preferences>) -> Self {
		Self {
			inner: Arc::new(Inner {
				language,
				data: Mutex::new(Data::default()),
				subjects: Mutex::new(FxHashMap::default()),
				preferences,
			}),
		}
	}

	pub fn language(&self) -> &'static Language {
		self.inner.language
	}

	/// Names `key`, binding missing collection ids from the ids held in state.
	///
	/// `blockchain.user.name.first` resolves to the signed-in user's entry when
	/// `blockchain.user.id` is set.
	pub fn resolve(&self, key: impl TagKey) -> Result<Reference, FetchError> {
		let mut reference = key.key(&Context::new());
		for missing in reference.missing() {
			let template = missing.template();
			let key = reference
				.indices()
				.iter()
				.filter(|(k, _)| template.contains(k))
				.fold(missing.reference(), |key, (k, v)| key.bind(*k, v.clone()));
			if let Ok((value, _)) = self.lookup(&key)
				&& let Some(id) = index_string(&value)
			{
				reference = reference.bind(missing, id);
			}
		}
		reference.validated()?;
		Ok(reference)
	}

	pub fn set(&self, key: impl TagKey, value: impl Into<Value>) -> Result<(), FetchError> {
		let reference = self.resolve(key)?;
		self.write(reference, Some(Slot::Value(value.into())));
		Ok(())
	}

	/// Stores a value recomputed on every read.
	pub fn set_computed(&self, key: impl TagKey, compute: impl Fn() -> Value + Send + Sync + 'static) -> Result<(), FetchError> {
		let reference = self.resolve(key)?;
		self.write(reference, Some(Slot::Computed(Arc::new(compute))));
		Ok(())
	}

	/// Removes the value at `key`.
	///
	/// Clearing `blockchain.user.id` ends the session: every value that is not
	/// shared, a preference, or stored is cleared in one transaction.
	pub fn clear(&self, key: impl TagKey) -> Result<(), FetchError> {
		let reference = self.resolve(key)?;
		if reference.tag().id() != ids::USER_ID {
			self.write(reference, None);
			return Ok(());
		}
		self.transaction(|state| {
			let keys = state.inner.data.lock().keys();
			for reference in keys {
				let tag = reference.tag();
				if tag.is_a(ids::SHARED_VALUE) || tag.is_a(ids::PREFERENCE_VALUE) || tag.is_a(ids::STORED_VALUE) {
					continue;
				}
				state.write(reference, None);
			}
			Ok(())
		})
	}

	pub fn get(&self, key: impl TagKey) -> Result<Value, FetchError> {
		let reference = self.resolve(key)?;
		self.lookup(&reference).map(|(value, _)| value)
	}

	pub fn get_as<T: DeserializeOwned>(&self, key: impl TagKey) -> Result<T, FetchError> {
		let reference = self.resolve(key)?;
		let (value, _) = self.lookup(&reference)?;
		serde_json::from_value(value).map_err(|e| FetchError::Decoding {
			reference,
			message: e.to_string(),
		})
	}

	pub fn contains(&self, key: impl TagKey) -> bool {
		self.get(key).is_ok()
	}

	pub fn result_for(&self, key: impl TagKey) -> FetchResult {
		let reference = key.key(&Context::new());
		match self.resolve(&reference) {
			Ok(resolved) => self.result(&resolved),
			Err(error) => FetchResult::Error(error, Metadata::new(reference, Origin::State)),
		}
	}

	/// True if every `ifs` value is `true` and no `unless` value is.
	pub fn yes(&self, ifs: &[&dyn TagKey], unless: &[&dyn TagKey]) -> bool {
		ifs.iter().all(|key| self.result_for(key).is_yes()) && !unless.iter().any(|key| self.result_for(key).is_yes())
	}

	/// Negation of [`State::yes`].
	pub fn no(&self, ifs: &[&dyn TagKey], unless: &[&dyn TagKey]) -> bool {
		!self.yes(ifs, unless)
	}

	/// Runs `body` as one batch.
	///
	/// Writes become visible to subscribers together when the outermost
	/// transaction returns `Ok`. An `Err` at any depth discards the whole batch.
	/// Reads inside the batch see its own writes.
	pub fn transaction<R, E>(&self, body: impl FnOnce(&State) -> Result<R, E>) -> Result<R, E> {
		self.inner.data.lock().pending.get_or_insert_with(Pending::default).depth += 1;
		let mut guard = TransactionGuard { state: self, commit: false };
		let result = body(self);
		guard.commit = result.is_ok();
		drop(guard);
		result
	}

	/// Current result, then one result per change to `key`.
	pub fn publisher(&self, key: impl TagKey) -> Publisher<FetchResult> {
		let reference = key.key(&Context::new());
		let reference = match self.resolve(&reference) {
			Ok(resolved) => resolved,
			Err(error) => return Publisher::just(FetchResult::Error(error, Metadata::new(reference, Origin::State))),
		};
		let state = self.clone();
		Publisher::new(move |sink| {
			let subject = state.subject(&reference);
			let subscription = {
				let sink = Arc::clone(&sink);
				subject.subscribe(move |result| sink(result.clone()))
			};
			sink(state.result(&reference));

			let state = state.clone();
			let reference = reference.clone();
			Subscription::new(move || {
				subscription.cancel();
				state.prune(&reference);
			})
		})
	}

	fn lookup(&self, reference: &Reference) -> Result<(Value, Origin), FetchError> {
		let slot = self.inner.data.lock().slot(reference);
		match slot {
			Some(Some(Slot::Value(value))) => Ok((value, Origin::State)),
			Some(Some(Slot::Computed(compute))) => Ok((compute(), Origin::Compute)),
			Some(None) => Err(FetchError::KeyDoesNotExist(reference.clone())),
			None => self
				.preference(reference)
				.map(|value| (value, Origin::State))
				.ok_or_else(|| FetchError::KeyDoesNotExist(reference.clone())),
		}
	}

	fn result(&self, reference: &Reference) -> FetchResult {
		match self.lookup(reference) {
			Ok((value, origin)) => FetchResult::Value(value, Metadata::new(reference.clone(), origin)),
			Err(error) => FetchResult::Error(error, Metadata::new(reference.clone(), Origin::State)),
		}
	}

	fn write(&self, reference: Reference, slot: Option<Slot>) {
		{
			let mut data = self.inner.data.lock();
			if let Some(pending) = data.pending.as_mut() {
				pending.writes.push((reference, slot));
				return;
			}
			data.apply(&reference, slot.clone());
		}
		self.committed(vec![(reference, slot)]);
	}

	fn end(&self, commit: bool) {
		let mut data = self.inner.data.lock();
		let depth = match data.pending.as_mut() {
			Some(pending) => {
				pending.depth -= 1;
				pending.rolled_back |= !commit;
				pending.depth
			}
			None => return,
		};
		if depth > 0 {
			return;
		}
		let Some(pending) = data.pending.take() else {
			return;
		};
		if pending.rolled_back {
			debug!(writes = pending.writes.len(), "state transaction rolled back");
			return;
		}
		for (reference, slot) in &pending.writes {
			data.apply(reference, slot.clone());
		}
		drop(data);
		self.committed(pending.writes);
	}

	/// Persists preferences and notifies subscribers once writes are applied.
	fn committed(&self, writes: Vec<Write>) {
		for (reference, slot) in &writes {
			if reference.tag().is_a(ids::PREFERENCE_VALUE) {
				self.persist(reference, slot.as_ref());
			}
		}

		let mut changed: Vec<&Reference> = Vec::with_capacity(writes.len());
		for (reference, _) in &writes {
			if !changed.contains(&reference) {
				changed.push(reference);
			}
		}
		for reference in &changed {
			self.notify(reference);
		}

		if changed.iter().any(|r| r.tag().id() == ids::USER_ID) {
			// User preferences are re-read from the new scope on demand.
			self.inner
				.data
				.lock()
				.store
				.retain(|r, _| !r.tag().is_a(ids::PREFERENCE_VALUE) || r.tag().is_a(ids::SHARED_VALUE));
			let observed: Vec<Reference> = self
				.inner
				.subjects
				.lock()
				.keys()
				.filter(|r| r.tag().is_a(ids::PREFERENCE_VALUE) && !changed.contains(r))
				.cloned()
				.collect();
			for reference in &observed {
				self.notify(reference);
			}
		}
	}

	fn notify(&self, reference: &Reference) {
		let subject = self.inner.subjects.lock().get(reference).cloned();
		if let Some(subject) = subject {
			subject.send(&self.result(reference));
		}
	}

	fn subject(&self, reference: &Reference) -> Broadcast<FetchResult> {
		self.inner.subjects.lock().entry(reference.clone()).or_default().clone()
	}

	fn prune(&self, reference: &Reference) {
		let mut subjects = self.inner.subjects.lock();
		if subjects.get(reference).is_some_and(Broadcast::is_empty) {
			subjects.remove(reference);
		}
	}

	/// Preference scope of `reference`: shared, or the signed-in user.
	fn scope(&self, reference: &Reference) -> Option<String> {
		if reference.tag().is_a(ids::SHARED_VALUE) {
			return Some(SHARED_SCOPE.to_owned());
		}
		let user = self.inner.language.tag(ids::USER_ID).ok()?;
		let slot = self.inner.data.lock().slot(&user.reference());
		match slot {
			Some(Some(Slot::Value(id))) => index_string(&id),
			_ => None,
		}
	}

	fn persist(&self, reference: &Reference, slot: Option<&Slot>) {
		let value = match slot {
			Some(Slot::Value(value)) => Some(value.clone()),
			Some(Slot::Computed(_)) => return,
			None => None,
		};
		let Some(scope) = self.scope(reference) else {
			debug!(reference = %reference, "no preference scope; value kept in memory only");
			return;
		};
		let key = reference.string();
		self.inner.preferences.update(PREFERENCES_KEY, &mut |object| {
			let entry = object.entry(scope.clone()).or_insert_with(|| Value::Object(serde_json::Map::new()));
			if let Value::Object(values) = entry {
				match &value {
					Some(value) => {
						values.insert(key.clone(), value.clone());
					}
					None => {
						values.remove(&key);
					}
				}
			}
		});
	}

	fn preference(&self, reference: &Reference) -> Option<Value> {
		if !reference.tag().is_a(ids::PREFERENCE_VALUE) {
			return None;
		}
		let scope = self.scope(reference)?;
		let object = self.inner.preferences.object(PREFERENCES_KEY)?;
		object.get(&scope)?.get(reference.string()).cloned()
	}
}

struct TransactionGuard<'a> {
	state: &'a State,
	commit: bool,
}

impl Drop for TransactionGuard<'_> {
	fn drop(&mut self) {
		self.state.end(self.commit);
	}
}

#[cfg(test)]
mod tests;
