//! Local key-value store: a JSON tree addressed by reference routes.
//!
//! `blockchain.user[oliver].wallet[bitcoin].is.funded` lives at
//! `tree["blockchain"]["user"]["oliver"]["wallet"]["bitcoin"]["is"]["funded"]`,
//! so observing `blockchain.user[oliver]` sees every write below it.

mod persistence;

use std::fmt;
use std::sync::Arc;

use namespace_lexicon::signal::{Broadcast, Publisher};
use namespace_lexicon::{Reference, Value};
use parking_lot::Mutex;
use tracing::{debug, warn};

pub use self::persistence::{JsonFile, Persistence, StoreError};

/// Path of a value in the local tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route(Vec<String>);

impl Route {
	pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self(segments.into_iter().map(Into::into).collect())
	}

	pub fn segments(&self) -> &[String] {
		&self.0
	}

	/// True if `self` is `other` or one of its ancestors.
	pub fn is_prefix_of(&self, other: &Route) -> bool {
		other.0.starts_with(&self.0)
	}

	/// True if a write at either route can change the value at the other.
	pub fn overlaps(&self, other: &Route) -> bool {
		self.is_prefix_of(other) || other.is_prefix_of(self)
	}
}

impl From<&Reference> for Route {
	fn from(reference: &Reference) -> Self {
		Self(reference.route())
	}
}

impl fmt::Display for Route {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0.join("."))
	}
}

/// One mutation of a [`Store::batch`]; `None` clears.
pub type Write = (Route, Option<Value>);

struct Inner {
	tree: Mutex<Value>,
	changes: Broadcast<Vec<Route>>,
	persistence: Option<Box<dyn Persistence>>,
}

/// Observable JSON tree, optionally persisted.
#[derive(Clone)]
pub struct Store {
	inner: Arc<Inner>,
}

impl Default for Store {
	fn default() -> Self {
		Self::new()
	}
}

impl Store {
	/// An in-memory store.
	pub fn new() -> Self {
		Self::with_tree(empty(), None)
	}

	/// A store that loads from and saves to `persistence`.
	pub fn open(persistence: Box<dyn Persistence>) -> Result<Self, StoreError> {
		let tree = persistence.load()?.unwrap_or_else(empty);
		debug!(keys = tree.as_object().map_or(0, |o| o.len()), "opened local store");
		Ok(Self::with_tree(tree, Some(persistence)))
	}

	fn with_tree(tree: Value, persistence: Option<Box<dyn Persistence>>) -> Self {
		Self {
			inner: Arc::new(Inner {
				tree: Mutex::new(tree),
				changes: Broadcast::new(),
				persistence,
			}),
		}
	}

	pub fn get(&self, route: &Route) -> Option<Value> {
		let tree = self.inner.tree.lock();
		lookup(&tree, route).cloned()
	}

	pub fn contains(&self, route: &Route) -> bool {
		lookup(&self.inner.tree.lock(), route).is_some()
	}

	/// Writes `value`, replacing any non-object on the way with an object.
	pub fn set(&self, route: Route, value: impl Into<Value>) {
		self.batch(vec![(route, Some(value.into()))]);
	}

	pub fn clear(&self, route: Route) {
		self.batch(vec![(route, None)]);
	}

	/// Applies `writes` in order and notifies observers once.
	pub fn batch(&self, writes: Vec<Write>) {
		if writes.is_empty() {
			return;
		}
		let snapshot = {
			let mut tree = self.inner.tree.lock();
			for (route, value) in &writes {
				match value {
					Some(value) => insert(&mut tree, &route.0, value.clone()),
					None => remove(&mut tree, route),
				}
			}
			self.inner.persistence.is_some().then(|| tree.clone())
		};
		if let (Some(persistence), Some(tree)) = (&self.inner.persistence, snapshot)
			&& let Err(error) = persistence.save(&tree)
		{
			warn!(%error, "failed to persist local store");
		}
		let routes = writes.into_iter().map(|(route, _)| route).collect();
		self.inner.changes.send(&routes);
	}

	/// A copy of the whole tree.
	pub fn snapshot(&self) -> Value {
		self.inner.tree.lock().clone()
	}

	/// Current value at `route`, then the value after every overlapping write.
	pub fn publisher(&self, route: Route) -> Publisher<Option<Value>> {
		let store = self.clone();
		Publisher::new(move |sink| {
			let listener = {
				let store = store.clone();
				let route = route.clone();
				let sink = Arc::clone(&sink);
				move |changed: &Vec<Route>| {
					if changed.iter().any(|c| c.overlaps(&route)) {
						sink(store.get(&route));
					}
				}
			};
			let subscription = store.inner.changes.subscribe(listener);
			sink(store.get(&route));
			subscription
		})
	}
}

fn empty() -> Value {
	Value::Object(serde_json::Map::new())
}

fn lookup<'a>(tree: &'a Value, route: &Route) -> Option<&'a Value> {
	route.0.iter().try_fold(tree, |node, segment| node.as_object()?.get(segment))
}

fn insert(node: &mut Value, segments: &[String], value: Value) {
	let Some((head, rest)) = segments.split_first() else {
		*node = value;
		return;
	};
	if !node.is_object() {
		*node = empty();
	}
	if let Value::Object(map) = node {
		insert(map.entry(head.clone()).or_insert_with(empty), rest, value);
	}
}

fn remove(tree: &mut Value, route: &Route) {
	let Some((last, parents)) = route.0.split_last() else {
		*tree = empty();
		return;
	};
	let mut node = tree;
	for segment in parents {
		match node.as_object_mut().and_then(|o| o.get_mut(segment)) {
			Some(next) => node = next,
			None => return,
		}
	}
	if let Some(object) = node.as_object_mut() {
		object.remove(last);
	}
}
