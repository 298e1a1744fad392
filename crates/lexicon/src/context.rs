use std::fmt;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;

use crate::{FetchError, Tag, Value};

/// Tag-keyed values carried alongside events and lookups.
///
/// Insertion order is preserved. When two contexts are merged the right-hand
/// side wins, so call-site values override ones captured earlier.
#[derive(Clone, Default, PartialEq)]
pub struct Context(IndexMap<Tag, Value>);

impl Context {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, key: impl Into<Tag>, value: impl Into<Value>) -> Option<Value> {
		self.0.insert(key.into(), value.into())
	}

	/// Builder form of [`Context::insert`].
	pub fn with(mut self, key: impl Into<Tag>, value: impl Into<Value>) -> Self {
		self.insert(key, value);
		self
	}

	pub fn get(&self, key: impl Into<Tag>) -> Option<&Value> {
		self.0.get(&key.into())
	}

	pub fn get_str(&self, key: impl Into<Tag>) -> Option<&str> {
		self.get(key).and_then(Value::as_str)
	}

	pub fn contains(&self, key: impl Into<Tag>) -> bool {
		self.0.contains_key(&key.into())
	}

	pub fn remove(&mut self, key: impl Into<Tag>) -> Option<Value> {
		self.0.shift_remove(&key.into())
	}

	/// Decodes the value at `key`.
	pub fn decode<T: DeserializeOwned>(&self, key: impl Into<Tag>) -> Result<T, FetchError> {
		let key = key.into();
		let value = self.get(key).ok_or_else(|| FetchError::KeyDoesNotExist(key.reference()))?;
		T::deserialize(value).map_err(|e| FetchError::Decoding {
			reference: key.reference(),
			message: e.to_string(),
		})
	}

	/// A copy of `self` with every entry of `other` applied on top.
	pub fn merged(&self, other: &Context) -> Context {
		let mut merged = self.clone();
		merged.extend(other);
		merged
	}

	pub fn extend(&mut self, other: &Context) {
		for (key, value) in &other.0 {
			self.0.insert(*key, value.clone());
		}
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&Tag, &Value)> {
		self.0.iter()
	}
}

impl<K: Into<Tag>, V: Into<Value>> FromIterator<(K, V)> for Context {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}
}

impl fmt::Debug for Context {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.0.iter().map(|(k, v)| (k.id(), v))).finish()
	}
}
