use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Context, FetchError, Language, Tag, TagError, TagId, Value};

/// A tag with its collection indices bound to concrete ids.
///
/// `blockchain.user[oliver].wallet[bitcoin].is.funded` is the tag
/// `blockchain.user.wallet.is.funded` with `blockchain.user.id = oliver` and
/// `blockchain.user.wallet.id = bitcoin`. Equality and hashing consider the
/// tag and its indices; the carried context is not part of identity.
#[derive(Clone)]
pub struct Reference {
	tag: Tag,
	/// Bound collection ids in lineage order, root first.
	indices: Vec<(Tag, String)>,
	context: Context,
}

impl Reference {
	pub(crate) fn new(tag: Tag) -> Self {
		Self {
			tag,
			indices: Vec::new(),
			context: Context::new(),
		}
	}

	pub(crate) fn bound(tag: Tag, context: &Context) -> Self {
		let indices = tag
			.indexable()
			.into_iter()
			.filter_map(|key| context.get(key).and_then(index_string).map(|id| (key, id)))
			.collect();
		Self {
			tag,
			indices,
			context: context.clone(),
		}
	}

	pub fn tag(&self) -> Tag {
		self.tag
	}

	pub fn context(&self) -> &Context {
		&self.context
	}

	pub fn indices(&self) -> &[(Tag, String)] {
		&self.indices
	}

	/// The id bound to `key`, which may be a collection or its id tag.
	pub fn index(&self, key: impl Into<Tag>) -> Option<&str> {
		let key = index_key(key.into());
		self.indices.iter().find(|(k, _)| *k == key).map(|(_, id)| id.as_str())
	}

	/// Required collection ids that are not bound.
	pub fn missing(&self) -> Vec<Tag> {
		self.tag
			.template()
			.into_iter()
			.filter(|key| !self.indices.iter().any(|(k, _)| k == key))
			.collect()
	}

	pub fn is_resolved(&self) -> bool {
		self.missing().is_empty()
	}

	/// Fails with [`FetchError::Unresolved`] if a required index is unbound.
	pub fn validated(&self) -> Result<&Self, FetchError> {
		let missing = self.missing();
		if missing.is_empty() {
			Ok(self)
		} else {
			Err(FetchError::Unresolved {
				reference: self.clone(),
				missing,
			})
		}
	}

	/// Fills unbound indices from `context`; existing bindings are kept.
	pub fn ref_to(&self, context: &Context) -> Reference {
		let merged = self.context.merged(context);
		let mut reference = Reference::bound(self.tag, &merged);
		for (key, id) in &self.indices {
			match reference.indices.iter_mut().find(|(k, _)| k == key) {
				Some(slot) => slot.1.clone_from(id),
				None => reference.indices.push((*key, id.clone())),
			}
		}
		reference.sort_indices();
		reference
	}

	/// Binds `key` (a collection or its id tag) to `id`, replacing any binding.
	pub fn bind(mut self, key: impl Into<Tag>, id: impl Into<String>) -> Self {
		let key = index_key(key.into());
		let id = id.into();
		match self.indices.iter_mut().find(|(k, _)| *k == key) {
			Some(slot) => slot.1 = id,
			None => self.indices.push((key, id)),
		}
		self.sort_indices();
		self
	}

	/// Drops the binding for `key`.
	pub fn unbind(mut self, key: impl Into<Tag>) -> Self {
		let key = index_key(key.into());
		self.indices.retain(|(k, _)| *k != key);
		self
	}

	pub fn with_context(mut self, context: Context) -> Self {
		self.context = context;
		self
	}

	fn sort_indices(&mut self) {
		self.indices.sort_by_key(|(k, _)| k.depth());
	}

	/// Path segments with bound ids spliced in after their collection, e.g.
	/// `["blockchain", "user", "oliver", "name", "first"]`.
	pub fn route(&self) -> Vec<String> {
		let mut route = Vec::with_capacity(self.tag.depth() + self.indices.len());
		for tag in self.segments() {
			route.push(tag.name().to_owned());
			if let Some(id) = self.collection_index(tag) {
				route.push(id.to_owned());
			}
		}
		route
	}

	/// [`Reference::route`] joined with underscores.
	pub fn underscored(&self) -> String {
		self.route().join("_")
	}

	/// Canonical string, e.g. `blockchain.user[oliver].name.first`.
	pub fn string(&self) -> String {
		let mut out = String::new();
		for tag in self.segments() {
			if !out.is_empty() {
				out.push('.');
			}
			out.push_str(tag.name());
			if let Some(id) = self.collection_index(tag) {
				out.push('[');
				out.push_str(id);
				out.push(']');
			}
		}
		out
	}

	fn segments(&self) -> impl Iterator<Item = Tag> + use<> {
		let mut lineage: Vec<Tag> = self.tag.lineage().collect();
		lineage.reverse();
		lineage.into_iter()
	}

	fn collection_index(&self, tag: Tag) -> Option<&str> {
		let key = tag.collection_id()?;
		self.indices.iter().find(|(k, _)| *k == key).map(|(_, id)| id.as_str())
	}

	/// Parses the canonical string form produced by [`Reference::string`].
	pub fn parse(input: &str, language: &'static Language) -> Result<Reference, TagError> {
		let syntax = |reason: &'static str| TagError::Syntax {
			input: input.to_owned(),
			reason,
		};

		let mut path = String::new();
		let mut bindings: Vec<(String, String)> = Vec::new();
		let mut chars = input.chars();
		let mut segment_closed = false;

		while let Some(c) = chars.next() {
			match c {
				'.' => {
					if path.is_empty() || path.ends_with('.') {
						return Err(syntax("empty segment"));
					}
					path.push('.');
					segment_closed = false;
				}
				'[' => {
					if path.is_empty() || path.ends_with('.') || segment_closed {
						return Err(syntax("index without a segment"));
					}
					let mut id = String::new();
					loop {
						match chars.next() {
							Some(']') => break,
							Some('[') | None => return Err(syntax("unterminated index")),
							Some(c) => id.push(c),
						}
					}
					bindings.push((path.clone(), id));
					segment_closed = true;
				}
				']' => return Err(syntax("unbalanced ']'")),
				_ if segment_closed => return Err(syntax("expected '.' after index")),
				c => path.push(c),
			}
		}
		if path.is_empty() || path.ends_with('.') {
			return Err(syntax("empty segment"));
		}

		let mut reference = language.tag(&path)?.reference();
		for (prefix, id) in bindings {
			let collection = language.tag(&prefix)?;
			let key = collection.collection_id().ok_or(TagError::NotACollection { id: prefix })?;
			reference = reference.bind(key, id);
		}
		Ok(reference)
	}
}

/// Normalizes a collection to its id tag.
fn index_key(tag: Tag) -> Tag {
	match tag.collection_id() {
		Some(id) => id,
		None => tag,
	}
}

/// The index string for a context value; strings bind raw, scalars stringify.
pub fn index_string(value: &Value) -> Option<String> {
	match value {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		_ => None,
	}
}

impl PartialEq for Reference {
	fn eq(&self, other: &Self) -> bool {
		self.tag == other.tag && self.indices == other.indices
	}
}

impl Eq for Reference {}

impl Hash for Reference {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.tag.hash(state);
		self.indices.hash(state);
	}
}

impl fmt::Debug for Reference {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Reference({})", self.string())
	}
}

impl fmt::Display for Reference {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.string())
	}
}

impl From<Tag> for Reference {
	fn from(tag: Tag) -> Self {
		tag.reference()
	}
}

impl From<TagId> for Reference {
	fn from(id: TagId) -> Self {
		id.tag().reference()
	}
}

impl Serialize for Reference {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.string())
	}
}

impl<'de> Deserialize<'de> for Reference {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let input = String::deserialize(deserializer)?;
		Reference::parse(&input, Language::root()).map_err(serde::de::Error::custom)
	}
}

/// Anything that can name a [`Reference`] once a call-site context is known.
pub trait TagKey {
	fn key(&self, context: &Context) -> Reference;
}

impl TagKey for Tag {
	fn key(&self, context: &Context) -> Reference {
		self.ref_to(context)
	}
}

impl TagKey for TagId {
	fn key(&self, context: &Context) -> Reference {
		self.tag().ref_to(context)
	}
}

impl TagKey for Reference {
	fn key(&self, context: &Context) -> Reference {
		self.ref_to(context)
	}
}

impl TagKey for KeyTo {
	fn key(&self, context: &Context) -> Reference {
		self.tag.ref_to(&context.merged(&self.context))
	}
}

impl<T: TagKey + ?Sized> TagKey for &T {
	fn key(&self, context: &Context) -> Reference {
		(**self).key(context)
	}
}

/// A tag with explicit index bindings, resolved against a call-site context.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyTo {
	tag: Tag,
	context: Context,
}

impl KeyTo {
	pub fn new(tag: Tag) -> Self {
		Self {
			tag,
			context: Context::new(),
		}
	}

	/// Binds `collection` (or its id tag) to `id`.
	pub fn with(mut self, collection: impl Into<Tag>, id: impl Into<String>) -> Self {
		self.context.insert(index_key(collection.into()), Value::String(id.into()));
		self
	}

	pub fn tag(&self) -> Tag {
		self.tag
	}

	/// Resolves against an empty context.
	pub fn reference(&self) -> Reference {
		self.key(&Context::new())
	}
}
