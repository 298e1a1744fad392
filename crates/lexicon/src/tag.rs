use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Context, KeyTo, Language, Reference, TagError};

/// A node of a [`Language`].
///
/// Tags are interned: two tags with the same path in the same language are
/// equal and share their node.
#[derive(Clone, Copy)]
pub struct Tag {
	index: u32,
	language: &'static Language,
}

impl Tag {
	pub(crate) fn new(index: u32, language: &'static Language) -> Self {
		Self { index, language }
	}

	pub fn index(&self) -> u32 {
		self.index
	}

	pub fn language(&self) -> &'static Language {
		self.language
	}

	/// Dotted path, e.g. `blockchain.user.email.address`.
	pub fn id(&self) -> &'static str {
		&self.language.node(self.index).id
	}

	/// Last path segment.
	pub fn name(&self) -> &'static str {
		&self.language.node(self.index).name
	}

	/// Number of path segments.
	pub fn depth(&self) -> usize {
		self.language.node(self.index).depth
	}

	pub fn parent(&self) -> Option<Tag> {
		self.language.node(self.index).parent.map(|p| Tag::new(p, self.language))
	}

	/// This tag followed by each ancestor up to the root.
	pub fn lineage(&self) -> impl Iterator<Item = Tag> + use<> {
		std::iter::successors(Some(*self), Tag::parent)
	}

	pub fn children(&self) -> impl Iterator<Item = Tag> + use<> {
		let language = self.language;
		language.node(self.index).children.iter().map(move |&c| Tag::new(c, language))
	}

	pub fn child(&self, name: &str) -> Option<Tag> {
		self.children().find(|c| c.name() == name)
	}

	/// Resolves a dotted path relative to this tag.
	pub fn descendant(&self, path: &str) -> Result<Tag, TagError> {
		self.language.tag(&format!("{}.{path}", self.id()))
	}

	/// Every tag this one is a, transitively, excluding itself.
	pub fn types(&self) -> impl Iterator<Item = Tag> + use<> {
		let language = self.language;
		language.node(self.index).types.iter().map(move |&t| Tag::new(t, language))
	}

	/// True if this tag is `other` or has it among its types.
	pub fn is(&self, other: impl Into<Tag>) -> bool {
		let other = other.into();
		std::ptr::eq(self.language, other.language) && (self.index == other.index || self.language.node(self.index).types.binary_search(&other.index).is_ok())
	}

	/// [`Tag::is`] by dotted id; false if `id` is not part of the language.
	pub fn is_a(&self, id: &str) -> bool {
		self.language.tag(id).is_ok_and(|t| self.is(t))
	}

	pub fn is_ancestor_of(&self, other: Tag) -> bool {
		*self != other && other.lineage().any(|t| t == *self)
	}

	pub fn is_descendant_of(&self, other: Tag) -> bool {
		other.is_ancestor_of(*self)
	}

	/// True if instances of this tag are addressed by an id.
	pub fn is_collection(&self) -> bool {
		self.language.collection().is_some_and(|c| self.is(Tag::new(c, self.language)))
	}

	/// The `id` child that indexes this collection.
	pub fn collection_id(&self) -> Option<Tag> {
		if !self.is_collection() {
			return None;
		}
		self.language.collection_id_of(self.index)
	}

	/// Collection ids that must be bound before this tag names a single value,
	/// root first.
	///
	/// Every collection strictly above this tag contributes its id, unless this
	/// tag lies inside that id.
	pub fn template(&self) -> Vec<Tag> {
		let mut keys: Vec<Tag> = self
			.lineage()
			.skip(1)
			.filter_map(|ancestor| ancestor.collection_id())
			.filter(|key| *key != *self && !key.is_ancestor_of(*self))
			.collect();
		keys.reverse();
		keys
	}

	/// [`Tag::template`] plus this tag's own collection id, which may be bound
	/// but need not be.
	pub fn indexable(&self) -> Vec<Tag> {
		let mut keys = self.template();
		keys.extend(self.collection_id());
		keys
	}

	/// An unbound reference to this tag.
	pub fn reference(&self) -> Reference {
		Reference::new(*self)
	}

	/// A reference whose indices are bound from `context`.
	pub fn ref_to(&self, context: &Context) -> Reference {
		Reference::bound(*self, context)
	}

	/// Binds the index of `collection` to `id`.
	///
	/// `collection` may be the collection or its id tag.
	pub fn with(self, collection: Tag, id: impl Into<String>) -> KeyTo {
		KeyTo::new(self).with(collection, id)
	}
}

impl PartialEq for Tag {
	fn eq(&self, other: &Self) -> bool {
		self.index == other.index && std::ptr::eq(self.language, other.language)
	}
}

impl Eq for Tag {}

impl Hash for Tag {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.index.hash(state);
	}
}

impl fmt::Debug for Tag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Tag({})", self.id())
	}
}

impl fmt::Display for Tag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.id())
	}
}

impl Serialize for Tag {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.id())
	}
}

impl<'de> Deserialize<'de> for Tag {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let id = String::deserialize(deserializer)?;
		Language::root().tag(&id).map_err(serde::de::Error::custom)
	}
}
