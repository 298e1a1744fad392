use std::fmt;
use std::sync::LazyLock;

use namespace_lexicon_spec::{COLLECTION, COLLECTION_ID, ExpandedLexicon, LexiconSpec, SchemaError, expand, lexicon_payload};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{Context, KeyTo, Reference, Tag, TagError};

static ROOT: LazyLock<Language> = LazyLock::new(|| {
	const BYTES: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/lexicon.bin"));
	let payload = lexicon_payload(BYTES).unwrap_or_else(|e| panic!("embedded lexicon: {e}"));
	let lexicon: ExpandedLexicon = postcard::from_bytes(payload).unwrap_or_else(|e| panic!("failed to decode lexicon blob: {e}"));
	Language::new(lexicon)
});

pub(crate) struct Node {
	pub(crate) id: String,
	pub(crate) name: String,
	pub(crate) parent: Option<u32>,
	/// Sorted indices of every type, excluding the node itself.
	pub(crate) types: Vec<u32>,
	pub(crate) children: Vec<u32>,
	pub(crate) depth: usize,
}

/// An interned tag taxonomy.
///
/// Languages are built once and live for the rest of the process, which is
/// what lets [`Tag`] be a `Copy` handle.
pub struct Language {
	nodes: Vec<Node>,
	index: FxHashMap<String, u32>,
	collection: Option<u32>,
}

impl Language {
	/// The lexicon compiled into this crate.
	pub fn root() -> &'static Language {
		&ROOT
	}

	/// Expands `spec` and interns it for the lifetime of the process.
	pub fn from_spec(spec: &LexiconSpec) -> Result<&'static Language, SchemaError> {
		let language = Language::new(expand(spec)?);
		debug!(tags = language.len(), "interned lexicon");
		Ok(Box::leak(Box::new(language)))
	}

	fn new(lexicon: ExpandedLexicon) -> Self {
		let mut children: Vec<Vec<u32>> = vec![Vec::new(); lexicon.len()];
		for (i, node) in lexicon.nodes.iter().enumerate() {
			if let Some(parent) = node.parent {
				children[parent as usize].push(i as u32);
			}
		}

		let index: FxHashMap<String, u32> = lexicon.nodes.iter().enumerate().map(|(i, n)| (n.id.clone(), i as u32)).collect();
		let collection = index.get(COLLECTION).copied();

		let nodes = lexicon
			.nodes
			.into_iter()
			.zip(children)
			.map(|(node, children)| Node {
				depth: node.id.split('.').count(),
				id: node.id,
				name: node.name,
				parent: node.parent,
				types: node.types,
				children,
			})
			.collect();

		Self { nodes, index, collection }
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Looks up a tag by its dotted id.
	pub fn tag(&'static self, id: &str) -> Result<Tag, TagError> {
		if id.is_empty() {
			return Err(TagError::Empty);
		}
		self.index
			.get(id)
			.map(|&index| Tag::new(index, self))
			.ok_or_else(|| TagError::NotFound { id: id.to_owned() })
	}

	/// Parses a reference string such as `blockchain.user[oliver].name.first`.
	pub fn reference(&'static self, input: &str) -> Result<Reference, TagError> {
		Reference::parse(input, self)
	}

	/// Every tag, in id order.
	pub fn tags(&'static self) -> impl Iterator<Item = Tag> {
		(0..self.nodes.len() as u32).map(move |i| Tag::new(i, self))
	}

	pub(crate) fn node(&self, index: u32) -> &Node {
		&self.nodes[index as usize]
	}

	pub(crate) fn collection(&self) -> Option<u32> {
		self.collection
	}

	pub(crate) fn collection_id_of(&'static self, index: u32) -> Option<Tag> {
		self.node(index)
			.children
			.iter()
			.find(|&&c| self.node(c).name == COLLECTION_ID)
			.map(|&c| Tag::new(c, self))
	}
}

impl fmt::Debug for Language {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Language").field("tags", &self.nodes.len()).finish()
	}
}

/// Index of a tag in [`Language::root`].
///
/// Generated constants are `TagId`s so feature code can name tags with
/// compile-time checked paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagId(u32);

impl TagId {
	pub const fn new(index: u32) -> Self {
		Self(index)
	}

	pub const fn index(self) -> u32 {
		self.0
	}

	pub fn tag(self) -> Tag {
		Tag::new(self.0, Language::root())
	}

	/// Binds the index of `collection` to `id`.
	pub fn with(self, collection: TagId, id: impl Into<String>) -> KeyTo {
		self.tag().with(collection.tag(), id)
	}

	/// The reference for this tag, bound from `context`.
	pub fn ref_to(self, context: &Context) -> Reference {
		self.tag().ref_to(context)
	}
}

impl From<TagId> for Tag {
	fn from(id: TagId) -> Self {
		id.tag()
	}
}
