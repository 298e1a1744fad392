//! Lexicon schema: the declared tag tree and its expanded form.
//!
//! A lexicon declares dotted tag paths and the tags each one *is a*. Declaring
//! a type makes the tag inherit every child of that type, recursively, so
//! `blockchain.user` typed as `blockchain.db.collection` gains
//! `blockchain.user.id`. [`expand`] resolves that inheritance once and flattens
//! the result into [`ExpandedLexicon`], which is what the runtime interns.
//!
//! The `compile` feature adds the build-script side: TOML parsing, blob
//! emission and generation of typed tag constants.

mod blob;
#[cfg(feature = "compile")]
pub mod compile;
mod expand;

pub use blob::{BlobError, FORMAT_VERSION, HEADER_LEN, LEXICON_MAGIC, lexicon_header, lexicon_payload};
pub use expand::{MAX_DEPTH, SchemaError, expand, is_valid_name};
use serde::{Deserialize, Serialize};

/// Root of every collection tag.
pub const COLLECTION: &str = "blockchain.db.collection";

/// Name of the child that indexes a collection.
pub const COLLECTION_ID: &str = "id";

/// A tag as declared in the lexicon source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclSpec {
	/// Dotted path, e.g. `blockchain.user.email.address`.
	pub id: String,
	/// Dotted paths of the tags this tag is a.
	#[serde(default)]
	pub types: Vec<String>,
}

/// The declared lexicon, before inheritance is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexiconSpec {
	#[serde(default)]
	pub tags: Vec<DeclSpec>,
}

impl LexiconSpec {
	pub fn new() -> Self {
		Self::default()
	}

	/// Declares `id` with the given types. Ancestors are implied.
	pub fn declare(mut self, id: &str, types: &[&str]) -> Self {
		self.tags.push(DeclSpec {
			id: id.to_owned(),
			types: types.iter().map(|t| (*t).to_owned()).collect(),
		});
		self
	}
}

/// A tag in the expanded lexicon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
	pub id: String,
	/// Last path segment.
	pub name: String,
	/// Index of the parent node.
	pub parent: Option<u32>,
	/// Indices of every tag this node is a, transitively, excluding itself.
	pub types: Vec<u32>,
}

/// Every tag of a lexicon after inheritance, sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedLexicon {
	pub nodes: Vec<NodeSpec>,
}

impl ExpandedLexicon {
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Index of the node with `id`, by binary search.
	pub fn position(&self, id: &str) -> Option<usize> {
		self.nodes.binary_search_by(|n| n.id.as_str().cmp(id)).ok()
	}
}
