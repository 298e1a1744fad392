use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::{ExpandedLexicon, LexiconSpec, NodeSpec};

/// Deepest path expansion may produce before inheritance is treated as cyclic.
pub const MAX_DEPTH: usize = 64;

/// Errors raised while validating or expanding a lexicon.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
	/// A declaration had an empty id.
	#[error("empty tag id")]
	Empty,

	/// A path segment is not a lowercase identifier.
	#[error("invalid segment '{name}' in '{id}'")]
	InvalidName {
		/// The declared id.
		id: String,
		/// The offending segment.
		name: String,
	},

	/// A declared type does not name a tag in the lexicon.
	#[error("'{id}' is a '{ty}', which is not declared")]
	UnknownType {
		/// The declaring tag.
		id: String,
		/// The missing type.
		ty: String,
	},

	/// Inheritance kept producing deeper paths.
	#[error("'{id}' is deeper than {MAX_DEPTH} segments; type inheritance is cyclic")]
	Cyclic {
		/// First path that crossed the limit.
		id: String,
	},
}

/// Returns true if `name` is a valid path segment (`[a-z_][a-z0-9_]*`).
pub fn is_valid_name(name: &str) -> bool {
	let mut chars = name.chars();
	let Some(first) = chars.next() else {
		return false;
	};
	(first.is_ascii_lowercase() || first == '_') && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Applies type inheritance to a fix point and flattens the result.
pub fn expand(spec: &LexiconSpec) -> Result<ExpandedLexicon, SchemaError> {
	let mut graph = Graph::default();

	for decl in &spec.tags {
		if decl.id.is_empty() {
			return Err(SchemaError::Empty);
		}
		if let Some(name) = decl.id.split('.').find(|n| !is_valid_name(n)) {
			return Err(SchemaError::InvalidName {
				id: decl.id.clone(),
				name: name.to_owned(),
			});
		}
		graph.declare(&decl.id);
		graph.types.entry(decl.id.clone()).or_default().extend(decl.types.iter().cloned());
	}

	for (id, types) in &graph.types {
		if let Some(ty) = types.iter().find(|ty| !graph.types.contains_key(*ty)) {
			return Err(SchemaError::UnknownType {
				id: id.clone(),
				ty: ty.clone(),
			});
		}
	}

	loop {
		let mut inherited = Vec::new();
		for (id, types) in &graph.types {
			for ty in types {
				let Some(names) = graph.children.get(ty) else {
					continue;
				};
				for name in names {
					let child = format!("{id}.{name}");
					let origin = format!("{ty}.{name}");
					if !graph.types.get(&child).is_some_and(|t| t.contains(&origin)) {
						inherited.push((child, origin));
					}
				}
			}
		}
		if inherited.is_empty() {
			break;
		}
		for (child, origin) in inherited {
			if child.split('.').count() > MAX_DEPTH {
				return Err(SchemaError::Cyclic { id: child });
			}
			graph.declare(&child);
			graph.types.entry(child).or_default().insert(origin);
		}
	}

	Ok(graph.flatten())
}

#[derive(Default)]
struct Graph {
	/// Direct types of every tag, keyed by id.
	types: BTreeMap<String, BTreeSet<String>>,
	/// Child names keyed by parent id.
	children: BTreeMap<String, BTreeSet<String>>,
}

impl Graph {
	fn declare(&mut self, id: &str) {
		let mut end: usize = 0;
		for segment in id.split('.') {
			let parent = &id[..end.saturating_sub(1)];
			end += segment.len() + 1;
			let path = &id[..end - 1];
			if !self.types.contains_key(path) {
				self.types.insert(path.to_owned(), BTreeSet::new());
			}
			if !parent.is_empty() {
				self.children.entry(parent.to_owned()).or_default().insert(segment.to_owned());
			}
		}
	}

	fn flatten(self) -> ExpandedLexicon {
		let index: BTreeMap<&str, u32> = self.types.keys().enumerate().map(|(i, id)| (id.as_str(), i as u32)).collect();

		let nodes = self
			.types
			.keys()
			.map(|id| {
				let (parent, name) = match id.rsplit_once('.') {
					Some((parent, name)) => (index.get(parent).copied(), name),
					None => (None, id.as_str()),
				};
				NodeSpec {
					id: id.clone(),
					name: name.to_owned(),
					parent,
					types: self.closure(id).iter().map(|t| index[t.as_str()]).collect(),
				}
			})
			.collect();

		ExpandedLexicon { nodes }
	}

	fn closure(&self, id: &str) -> BTreeSet<String> {
		let mut seen = BTreeSet::new();
		let mut stack: Vec<&str> = self.types.get(id).into_iter().flatten().map(String::as_str).collect();
		while let Some(ty) = stack.pop() {
			if ty == id || !seen.insert(ty.to_owned()) {
				continue;
			}
			stack.extend(self.types.get(ty).into_iter().flatten().map(String::as_str));
		}
		seen
	}
}
