use thiserror::Error;

/// Errors raised while naming tags and references.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
	/// An empty id was looked up.
	#[error("empty tag id")]
	Empty,

	/// The id is not part of the language.
	#[error("'{id}' does not exist in the language")]
	NotFound {
		/// The requested id.
		id: String,
	},

	/// An index was attached to a tag that is not a collection.
	#[error("'{id}' is not a collection and cannot be indexed")]
	NotACollection {
		/// The indexed id.
		id: String,
	},

	/// A reference string was malformed.
	#[error("invalid reference '{input}': {reason}")]
	Syntax {
		/// The full input.
		input: String,
		/// What was wrong with it.
		reason: &'static str,
	},
}
