use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{Reference, Tag, Value};

/// Why a lookup produced no value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
	/// Nothing is stored under the reference.
	#[error("{0} does not exist")]
	KeyDoesNotExist(Reference),

	/// The reference lacks bindings for required collection indices.
	#[error("{reference} is missing indices for {}", display_tags(.missing))]
	Unresolved {
		/// The incomplete reference.
		reference: Reference,
		/// Collection ids with no binding.
		missing: Vec<Tag>,
	},

	/// A stored value could not be decoded as the requested type.
	#[error("failed to decode {reference}: {message}")]
	Decoding {
		/// Where the value came from.
		reference: Reference,
		/// Decoder message.
		message: String,
	},

	/// Remote configuration has not completed its first fetch.
	#[error("remote configuration is not synchronized")]
	NotSynchronized,

	/// Any other failure, e.g. a remote fetch error.
	#[error("{0}")]
	Other(String),
}

fn display_tags(tags: &[Tag]) -> String {
	tags.iter().map(Tag::id).collect::<Vec<_>>().join(", ")
}

/// Which store answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
	App,
	State,
	RemoteConfiguration,
	Local,
	Compute,
}

/// Provenance attached to every [`FetchResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
	pub reference: Reference,
	pub origin: Origin,
}

impl Metadata {
	pub fn new(reference: Reference, origin: Origin) -> Self {
		Self { reference, origin }
	}
}

/// Outcome of an observable lookup: a value or an error, with provenance.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult<T = Value> {
	Value(T, Metadata),
	Error(FetchError, Metadata),
}

impl<T> FetchResult<T> {
	pub fn from_result(result: Result<T, FetchError>, metadata: Metadata) -> Self {
		match result {
			Ok(value) => FetchResult::Value(value, metadata),
			Err(error) => FetchResult::Error(error, metadata),
		}
	}

	pub fn value(&self) -> Option<&T> {
		match self {
			FetchResult::Value(value, _) => Some(value),
			FetchResult::Error(..) => None,
		}
	}

	pub fn error(&self) -> Option<&FetchError> {
		match self {
			FetchResult::Value(..) => None,
			FetchResult::Error(error, _) => Some(error),
		}
	}

	pub fn is_value(&self) -> bool {
		matches!(self, FetchResult::Value(..))
	}

	pub fn metadata(&self) -> &Metadata {
		match self {
			FetchResult::Value(_, metadata) | FetchResult::Error(_, metadata) => metadata,
		}
	}

	pub fn reference(&self) -> &Reference {
		&self.metadata().reference
	}

	pub fn get(self) -> Result<T, FetchError> {
		match self {
			FetchResult::Value(value, _) => Ok(value),
			FetchResult::Error(error, _) => Err(error),
		}
	}

	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchResult<U> {
		match self {
			FetchResult::Value(value, metadata) => FetchResult::Value(f(value), metadata),
			FetchResult::Error(error, metadata) => FetchResult::Error(error, metadata),
		}
	}
}

impl FetchResult<Value> {
	/// Decodes the value, mapping decoder failures to [`FetchError::Decoding`].
	pub fn decode<T: DeserializeOwned>(self) -> FetchResult<T> {
		match self {
			FetchResult::Value(value, metadata) => match serde_json::from_value(value) {
				Ok(decoded) => FetchResult::Value(decoded, metadata),
				Err(e) => FetchResult::Error(
					FetchError::Decoding {
						reference: metadata.reference.clone(),
						message: e.to_string(),
					},
					metadata,
				),
			},
			FetchResult::Error(error, metadata) => FetchResult::Error(error, metadata),
		}
	}

	/// True if the value is boolean `true`.
	pub fn is_yes(&self) -> bool {
		matches!(self.value(), Some(Value::Bool(true)))
	}
}
