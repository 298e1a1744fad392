//! Interned tag taxonomy and the primitives built on it.
//!
//! * [`Language`] interns the lexicon compiled from `assets/blockchain.toml`.
//! * [`Tag`] is a node of that taxonomy; [`Reference`] binds a tag's
//!   collection indices to concrete ids.
//! * [`Context`] carries tag-keyed values alongside events and lookups.
//! * [`FetchResult`] is what every observable lookup yields.
//! * [`signal`] holds the broadcast channel, subscriptions and cold publishers
//!   the session layer is written against.
//!
//! Tag constants are generated from the lexicon at build time, one module per
//! tag path:
//!
//! ```ignore
//! use namespace_lexicon::blockchain;
//!
//! let funded = blockchain::user::wallet::is::funded::ID
//! 	.with(blockchain::user::ID, "oliver")
//! 	.with(blockchain::user::wallet::ID, "bitcoin");
//! ```

mod context;
mod error;
mod fetch;
pub mod ids;
mod language;
mod reference;
pub mod signal;
mod tag;

pub use context::Context;
pub use error::TagError;
pub use fetch::{FetchError, FetchResult, Metadata, Origin};
pub use language::{Language, TagId};
pub use reference::{KeyTo, Reference, TagKey, index_string};
pub use serde_json::Value;
pub use tag::Tag;

include!(concat!(env!("OUT_DIR"), "/lexicon.rs"));
