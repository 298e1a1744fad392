//! Session runtime over the namespace lexicon.
//!
//! An [`App`] owns an event bus and three stores, each addressed with tag
//! [`Reference`](namespace_lexicon::Reference)s:
//!
//! * [`State`] for session values, with transactions and per-user preferences;
//! * [`RemoteConfiguration`] for fetched flags, layered over defaults and
//!   local overrides;
//! * [`Store`] for everything else, a JSON tree keyed by reference route.
//!
//! [`App::publisher`] and [`App::set`] pick the store from the tag's types, so
//! callers rarely talk to the stores directly. Deep links arrive as events and
//! are dispatched by [`DeepLinks`].
//!
//! ```ignore
//! use namespace_lexicon::blockchain;
//! use namespace_app::App;
//!
//! let app = App::builder().build()?;
//! app.sign_in("oliver")?;
//! app.set(blockchain::user::name::first::ID, "Oliver")?;
//! let first: String = app.get(blockchain::user::name::first::ID)?;
//! ```

mod app;
pub mod config;
pub mod deep_link;
mod error;
mod event;
pub mod local;
pub mod preferences;
pub mod remote;
pub mod state;

pub use app::{App, AppBuilder, WeakApp};
pub use config::{AppConfig, ConfigError, DeepLinkConfig, LocalConfig, PendingPolicy, RemoteConfig};
pub use deep_link::{DeepLinks, Phase};
pub use error::AppError;
pub use event::{Event, EventObserver, Source};
pub use local::{Route, Store};
pub use preferences::{MemoryPreferences, Preferences};
pub use remote::{RemoteConfiguration, RemoteError, RemoteProvider, StaticRemote};
pub use state::State;
