//! Layered remote configuration.
//!
//! Lookups consult overrides, then fetched values, then defaults, through a
//! list of candidate keys derived from the reference:
//!
//! 1. `!blockchain.app.configuration.apple.pay.is.enabled` (override)
//! 2. `blockchain_app_configuration_apple_pay_is_enabled`
//! 3. for every legacy prefix, e.g. `ios_ff`: `ios_ff_apple_pay_is_enabled`,
//!    then `ios_ff_apple_pay`
//! 4. `blockchain.app.configuration.apple.pay.is.enabled` (default)

mod provider;

use std::sync::Arc;

use namespace_lexicon::signal::{Broadcast, Publisher};
use namespace_lexicon::{Context, FetchError, FetchResult, Metadata, Origin, Reference, TagKey, Value};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub use self::provider::{RemoteError, RemoteProvider, StaticRemote};
use crate::config::RemoteConfig;
use crate::preferences::Preferences;

/// Preferences object holding persisted overrides, keyed by reference string.
pub const PREFERENCES_KEY: &str = "blockchain.session.configuration";

const IMPORTANT: &str = "!";

#[derive(Default)]
struct Layers {
	/// Keyed by reference string.
	defaults: FxHashMap<String, Value>,
	/// `None` until the first successful fetch.
	fetched: Option<FxHashMap<String, Value>>,
	/// Keyed by `!` and the reference string.
	overrides: FxHashMap<String, Value>,
}

impl Layers {
	fn first_of(&self, candidates: &[String]) -> Option<Value> {
		let empty = FxHashMap::default();
		let fetched = self.fetched.as_ref().unwrap_or(&empty);
		candidates
			.iter()
			.find_map(|key| self.overrides.get(key).or_else(|| fetched.get(key)).or_else(|| self.defaults.get(key)))
			.cloned()
	}
}

struct Inner {
	config: RemoteConfig,
	preferences: Arc<dyn Preferences>,
	layers: RwLock<Layers>,
	changes: Broadcast<()>,
}

/// Remote configuration values with local overrides.
///
/// Cloning is cheap and shares the layers.
#[derive(Clone)]
pub struct RemoteConfiguration {
	inner: Arc<Inner>,
}

impl RemoteConfiguration {
	/// Restores persisted overrides from `preferences`.
	pub fn new(config: RemoteConfig, preferences: Arc<dyn Preferences>) -> Self {
		let mut layers = Layers::default();
		if let Some(Value::Object(cached)) = preferences.object(PREFERENCES_KEY) {
			debug!(overrides = cached.len(), "restored remote configuration overrides");
			layers.overrides = cached.into_iter().map(|(key, value)| (format!("{IMPORTANT}{key}"), value)).collect();
		}
		Self {
			inner: Arc::new(Inner {
				config,
				preferences,
				layers: RwLock::new(layers),
				changes: Broadcast::new(),
			}),
		}
	}

	pub fn config(&self) -> &RemoteConfig {
		&self.inner.config
	}

	/// Replaces the default layer.
	pub fn set_defaults(&self, defaults: impl IntoIterator<Item = (Reference, Value)>) {
		self.inner.layers.write().defaults = defaults.into_iter().map(|(reference, value)| (reference.string(), value)).collect();
		self.notify();
	}

	/// True once a fetch has been applied.
	pub fn is_synchronized(&self) -> bool {
		self.inner.layers.read().fetched.is_some()
	}

	/// Applies a fetch of raw values.
	///
	/// Bytes that parse as JSON become that value; anything else is a string.
	pub fn apply(&self, fetched: FxHashMap<String, Vec<u8>>) {
		let values = fetched
			.into_iter()
			.map(|(key, bytes)| {
				let value = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
				(key, value)
			})
			.collect();
		self.apply_values(values);
	}

	/// Replaces the fetched layer and marks the configuration synchronized.
	pub fn apply_values(&self, values: FxHashMap<String, Value>) {
		debug!(keys = values.len(), "applied remote configuration");
		self.inner.layers.write().fetched = Some(values);
		self.notify();
	}

	/// Fetches from `provider` and applies the result.
	///
	/// Failed fetches are retried with exponential backoff up to
	/// `max_attempts`. A stale fetch asks the provider to bypass its cache.
	pub async fn synchronize(&self, provider: &dyn RemoteProvider, stale: bool) -> Result<(), RemoteError> {
		let config = &self.inner.config;
		let expiration = if stale { std::time::Duration::ZERO } else { config.expiration() };
		let attempts = config.max_attempts.max(1);
		let mut attempt = 0;
		loop {
			match provider.fetch(expiration).await {
				Ok(fetched) => {
					self.apply(fetched);
					return Ok(());
				}
				Err(error) if attempt + 1 < attempts => {
					let delay = config.backoff(attempt);
					warn!(%error, attempt, ?delay, "remote configuration fetch failed; retrying");
					tokio::time::sleep(delay).await;
					attempt += 1;
				}
				Err(error) => {
					warn!(%error, attempts, "remote configuration fetch failed; giving up");
					return Err(error);
				}
			}
		}
	}

	/// Overrides `key` until cleared; persisted to preferences.
	pub fn override_value(&self, key: impl TagKey, value: impl Into<Value>) {
		let reference = key.key(&Context::new());
		self.inner
			.layers
			.write()
			.overrides
			.insert(format!("{IMPORTANT}{}", reference.string()), value.into());
		self.persist();
		self.notify();
	}

	pub fn clear_override(&self, key: impl TagKey) {
		let reference = key.key(&Context::new());
		self.inner.layers.write().overrides.remove(&format!("{IMPORTANT}{}", reference.string()));
		self.persist();
		self.notify();
	}

	/// Drops every override.
	pub fn clear(&self) {
		self.inner.layers.write().overrides.clear();
		self.persist();
		self.notify();
	}

	pub fn contains(&self, key: impl TagKey) -> bool {
		let candidates = self.candidates(&key.key(&Context::new()));
		self.inner.layers.read().first_of(&candidates).is_some()
	}

	/// Every key of every layer; overrides carry their `!` prefix.
	pub fn all_keys(&self) -> Vec<String> {
		let layers = self.inner.layers.read();
		let mut keys: Vec<String> = layers
			.defaults
			.keys()
			.chain(layers.fetched.iter().flat_map(|fetched| fetched.keys()))
			.chain(layers.overrides.keys())
			.cloned()
			.collect();
		keys.sort();
		keys.dedup();
		keys
	}

	pub fn get(&self, key: impl TagKey) -> Result<Value, FetchError> {
		self.result_for(key).get()
	}

	pub fn get_as<T: DeserializeOwned>(&self, key: impl TagKey) -> Result<T, FetchError> {
		self.result_for(key).decode().get()
	}

	/// Value by raw remote key, bypassing candidate derivation.
	pub fn get_raw(&self, key: &str) -> Result<Value, FetchError> {
		let layers = self.inner.layers.read();
		let fetched = layers.fetched.as_ref().ok_or(FetchError::NotSynchronized)?;
		fetched.get(key).cloned().ok_or_else(|| FetchError::Other(format!("{key} does not exist")))
	}

	pub fn result_for(&self, key: impl TagKey) -> FetchResult {
		self.result(&key.key(&Context::new()))
	}

	/// Emits nothing until synchronized, then the current result and one
	/// result per layer change.
	pub fn publisher(&self, key: impl TagKey) -> Publisher<FetchResult> {
		let reference = key.key(&Context::new());
		let remote = self.clone();
		Publisher::new(move |sink| {
			let listener = {
				let remote = remote.clone();
				let reference = reference.clone();
				let sink = Arc::clone(&sink);
				move |_: &()| {
					if remote.is_synchronized() {
						sink(remote.result(&reference));
					}
				}
			};
			let subscription = remote.inner.changes.subscribe(listener);
			if remote.is_synchronized() {
				sink(remote.result(&reference));
			}
			subscription
		})
	}

	fn result(&self, reference: &Reference) -> FetchResult {
		let metadata = Metadata::new(reference.clone(), Origin::RemoteConfiguration);
		let layers = self.inner.layers.read();
		if layers.fetched.is_none() {
			return FetchResult::Error(FetchError::NotSynchronized, metadata);
		}
		match layers.first_of(&self.candidates(reference)) {
			Some(value) => FetchResult::Value(value, metadata),
			None => FetchResult::Error(FetchError::KeyDoesNotExist(reference.clone()), metadata),
		}
	}

	fn candidates(&self, reference: &Reference) -> Vec<String> {
		let string = reference.string();
		let underscored = reference.underscored();
		let mut candidates = vec![format!("{IMPORTANT}{string}"), underscored.clone()];
		let config = &self.inner.config;
		if !config.legacy_root.is_empty() && underscored.starts_with(&config.legacy_root) {
			for prefix in &config.legacy_prefixes {
				let legacy = underscored.replacen(&config.legacy_root, prefix, 1);
				let stripped = legacy.replace("_is_enabled", "");
				candidates.push(legacy);
				if !candidates.contains(&stripped) {
					candidates.push(stripped);
				}
			}
		}
		candidates.push(string);
		candidates
	}

	fn persist(&self) {
		let object: serde_json::Map<String, Value> = self
			.inner
			.layers
			.read()
			.overrides
			.iter()
			.map(|(key, value)| (key.trim_start_matches(IMPORTANT).to_owned(), value.clone()))
			.collect();
		self.inner.preferences.set_object(PREFERENCES_KEY, Value::Object(object));
	}

	fn notify(&self) {
		self.inner.changes.send(&());
	}
}

#[cfg(test)]
mod tests;
