use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use namespace_lexicon::Value;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Errors from fetching remote configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
	/// The provider failed to fetch or activate values.
	#[error("remote fetch failed: {0}")]
	Fetch(String),

	/// No provider was configured.
	#[error("no remote configuration provider")]
	NoProvider,
}

/// Source of fetched configuration values.
///
/// Values are raw bytes keyed by remote key; JSON documents decode to their
/// value, anything else is taken as a UTF-8 string.
#[async_trait]
pub trait RemoteProvider: Send + Sync {
	/// Fetches every key, accepting cached values younger than `expiration`.
	async fn fetch(&self, expiration: Duration) -> Result<FxHashMap<String, Vec<u8>>, RemoteError>;
}

/// In-memory [`RemoteProvider`].
#[derive(Debug, Default)]
pub struct StaticRemote {
	values: Mutex<FxHashMap<String, Vec<u8>>>,
	failures: AtomicU32,
	fetches: AtomicU32,
}

impl StaticRemote {
	pub fn new() -> Self {
		Self::default()
	}

	/// Serves `values` encoded as JSON.
	pub fn from_values<K: Into<String>>(values: impl IntoIterator<Item = (K, Value)>) -> Self {
		let remote = Self::new();
		for (key, value) in values {
			remote.insert(key, value);
		}
		remote
	}

	pub fn insert(&self, key: impl Into<String>, value: Value) {
		self.values.lock().insert(key.into(), value.to_string().into_bytes());
	}

	pub fn insert_raw(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
		self.values.lock().insert(key.into(), bytes.into());
	}

	/// Fails the next `count` fetches.
	pub fn fail_next(&self, count: u32) {
		self.failures.store(count, Ordering::SeqCst);
	}

	/// Fetch attempts so far, failed ones included.
	pub fn fetches(&self) -> u32 {
		self.fetches.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl RemoteProvider for StaticRemote {
	async fn fetch(&self, _expiration: Duration) -> Result<FxHashMap<String, Vec<u8>>, RemoteError> {
		self.fetches.fetch_add(1, Ordering::SeqCst);
		let failing = self
			.failures
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok();
		if failing {
			return Err(RemoteError::Fetch("unavailable".into()));
		}
		Ok(self.values.lock().clone())
	}
}
