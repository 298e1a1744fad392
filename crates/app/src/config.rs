//! Runtime configuration.
//!
//! Everything here has a production default, so an empty TOML document is a
//! valid configuration:
//!
//! ```toml
//! [deep_link]
//! pending = "latest"
//!
//! [remote]
//! expiration_secs = 3600
//! legacy_prefixes = ["ios_ff", "ios"]
//!
//! [local]
//! path = "/var/lib/app/local.json"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use namespace_lexicon::{Language, Tag, TagError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or shape.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A tag named by the configuration is not part of the language.
	#[error("{field} names an unknown tag: {error}")]
	UnknownTag {
		/// Configuration field holding the id.
		field: &'static str,
		/// Lookup failure.
		error: TagError,
	},
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration for an [`App`](crate::App).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
	pub deep_link: DeepLinkConfig,
	pub remote: RemoteConfig,
	pub local: LocalConfig,
}

impl AppConfig {
	pub fn from_toml_str(source: &str) -> Result<Self> {
		Ok(toml::from_str(source)?)
	}

	pub fn load(path: &Path) -> Result<Self> {
		let source = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_owned(),
			error,
		})?;
		Self::from_toml_str(&source)
	}
}

/// What to do with deep links that arrive before the app is ready for them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingPolicy {
	/// Keep only the most recent link.
	#[default]
	Latest,
	/// Keep every link and replay them in arrival order.
	Queue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeepLinkConfig {
	/// Boolean state value gating deep-link processing.
	pub ready: String,
	/// Boolean state value enabling tag references in URL fragments.
	pub dsl: String,
	/// Remote configuration value holding the rule list.
	pub rules: String,
	/// Event whose context carries a URL to process.
	pub process: String,
	/// Context key of that URL.
	pub url: String,
	pub pending: PendingPolicy,
}

impl Default for DeepLinkConfig {
	fn default() -> Self {
		Self {
			ready: "blockchain.app.is.ready.for.deep_link".into(),
			dsl: "blockchain.app.deep_link.dsl.is.enabled".into(),
			rules: "blockchain.app.configuration.deep_link.rules".into(),
			process: "blockchain.app.process.deep_link".into(),
			url: "blockchain.app.process.deep_link.url".into(),
			pending: PendingPolicy::Latest,
		}
	}
}

/// [`DeepLinkConfig`] with every id resolved against a language.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeepLinkTags {
	pub ready: Tag,
	pub dsl: Tag,
	pub rules: Tag,
	pub process: Tag,
	pub url: Tag,
}

impl DeepLinkConfig {
	pub(crate) fn resolve(&self, language: &'static Language) -> Result<DeepLinkTags> {
		let tag = |field: &'static str, id: &str| language.tag(id).map_err(|error| ConfigError::UnknownTag { field, error });
		Ok(DeepLinkTags {
			ready: tag("deep_link.ready", &self.ready)?,
			dsl: tag("deep_link.dsl", &self.dsl)?,
			rules: tag("deep_link.rules", &self.rules)?,
			process: tag("deep_link.process", &self.process)?,
			url: tag("deep_link.url", &self.url)?,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
	/// Cache lifetime requested from the provider.
	pub expiration_secs: u64,
	/// Delay before the first retry; doubles with every attempt.
	pub backoff_ms: u64,
	/// Fetch attempts before giving up.
	pub max_attempts: u32,
	/// Underscored prefix that legacy keys replace.
	pub legacy_root: String,
	/// Replacement prefixes tried, in order, after the underscored key.
	pub legacy_prefixes: Vec<String>,
}

impl Default for RemoteConfig {
	fn default() -> Self {
		Self {
			expiration_secs: 3600,
			backoff_ms: 500,
			max_attempts: 5,
			legacy_root: "blockchain_app_configuration".into(),
			legacy_prefixes: Vec::new(),
		}
	}
}

impl RemoteConfig {
	pub fn expiration(&self) -> Duration {
		Duration::from_secs(self.expiration_secs)
	}

	/// Delay before retry number `attempt` (zero based).
	pub fn backoff(&self, attempt: u32) -> Duration {
		Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << attempt.min(16)))
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalConfig {
	/// JSON file backing the local store; in-memory when unset.
	pub path: Option<PathBuf>,
}
