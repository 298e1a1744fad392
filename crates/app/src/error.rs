use thiserror::Error;

use crate::config::ConfigError;
use crate::local::StoreError;

/// Errors that can occur when building an [`App`](crate::App).
#[derive(Debug, Error)]
pub enum AppError {
	/// Invalid configuration, including ids missing from the language.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// The local store's backing file could not be read.
	#[error(transparent)]
	Store(#[from] StoreError),
}
