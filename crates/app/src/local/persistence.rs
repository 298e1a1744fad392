use std::io::Write;
use std::path::{Path, PathBuf};

use namespace_lexicon::Value;
use thiserror::Error;

/// Errors reading or writing the persisted local tree.
#[derive(Debug, Error)]
pub enum StoreError {
	/// Filesystem failure.
	#[error("I/O error on {path}: {error}")]
	Io {
		/// File being read or written.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The file does not hold a JSON document.
	#[error("invalid JSON in {path}: {error}")]
	Json {
		/// File being read.
		path: PathBuf,
		/// Parser error.
		error: serde_json::Error,
	},
}

/// Backing storage for [`Store`](super::Store).
pub trait Persistence: Send + Sync {
	/// The last saved tree, or `None` if nothing was saved yet.
	fn load(&self) -> Result<Option<Value>, StoreError>;

	fn save(&self, tree: &Value) -> Result<(), StoreError>;
}

/// The whole tree as one JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFile {
	path: PathBuf,
}

impl JsonFile {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn io(&self, error: std::io::Error) -> StoreError {
		StoreError::Io {
			path: self.path.clone(),
			error,
		}
	}
}

impl Persistence for JsonFile {
	fn load(&self) -> Result<Option<Value>, StoreError> {
		let bytes = match std::fs::read(&self.path) {
			Ok(bytes) => bytes,
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(error) => return Err(self.io(error)),
		};
		serde_json::from_slice(&bytes).map(Some).map_err(|error| StoreError::Json {
			path: self.path.clone(),
			error,
		})
	}

	fn save(&self, tree: &Value) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent()
			&& !parent.as_os_str().is_empty()
		{
			std::fs::create_dir_all(parent).map_err(|e| self.io(e))?;
		}
		let bytes = serde_json::to_vec_pretty(tree).map_err(|error| StoreError::Json {
			path: self.path.clone(),
			error,
		})?;

		let temp = self.path.with_extension("tmp");
		let mut file = std::fs::File::create(&temp).map_err(|e| self.io(e))?;
		file.write_all(&bytes).map_err(|e| self.io(e))?;
		file.sync_all().map_err(|e| self.io(e))?;
		drop(file);
		std::fs::rename(&temp, &self.path).map_err(|e| self.io(e))
	}
}
