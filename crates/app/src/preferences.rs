use namespace_lexicon::Value;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Key-value backend for values that outlive a session.
///
/// Objects are whole JSON documents; callers read, modify and write back.
pub trait Preferences: Send + Sync {
	fn object(&self, key: &str) -> Option<Value>;
	fn set_object(&self, key: &str, value: Value);

	/// Applies `update` to the object at `key`, starting from an empty map.
	fn update(&self, key: &str, update: &mut dyn FnMut(&mut serde_json::Map<String, Value>)) {
		let mut object = match self.object(key) {
			Some(Value::Object(object)) => object,
			_ => serde_json::Map::new(),
		};
		update(&mut object);
		self.set_object(key, Value::Object(object));
	}
}

/// Process-local [`Preferences`].
#[derive(Debug, Default)]
pub struct MemoryPreferences {
	objects: Mutex<FxHashMap<String, Value>>,
}

impl MemoryPreferences {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Preferences for MemoryPreferences {
	fn object(&self, key: &str) -> Option<Value> {
		self.objects.lock().get(key).cloned()
	}

	fn set_object(&self, key: &str, value: Value) {
		self.objects.lock().insert(key.to_owned(), value);
	}
}
