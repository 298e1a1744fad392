use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use namespace_lexicon::signal::{Broadcast, Publisher, Subscription, WaitError};
use namespace_lexicon::{Context, FetchError, FetchResult, Language, Metadata, Origin, Reference, Tag, TagKey, Value, ids, index_string};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::config::AppConfig;
use crate::deep_link::DeepLinks;
use crate::event::{Event, EventObserver, Source};
use crate::local::{JsonFile, Persistence, Route, Store};
use crate::preferences::{MemoryPreferences, Preferences};
use crate::remote::{RemoteConfiguration, RemoteError, RemoteProvider};
use crate::state::State;
use crate::AppError;

struct AppInner {
	language: &'static Language,
	config: AppConfig,
	events: Broadcast<Event>,
	router: Router,
	provider: Option<Arc<dyn RemoteProvider>>,
	deep_links: Arc<DeepLinks>,
	subscriptions: Mutex<Vec<Subscription>>,
}

/// The event bus and the stores behind it.
///
/// Cloning is cheap; every clone is the same app.
#[derive(Clone)]
pub struct App {
	inner: Arc<AppInner>,
}

/// Non-owning handle to an [`App`], held by the app's own listeners.
#[derive(Clone)]
pub struct WeakApp {
	inner: Weak<AppInner>,
}

impl WeakApp {
	pub fn upgrade(&self) -> Option<App> {
		self.inner.upgrade().map(|inner| App { inner })
	}
}

/// The stores a reference can be read from or written to.
#[derive(Clone)]
struct Router {
	state: State,
	remote: RemoteConfiguration,
	local: Store,
}

#[derive(Clone, Copy)]
enum Destination {
	State,
	Remote,
	Local,
}

impl Destination {
	/// State values and collection ids live in state, configuration values
	/// in remote configuration, everything else in the local store.
	fn of(tag: Tag) -> Self {
		if tag.is_a(ids::STATE_VALUE) || tag.is_a(ids::COLLECTION_ID) {
			Destination::State
		} else if tag.is_a(ids::CONFIGURATION_VALUE) {
			Destination::Remote
		} else {
			Destination::Local
		}
	}
}

impl Router {
	fn publisher(&self, reference: Reference) -> Publisher<FetchResult> {
		match Destination::of(reference.tag()) {
			Destination::State => self.state.publisher(reference),
			Destination::Remote => self.remote.publisher(reference),
			Destination::Local => {
				if let Err(error) = reference.validated() {
					return Publisher::just(FetchResult::Error(error, Metadata::new(reference, Origin::Local)));
				}
				self.local.publisher(Route::from(&reference)).map(move |value| {
					let metadata = Metadata::new(reference.clone(), Origin::Local);
					match value {
						Some(value) => FetchResult::Value(value, metadata),
						None => FetchResult::Error(FetchError::KeyDoesNotExist(reference.clone()), metadata),
					}
				})
			}
		}
	}
}

impl App {
	pub fn builder() -> AppBuilder {
		AppBuilder::default()
	}

	pub fn downgrade(&self) -> WeakApp {
		WeakApp {
			inner: Arc::downgrade(&self.inner),
		}
	}

	pub fn language(&self) -> &'static Language {
		self.inner.language
	}

	pub fn config(&self) -> &AppConfig {
		&self.inner.config
	}

	pub fn state(&self) -> &State {
		&self.inner.router.state
	}

	pub fn remote(&self) -> &RemoteConfiguration {
		&self.inner.router.remote
	}

	pub fn local(&self) -> &Store {
		&self.inner.router.local
	}

	pub fn deep_links(&self) -> &DeepLinks {
		&self.inner.deep_links
	}

	/// Posts `key` with an empty context.
	#[track_caller]
	pub fn post(&self, key: impl TagKey) {
		self.post_with(key, Context::new());
	}

	/// Posts `key`, binding its indices from `context` and then from state.
	///
	/// Every matching subscriber has run when this returns.
	#[track_caller]
	pub fn post_with(&self, key: impl TagKey, context: Context) {
		let reference = self.reference(key, &context);
		self.emit(reference, context, Source::caller());
	}

	/// `key` bound from `context`, with the ids it still lacks taken from
	/// state. Left as bound from `context` when state cannot complete it.
	fn reference(&self, key: impl TagKey, context: &Context) -> Reference {
		let reference = key.key(context);
		self.state().resolve(&reference).unwrap_or(reference)
	}

	/// Sets `key` to `value`, then posts it with the value in its context.
	#[track_caller]
	pub fn post_value(&self, key: impl TagKey, value: impl Into<Value>) -> Result<(), FetchError> {
		let source = Source::caller();
		let reference = self.state().resolve(key)?;
		let value = value.into();
		self.set(&reference, value.clone())?;
		let context = Context::new().with(reference.tag(), value);
		self.emit(reference, context, source);
		Ok(())
	}

	/// Posts `blockchain.ux.type.analytics.error` describing `error`.
	#[track_caller]
	pub fn post_error(&self, error: &dyn std::fmt::Display, context: Context) {
		let source = Source::caller();
		let language = self.inner.language;
		let tags = (
			language.tag(ids::ANALYTICS_ERROR),
			language.tag(ids::ANALYTICS_ERROR_MESSAGE),
			language.tag(ids::ANALYTICS_ERROR_SOURCE_FILE),
			language.tag(ids::ANALYTICS_ERROR_SOURCE_LINE),
		);
		let (Ok(event), Ok(message), Ok(file), Ok(line)) = tags else {
			warn!(%error, "language has no analytics error tags; error not posted");
			return;
		};
		let context = context
			.with(message, error.to_string())
			.with(file, source.file)
			.with(line, source.line);
		self.emit(event.ref_to(&context), context, source);
	}

	/// Posts the deep-link process event for `url`.
	#[track_caller]
	pub fn open_url(&self, url: &Url) {
		let tags = self.inner.deep_links.tags();
		self.post_with(tags.process, Context::new().with(tags.url, url.as_str()));
	}

	fn emit(&self, reference: Reference, context: Context, source: Source) {
		debug!(reference = %reference, file = source.file, line = source.line, "post");
		self.inner.events.send(&Event {
			reference,
			context,
			source,
		});
	}

	/// Events delivered to any of `keys`; see [`Event::matches`].
	///
	/// Keys are resolved against state once, when this is called.
	pub fn on<K: TagKey>(&self, keys: impl IntoIterator<Item = K>) -> Publisher<Event> {
		let context = Context::new();
		let keys: Vec<Reference> = keys.into_iter().map(|key| self.reference(key, &context)).collect();
		self.on_where(move |event| keys.iter().any(|key| event.matches(key)))
	}

	/// Every event accepted by `filter`.
	pub fn on_where(&self, filter: impl Fn(&Event) -> bool + Send + Sync + 'static) -> Publisher<Event> {
		let events = self.inner.events.clone();
		let filter = Arc::new(filter);
		Publisher::new(move |sink| {
			let filter = Arc::clone(&filter);
			events.subscribe(move |event| {
				if filter(event) {
					sink(event.clone());
				}
			})
		})
	}

	/// An unstarted observer running `handler` for events on `keys`.
	pub fn observe<K: TagKey>(&self, keys: impl IntoIterator<Item = K>, handler: impl Fn(&Event) + Send + Sync + 'static) -> EventObserver {
		EventObserver::new(self.on(keys), handler)
	}

	/// The next event on `key`.
	///
	/// The subscription starts when this is called, so posts made before the
	/// future is first polled are not missed.
	pub fn wait<K: TagKey>(&self, key: K, timeout: Duration) -> impl Future<Output = Result<Event, WaitError>> + use<K> {
		let mut stream = self.on([key]).stream();
		async move { stream.next_within(timeout).await }
	}

	/// Current value of `key` and every change to it, from whichever store
	/// owns it.
	///
	/// Indices `key` leaves unbound are taken from the current values of
	/// their id tags in state and follow those values as they change.
	pub fn publisher(&self, key: impl TagKey) -> Publisher<FetchResult> {
		let reference = key.key(&Context::new());
		let missing = reference.missing();
		let router = self.inner.router.clone();
		if missing.is_empty() {
			return router.publisher(reference);
		}

		let ids: Vec<Publisher<FetchResult>> = missing
			.iter()
			.map(|id| {
				let template = id.template();
				let key = reference
					.indices()
					.iter()
					.filter(|(k, _)| template.contains(k))
					.fold(id.reference(), |key, (k, v)| key.bind(*k, v.clone()));
				router.state.publisher(key)
			})
			.collect();

		Publisher::combine_latest(ids).switch_map(move |values| {
			let mut bound = reference.clone();
			for (id, result) in missing.iter().zip(&values) {
				match result.value().and_then(index_string) {
					Some(index) => bound = bound.bind(*id, index),
					None => {
						let error = FetchError::Unresolved {
							reference: reference.clone(),
							missing: missing.clone(),
						};
						return Publisher::just(FetchResult::Error(error, Metadata::new(reference.clone(), Origin::App)));
					}
				}
			}
			router.publisher(bound)
		})
	}

	/// [`App::publisher`] decoded as `T`; decoding failures are error results.
	pub fn publisher_as<T: DeserializeOwned + Send + 'static>(&self, key: impl TagKey) -> Publisher<FetchResult<T>> {
		self.publisher(key).map(FetchResult::decode)
	}

	/// The current value of `key` as `T`.
	pub fn get<T: DeserializeOwned>(&self, key: impl TagKey) -> Result<T, FetchError> {
		self.publisher(key).first().ok_or(FetchError::NotSynchronized)?.decode().get()
	}

	/// Writes `value` to the store that owns `key`.
	///
	/// Configuration values become overrides. An object written to a
	/// collection with no id bound writes one entry per key:
	/// `user[oliver].wallet = {"bitcoin": ..}` sets `user[oliver].wallet[bitcoin]`.
	pub fn set(&self, key: impl TagKey, value: impl Into<Value>) -> Result<(), FetchError> {
		let reference = self.state().resolve(key)?;
		let value = value.into();
		let tag = reference.tag();
		if tag.is_collection()
			&& reference.index(tag).is_none()
			&& let Value::Object(entries) = value
		{
			for (id, value) in entries {
				self.set(reference.clone().bind(tag, id), value)?;
			}
			return Ok(());
		}

		let router = &self.inner.router;
		match Destination::of(tag) {
			Destination::State => router.state.set(&reference, value)?,
			Destination::Remote => router.remote.override_value(&reference, value),
			Destination::Local => router.local.set(Route::from(&reference), value),
		}
		Ok(())
	}

	/// Removes `key` from the store that owns it.
	pub fn clear(&self, key: impl TagKey) -> Result<(), FetchError> {
		let reference = self.state().resolve(key)?;
		let router = &self.inner.router;
		match Destination::of(reference.tag()) {
			Destination::State => router.state.clear(&reference)?,
			Destination::Remote => router.remote.clear_override(&reference),
			Destination::Local => router.local.clear(Route::from(&reference)),
		}
		Ok(())
	}

	/// Signs `user_id` in between the will and did sign-in events.
	#[track_caller]
	pub fn sign_in(&self, user_id: &str) -> Result<(), FetchError> {
		let source = Source::caller();
		let user = self.runtime_tag(ids::USER_ID)?;
		self.emit(self.runtime_tag(ids::WILL_SIGN_IN)?.reference(), Context::new(), source);
		self.state().transaction(|state| state.set(user, user_id))?;
		self.emit(self.runtime_tag(ids::DID_SIGN_IN)?.reference(), Context::new(), source);
		Ok(())
	}

	/// Clears the session between the will and did sign-out events.
	#[track_caller]
	pub fn sign_out(&self) -> Result<(), FetchError> {
		let source = Source::caller();
		let user = self.runtime_tag(ids::USER_ID)?;
		self.emit(self.runtime_tag(ids::WILL_SIGN_OUT)?.reference(), Context::new(), source);
		self.state().clear(user)?;
		self.emit(self.runtime_tag(ids::DID_SIGN_OUT)?.reference(), Context::new(), source);
		Ok(())
	}

	/// Fetches remote configuration from the configured provider.
	///
	/// A stale refresh bypasses the provider's cache. On success
	/// `blockchain.app.configuration.remote.is.stale` is reset.
	///
	/// Apps built with a provider call this on their own; see
	/// [`AppBuilder::remote_provider`].
	pub async fn refresh_remote_configuration(&self, stale: bool) -> Result<(), RemoteError> {
		let provider = self.inner.provider.clone().ok_or(RemoteError::NoProvider)?;
		self.remote().synchronize(provider.as_ref(), stale).await?;
		match self.runtime_tag(ids::REMOTE_IS_STALE) {
			Ok(tag) => {
				if let Err(error) = self.state().set(tag, false) {
					warn!(%error, "failed to reset remote staleness");
				}
			}
			Err(error) => debug!(%error, "language has no remote staleness flag"),
		}
		Ok(())
	}

	fn runtime_tag(&self, id: &str) -> Result<Tag, FetchError> {
		self.inner.language.tag(id).map_err(|error| FetchError::Other(error.to_string()))
	}
}

/// Refreshes remote configuration on the first value of the stale flag and
/// on every `true` after it.
fn watch_staleness(app: &App) -> Option<Subscription> {
	let tag = match app.runtime_tag(ids::REMOTE_IS_STALE) {
		Ok(tag) => tag,
		Err(error) => {
			warn!(%error, "language has no remote staleness flag; remote configuration is not fetched");
			return None;
		}
	};
	let weak = app.downgrade();
	let first = AtomicBool::new(true);
	Some(app.state().publisher(tag).sink(move |result| {
		let initial = first.swap(false, Ordering::SeqCst);
		if !initial && !result.is_yes() {
			return;
		}
		let Some(app) = weak.upgrade() else {
			return;
		};
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			warn!("no tokio runtime; remote configuration is not fetched");
			return;
		};
		let stale = !initial;
		runtime.spawn(async move {
			if let Err(error) = app.refresh_remote_configuration(stale).await {
				warn!(%error, stale, "remote configuration refresh failed");
			}
		});
	}))
}

/// Configures and builds an [`App`].
#[derive(Default)]
pub struct AppBuilder {
	language: Option<&'static Language>,
	config: AppConfig,
	preferences: Option<Arc<dyn Preferences>>,
	defaults: Vec<(Reference, Value)>,
	remote_values: Option<FxHashMap<String, Value>>,
	provider: Option<Arc<dyn RemoteProvider>>,
	persistence: Option<Box<dyn Persistence>>,
}

impl AppBuilder {
	/// Defaults to [`Language::root`].
	pub fn language(mut self, language: &'static Language) -> Self {
		self.language = Some(language);
		self
	}

	pub fn config(mut self, config: AppConfig) -> Self {
		self.config = config;
		self
	}

	/// Defaults to [`MemoryPreferences`].
	pub fn preferences(mut self, preferences: Arc<dyn Preferences>) -> Self {
		self.preferences = Some(preferences);
		self
	}

	pub fn remote_default(mut self, key: impl TagKey, value: impl Into<Value>) -> Self {
		self.defaults.push((key.key(&Context::new()), value.into()));
		self
	}

	/// Marks remote configuration synchronized with `values` at build time.
	pub fn remote_values<K: Into<String>>(mut self, values: impl IntoIterator<Item = (K, Value)>) -> Self {
		self.remote_values
			.get_or_insert_with(FxHashMap::default)
			.extend(values.into_iter().map(|(k, v)| (k.into(), v)));
		self
	}

	/// Fetches remote configuration once the app is built, and again with
	/// zero expiration whenever `blockchain.app.configuration.remote.is.stale`
	/// becomes true.
	///
	/// Fetches run as tasks on the current tokio runtime. Outside a runtime
	/// they are skipped with a warning and
	/// [`App::refresh_remote_configuration`] has to be awaited by hand.
	pub fn remote_provider(mut self, provider: Arc<dyn RemoteProvider>) -> Self {
		self.provider = Some(provider);
		self
	}

	/// Backs the local store; overrides `[local] path`.
	pub fn persistence(mut self, persistence: Box<dyn Persistence>) -> Self {
		self.persistence = Some(persistence);
		self
	}

	pub fn build(self) -> Result<App, AppError> {
		let language = self.language.unwrap_or_else(Language::root);
		let preferences = self.preferences.unwrap_or_else(|| Arc::new(MemoryPreferences::new()));

		let local = match (self.persistence, &self.config.local.path) {
			(Some(persistence), _) => Store::open(persistence)?,
			(None, Some(path)) => Store::open(Box::new(JsonFile::new(path)))?,
			(None, None) => Store::new(),
		};
		let remote = RemoteConfiguration::new(self.config.remote.clone(), Arc::clone(&preferences));
		if !self.defaults.is_empty() {
			remote.set_defaults(self.defaults);
		}
		let router = Router {
			state: State::new(language, preferences),
			remote,
			local,
		};
		let deep_links = Arc::new(DeepLinks::new(&self.config.deep_link, language)?);

		let app = App {
			inner: Arc::new(AppInner {
				language,
				config: self.config,
				events: Broadcast::new(),
				router,
				provider: self.provider,
				deep_links,
				subscriptions: Mutex::new(Vec::new()),
			}),
		};
		let listening = app.inner.deep_links.start(&app);
		app.inner.subscriptions.lock().push(listening);
		if app.inner.provider.is_some()
			&& let Some(watching) = watch_staleness(&app)
		{
			app.inner.subscriptions.lock().push(watching);
		}

		if let Some(values) = self.remote_values {
			app.remote().apply_values(values);
		}
		debug!(tags = language.len(), "app built");
		Ok(app)
	}
}
