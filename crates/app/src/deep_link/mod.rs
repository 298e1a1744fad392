//! Deep-link dispatch.
//!
//! URLs arrive as `blockchain.app.process.deep_link` events carrying the URL in
//! their context. Until `blockchain.app.is.ready.for.deep_link` is true they are
//! held back according to [`PendingPolicy`] and replayed once it becomes true.
//!
//! A URL is dispatched in one of two ways:
//!
//! * with the DSL enabled, a fragment naming a tag is posted directly and
//!   query items named by tags are set into state first, e.g.
//!   `https://blockchain.com/app?blockchain.db.type.string=test#blockchain.db.type.string`;
//! * otherwise the first [`Rule`] whose pattern matches posts its event after
//!   writing every resolved parameter to its alias.

mod rule;

use std::collections::VecDeque;
use std::sync::Arc;

use arc_swap::ArcSwap;
use namespace_lexicon::signal::Subscription;
use namespace_lexicon::{Context, FetchError, FetchResult, Language, Reference, Value};
use parking_lot::Mutex;
use tracing::{debug, warn};
use url::Url;

pub use self::rule::{Match, Parameter, ParameterSource, Resolved, Rule, Rules};
use crate::App;
use crate::config::{self, DeepLinkConfig, DeepLinkTags, PendingPolicy};

/// Where the dispatcher stands with respect to readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	/// Nothing is held back.
	Idle,
	/// URLs arrived before the app was ready and wait for replay.
	AwaitingReadiness { pending: usize },
}

pub struct DeepLinks {
	tags: DeepLinkTags,
	policy: PendingPolicy,
	rules: ArcSwap<Rules>,
	pending: Mutex<VecDeque<Url>>,
}

impl DeepLinks {
	pub(crate) fn new(config: &DeepLinkConfig, language: &'static Language) -> config::Result<Self> {
		Ok(Self {
			tags: config.resolve(language)?,
			policy: config.pending,
			rules: ArcSwap::from_pointee(Rules::default()),
			pending: Mutex::new(VecDeque::new()),
		})
	}

	/// Listens for process events, readiness and remote rule updates.
	pub(crate) fn start(self: &Arc<Self>, app: &App) -> Subscription {
		let tags = self.tags;

		let process = {
			let links = Arc::clone(self);
			let weak = app.downgrade();
			app.on([tags.process]).sink(move |event| {
				let Some(app) = weak.upgrade() else {
					return;
				};
				match event.context.get(tags.url).and_then(Value::as_str).map(Url::parse) {
					Some(Ok(url)) => links.handle(&app, url),
					Some(Err(error)) => warn!(domain = "deep_link", %error, "malformed deep link url"),
					None => warn!(domain = "deep_link", reference = %event.reference, "deep link event without a url"),
				}
			})
		};

		let rules = {
			let links = Arc::clone(self);
			app.remote().publisher(tags.rules).sink(move |result| match result.decode::<Vec<Rule>>() {
				FetchResult::Value(rules, _) => links.set_rules(rules),
				FetchResult::Error(FetchError::KeyDoesNotExist(_), _) => {}
				FetchResult::Error(error, _) => warn!(domain = "deep_link", %error, "failed to load deep link rules"),
			})
		};

		let ready = {
			let links = Arc::clone(self);
			let weak = app.downgrade();
			app.state().publisher(tags.ready).sink(move |result| {
				if result.is_yes()
					&& let Some(app) = weak.upgrade()
				{
					links.replay(&app);
				}
			})
		};

		Subscription::merge([process, rules, ready])
	}

	pub(crate) fn tags(&self) -> DeepLinkTags {
		self.tags
	}

	pub fn phase(&self) -> Phase {
		match self.pending.lock().len() {
			0 => Phase::Idle,
			pending => Phase::AwaitingReadiness { pending },
		}
	}

	/// Replaces the rule set.
	pub fn set_rules(&self, rules: Vec<Rule>) {
		debug!(domain = "deep_link", rules = rules.len(), "deep link rules updated");
		self.rules.store(Arc::new(Rules::new(rules)));
	}

	pub fn rules(&self) -> Arc<Rules> {
		self.rules.load_full()
	}

	/// True if `url` would be dispatched once the app is ready.
	pub fn can_process(&self, app: &App, url: &Url) -> bool {
		self.dsl_event(app, url).is_some() || self.rules.load().match_for(url).is_some()
	}

	/// Dispatches `url` now or holds it until the app is ready.
	pub fn handle(&self, app: &App, url: Url) {
		if app.state().yes(&[&self.tags.ready], &[]) {
			self.process(app, &url);
			return;
		}
		debug!(domain = "deep_link", %url, "deep link deferred until ready");
		let mut pending = self.pending.lock();
		if self.policy == PendingPolicy::Latest {
			pending.clear();
		}
		pending.push_back(url);
	}

	fn replay(&self, app: &App) {
		let pending: Vec<Url> = self.pending.lock().drain(..).collect();
		for url in pending {
			self.process(app, &url);
		}
	}

	/// Dispatches `url`; returns false if nothing matched.
	pub fn process(&self, app: &App, url: &Url) -> bool {
		if let Some(event) = self.dsl_event(app, url) {
			let language = app.language();
			let mut context = Context::new();
			for (name, value) in rule::query_items(url) {
				let Ok(reference) = language.reference(&name) else {
					continue;
				};
				if let Err(error) = app.state().set(&reference, value.as_str()) {
					warn!(domain = "deep_link", %reference, %error, "failed to set deep link value");
					continue;
				}
				context.insert(reference.tag(), value);
			}
			debug!(domain = "deep_link", %url, reference = %event, "dispatching deep link event");
			app.post_with(event, context);
			return true;
		}

		let Some(matched) = self.rules.load().match_for(url) else {
			debug!(domain = "deep_link", %url, "no deep link rule matches");
			return false;
		};
		let mut context = Context::new();
		for Resolved { alias, value } in matched.parameters() {
			if let Err(error) = app.set(&alias, value.clone()) {
				warn!(domain = "deep_link", reference = %alias, %error, "failed to set deep link parameter");
				continue;
			}
			context.insert(alias.tag(), value);
		}
		debug!(domain = "deep_link", %url, reference = %matched.rule.event, "dispatching deep link rule");
		app.post_with(&matched.rule.event, context);
		true
	}

	/// The tag reference named by `url`'s fragment, if the DSL is enabled.
	fn dsl_event(&self, app: &App, url: &Url) -> Option<Reference> {
		if !app.state().yes(&[&self.tags.dsl], &[]) {
			return None;
		}
		let fragment = url.fragment()?;
		let fragment = fragment.split_once('?').map_or(fragment, |(path, _)| path);
		app.language().reference(fragment).ok()
	}
}

#[cfg(test)]
mod tests;
