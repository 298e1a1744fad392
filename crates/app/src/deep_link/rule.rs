use namespace_lexicon::{Reference, Value};
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

/// Maps URLs matching `pattern` to `event`, installing `parameters` first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
	/// Regex searched in the URL's target; named groups feed parameters.
	pub pattern: String,
	pub event: Reference,
	#[serde(default)]
	pub parameters: Vec<Parameter>,
}

/// Where a parameter's value comes from and where it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
	#[serde(flatten)]
	pub source: ParameterSource,
	pub alias: Reference,
}

impl Parameter {
	/// Named capture group or query item `name`.
	pub fn named(name: impl Into<String>, alias: impl Into<Reference>) -> Self {
		Self {
			source: ParameterSource::Name { name: name.into() },
			alias: alias.into(),
		}
	}

	/// Always `value`.
	pub fn fixed(value: impl Into<Value>, alias: impl Into<Reference>) -> Self {
		Self {
			source: ParameterSource::Value { value: value.into() },
			alias: alias.into(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterSource {
	Name { name: String },
	Value { value: Value },
}

/// A parameter with its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
	pub alias: Reference,
	pub value: Value,
}

struct Compiled {
	rule: Rule,
	/// `None` if the pattern failed to compile; such rules never match.
	regex: Option<Regex>,
}

/// Rules in declaration order; the first match wins.
#[derive(Default)]
pub struct Rules {
	compiled: Vec<Compiled>,
}

impl Rules {
	pub fn new(rules: Vec<Rule>) -> Self {
		let compiled = rules
			.into_iter()
			.map(|rule| {
				let regex = match Regex::new(&rule.pattern) {
					Ok(regex) => Some(regex),
					Err(error) => {
						warn!(domain = "deep_link", pattern = %rule.pattern, %error, "invalid deep link pattern");
						None
					}
				};
				Compiled { rule, regex }
			})
			.collect();
		Self { compiled }
	}

	pub fn len(&self) -> usize {
		self.compiled.len()
	}

	pub fn is_empty(&self) -> bool {
		self.compiled.is_empty()
	}

	pub fn rules(&self) -> impl Iterator<Item = &Rule> {
		self.compiled.iter().map(|c| &c.rule)
	}

	/// The first rule whose pattern is found in `url`'s target.
	///
	/// The target is the fragment when it is a path (`https://x.com/#/app/kyc`),
	/// otherwise the URL path. Query items come from both the URL query and the
	/// fragment's own query.
	pub fn match_for(&self, url: &Url) -> Option<Match> {
		let (target, query) = target(url);
		self.compiled.iter().find_map(|compiled| {
			let captures = compiled.regex.as_ref()?.captures(&target)?;
			let named = compiled
				.regex
				.as_ref()?
				.capture_names()
				.flatten()
				.filter_map(|name| Some((name.to_owned(), captures.name(name)?.as_str().to_owned())))
				.collect();
			Some(Match {
				rule: compiled.rule.clone(),
				captures: named,
				query: query.clone(),
			})
		})
	}
}

/// A matched rule and what its parameters can draw from.
#[derive(Debug, Clone)]
pub struct Match {
	pub rule: Rule,
	captures: FxHashMap<String, String>,
	query: Vec<(String, String)>,
}

impl Match {
	/// Resolved parameters in declaration order; unresolved ones are omitted.
	///
	/// A named parameter takes the capture group of that name, then the first
	/// query item of that name.
	pub fn parameters(&self) -> Vec<Resolved> {
		self.rule
			.parameters
			.iter()
			.filter_map(|parameter| {
				let value = match &parameter.source {
					ParameterSource::Value { value } => value.clone(),
					ParameterSource::Name { name } => Value::String(self.lookup(name)?.to_owned()),
				};
				Some(Resolved {
					alias: parameter.alias.clone(),
					value,
				})
			})
			.collect()
	}

	fn lookup(&self, name: &str) -> Option<&str> {
		self.captures
			.get(name)
			.map(String::as_str)
			.or_else(|| self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str()))
	}
}

fn target(url: &Url) -> (String, Vec<(String, String)>) {
	let query = query_items(url);
	if let Some(fragment) = url.fragment()
		&& fragment.starts_with('/')
	{
		let path = fragment.split_once('?').map_or(fragment, |(path, _)| path);
		return (path.to_owned(), query);
	}
	(url.path().to_owned(), query)
}

/// Query items of the URL followed by those of its fragment.
pub(crate) fn query_items(url: &Url) -> Vec<(String, String)> {
	let mut items: Vec<(String, String)> = url.query_pairs().into_owned().collect();
	if let Some((_, query)) = url.fragment().and_then(|f| f.split_once('?')) {
		items.extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
	}
	items
}
