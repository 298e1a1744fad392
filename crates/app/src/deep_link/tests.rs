use namespace_lexicon::{Reference, Value, blockchain};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use url::Url;

use super::*;

fn amount() -> Reference {
	Reference::parse("blockchain.ux.transaction[buy].enter.amount.default.input.amount", namespace_lexicon::Language::root()).unwrap()
}

fn rules() -> Rules {
	let buy = blockchain::app::deep_link::buy::ID;
	let asset = blockchain::app::deep_link::asset::ID;
	Rules::new(vec![
		Rule {
			pattern: "/app/asset/buy".into(),
			event: buy.into(),
			parameters: vec![
				Parameter::named("code", blockchain::app::deep_link::buy::crypto::ID),
				Parameter::named("amount", amount()),
				Parameter::fixed("test", blockchain::namespace::test::session::state::stored::shared::value::ID),
			],
		},
		Rule {
			pattern: "/app/asset/(?<code>.*[^/?])/buy".into(),
			event: buy.into(),
			parameters: vec![Parameter::named("code", blockchain::app::deep_link::buy::crypto::ID)],
		},
		Rule {
			pattern: "/app/asset/(?<code>.*[^/?])".into(),
			event: asset.into(),
			parameters: vec![Parameter::named("code", blockchain::app::deep_link::asset::code::ID)],
		},
		Rule {
			pattern: "/app/qr/scan".into(),
			event: blockchain::app::deep_link::qr::ID.into(),
			parameters: vec![],
		},
		Rule {
			pattern: "/app/kyc".into(),
			event: blockchain::app::deep_link::kyc::ID.into(),
			parameters: vec![Parameter::named("tier", blockchain::app::deep_link::kyc::tier::ID)],
		},
		Rule {
			pattern: "/app/asset".into(),
			event: asset.into(),
			parameters: vec![Parameter::named("code", blockchain::app::deep_link::asset::code::ID)],
		},
	])
}

#[rstest]
#[case("https://blockchain.com/app/qr/scan/", "blockchain.app.deep_link.qr", 0)]
#[case("https://blockchain.com/#/app/asset?code=BTC", "blockchain.app.deep_link.asset", 1)]
#[case("https://blockchain.com/app/asset/BTC", "blockchain.app.deep_link.asset", 1)]
#[case("https://blockchain.com/app/asset/buy?codeCrypto=BTC", "blockchain.app.deep_link.buy", 1)]
#[case("https://login.blockchain.com/#/app/asset/BTC/buy/foo?tag=123", "blockchain.app.deep_link.buy", 1)]
#[case("https://blockchain.com/app/kyc?tier=123&tag=1234", "blockchain.app.deep_link.kyc", 1)]
fn test_match_for(#[case] url: &str, #[case] event: &str, #[case] parameters: usize) {
	let matched = rules().match_for(&Url::parse(url).unwrap()).unwrap();
	assert_eq!(matched.rule.event.string(), event);
	assert_eq!(matched.parameters().len(), parameters);
}

#[rstest]
#[case("https://blockchain.com/app/unknown")]
#[case("https://blockchain.com/#/settings")]
fn test_match_for_none(#[case] url: &str) {
	assert!(rules().match_for(&Url::parse(url).unwrap()).is_none());
}

#[test]
fn test_capture_precedes_query() {
	let url = Url::parse("https://blockchain.com/app/asset/ETH?code=BTC").unwrap();
	let matched = rules().match_for(&url).unwrap();
	assert_eq!(
		matched.parameters(),
		vec![Resolved {
			alias: blockchain::app::deep_link::asset::code::ID.into(),
			value: json!("ETH"),
		}]
	);
}

#[test]
fn test_buy_parameters() {
	let url = Url::parse("https://blockchain.com/app/asset/buy?code=BTC&amount=100").unwrap();
	let matched = rules().match_for(&url).unwrap();
	let values: Vec<(String, Value)> = matched.parameters().into_iter().map(|r| (r.alias.string(), r.value)).collect();
	assert_eq!(
		values,
		vec![
			("blockchain.app.deep_link.buy.crypto".into(), json!("BTC")),
			("blockchain.ux.transaction[buy].enter.amount.default.input.amount".into(), json!("100")),
			("blockchain.namespace.test.session.state.stored.shared.value".into(), json!("test")),
		]
	);
}

#[test]
fn test_rules_deserialize() {
	let rules: Vec<Rule> = serde_json::from_value(json!([
		{
			"pattern": "/app/kyc",
			"event": "blockchain.app.deep_link.kyc",
			"parameters": [
				{ "name": "tier", "alias": "blockchain.app.deep_link.kyc.tier" },
				{ "value": 2, "alias": "blockchain.app.deep_link.kyc.tier" }
			]
		},
		{ "pattern": "/app/qr/scan", "event": "blockchain.app.deep_link.qr" }
	]))
	.unwrap();

	assert_eq!(rules[0].parameters[0], Parameter::named("tier", blockchain::app::deep_link::kyc::tier::ID));
	assert_eq!(rules[0].parameters[1], Parameter::fixed(2, blockchain::app::deep_link::kyc::tier::ID));
	assert!(rules[1].parameters.is_empty());
}

#[test]
fn test_invalid_pattern_never_matches() {
	let rules = Rules::new(vec![
		Rule {
			pattern: "/app/(unclosed".into(),
			event: blockchain::app::deep_link::qr::ID.into(),
			parameters: vec![],
		},
		Rule {
			pattern: "/app".into(),
			event: blockchain::app::deep_link::kyc::ID.into(),
			parameters: vec![],
		},
	]);
	assert_eq!(rules.len(), 2);

	let matched = rules.match_for(&Url::parse("https://blockchain.com/app/(unclosed").unwrap()).unwrap();
	assert_eq!(matched.rule.event, Reference::from(blockchain::app::deep_link::kyc::ID));
}

#[test]
fn test_query_items_include_fragment_query() {
	let url = Url::parse("https://blockchain.com/?a=1#/app/kyc?b=2").unwrap();
	assert_eq!(rule::query_items(&url), vec![("a".to_owned(), "1".to_owned()), ("b".to_owned(), "2".to_owned())]);
}
