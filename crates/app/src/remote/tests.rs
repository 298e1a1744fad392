use std::sync::Arc;

use namespace_lexicon::blockchain;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::preferences::MemoryPreferences;

fn config() -> RemoteConfig {
	RemoteConfig {
		backoff_ms: 1,
		max_attempts: 3,
		legacy_prefixes: vec!["ios_ff".into(), "ios".into()],
		..RemoteConfig::default()
	}
}

fn fetched() -> FxHashMap<String, Value> {
	[
		("ios_app_maintenance", json!(true)),
		("ios_ff_apple_pay", json!(true)),
		("blockchain_app_configuration_announcements", json!(["1", "2", "3"])),
		("blockchain_app_configuration_deep_link_rules", json!([])),
	]
	.into_iter()
	.map(|(k, v)| (k.to_owned(), v))
	.collect()
}

fn remote_with(preferences: Arc<MemoryPreferences>) -> RemoteConfiguration {
	let remote = RemoteConfiguration::new(config(), preferences);
	remote.apply_values(fetched());
	remote
}

fn remote() -> RemoteConfiguration {
	remote_with(Arc::new(MemoryPreferences::new()))
}

#[test]
fn test_underscored_key() {
	let remote = remote();
	assert_eq!(
		remote.get_as::<Vec<String>>(blockchain::app::configuration::announcements::ID),
		Ok(vec!["1".to_owned(), "2".to_owned(), "3".to_owned()])
	);
	assert_eq!(remote.get(blockchain::app::configuration::deep_link::rules::ID), Ok(json!([])));
}

#[test]
fn test_legacy_fallbacks() {
	let remote = remote();
	assert_eq!(remote.get_as::<bool>(blockchain::app::configuration::apple::pay::is::enabled::ID), Ok(true));
	assert_eq!(remote.get_as::<bool>(blockchain::app::configuration::app::maintenance::ID), Ok(true));
}

#[test]
fn test_type_mismatch_and_missing_key() {
	let remote = remote();
	assert!(matches!(
		remote.get_as::<bool>(blockchain::app::configuration::announcements::ID),
		Err(FetchError::Decoding { .. })
	));
	assert!(matches!(
		remote.get(blockchain::app::configuration::customer::support::url::ID),
		Err(FetchError::KeyDoesNotExist(_))
	));
}

#[test]
fn test_unsynchronized_reads_fail() {
	let remote = RemoteConfiguration::new(config(), Arc::new(MemoryPreferences::new()));
	remote.override_value(blockchain::namespace::test::remote::flag::ID, true);
	assert!(!remote.is_synchronized());
	assert_eq!(remote.get(blockchain::namespace::test::remote::flag::ID), Err(FetchError::NotSynchronized));
	assert_eq!(remote.get_raw("ios_ff_apple_pay"), Err(FetchError::NotSynchronized));
}

#[test]
fn test_override_then_clear() {
	let remote = remote();
	remote.override_value(blockchain::app::configuration::announcements::ID, json!(["4", "5", "6"]));
	assert_eq!(remote.get(blockchain::app::configuration::announcements::ID), Ok(json!(["4", "5", "6"])));

	remote.clear_override(blockchain::app::configuration::announcements::ID);
	assert_eq!(remote.get(blockchain::app::configuration::announcements::ID), Ok(json!(["1", "2", "3"])));
}

#[test]
fn test_defaults_and_all_keys() {
	let remote = RemoteConfiguration::new(config(), Arc::new(MemoryPreferences::new()));
	remote.set_defaults([(blockchain::app::configuration::apple::pay::is::enabled::ID.into(), json!(true))]);
	remote.apply_values(FxHashMap::default());

	assert_eq!(remote.get(blockchain::app::configuration::apple::pay::is::enabled::ID), Ok(json!(true)));
	assert_eq!(remote.all_keys(), vec!["blockchain.app.configuration.apple.pay.is.enabled"]);

	remote.override_value(blockchain::app::configuration::apple::pay::is::enabled::ID, false);
	assert_eq!(remote.get(blockchain::app::configuration::apple::pay::is::enabled::ID), Ok(json!(false)));
	assert_eq!(
		remote.all_keys(),
		vec![
			"!blockchain.app.configuration.apple.pay.is.enabled",
			"blockchain.app.configuration.apple.pay.is.enabled",
		]
	);

	remote.clear();
	assert_eq!(remote.get(blockchain::app::configuration::apple::pay::is::enabled::ID), Ok(json!(true)));
}

#[test]
fn test_overrides_persist_across_instances() {
	let preferences = Arc::new(MemoryPreferences::new());
	preferences.set_object(
		PREFERENCES_KEY,
		json!({ "blockchain.app.configuration.manual.login.is.enabled": false }),
	);

	let remote = remote_with(preferences.clone());
	assert_eq!(remote.get(blockchain::app::configuration::manual::login::is::enabled::ID), Ok(json!(false)));

	remote.override_value(blockchain::app::configuration::manual::login::is::enabled::ID, true);
	assert_eq!(
		preferences.object(PREFERENCES_KEY),
		Some(json!({ "blockchain.app.configuration.manual.login.is.enabled": true }))
	);

	let restored = remote_with(preferences);
	assert_eq!(restored.get(blockchain::app::configuration::manual::login::is::enabled::ID), Ok(json!(true)));
}

#[test]
fn test_indexed_overrides() {
	let remote = remote();
	let collection = blockchain::db::collection::ID.tag();
	for i in 0..10 {
		remote.override_value(collection.reference().bind(collection, i.to_string()), i);
	}
	for i in 0..10 {
		assert_eq!(remote.get(collection.reference().bind(collection, i.to_string())), Ok(json!(i)));
	}
}

#[test]
fn test_apply_decodes_json_or_falls_back_to_string() {
	let remote = RemoteConfiguration::new(config(), Arc::new(MemoryPreferences::new()));
	let mut raw = FxHashMap::default();
	raw.insert("blockchain_app_configuration_announcements".to_owned(), br#"{"a":1}"#.to_vec());
	raw.insert("blockchain_app_configuration_customer_support_url".to_owned(), b"https://support".to_vec());
	remote.apply(raw);

	assert_eq!(remote.get(blockchain::app::configuration::announcements::ID), Ok(json!({ "a": 1 })));
	assert_eq!(
		remote.get(blockchain::app::configuration::customer::support::url::ID),
		Ok(json!("https://support"))
	);
}

#[test]
fn test_publisher_waits_for_synchronization() {
	let remote = RemoteConfiguration::new(config(), Arc::new(MemoryPreferences::new()));
	let seen = Arc::new(Mutex::new(Vec::new()));
	let subscription = {
		let seen = Arc::clone(&seen);
		remote
			.publisher(blockchain::app::configuration::announcements::ID)
			.sink(move |result| seen.lock().push(result.get()))
	};

	remote.override_value(blockchain::namespace::test::remote::flag::ID, true);
	assert!(seen.lock().is_empty());

	remote.apply_values(fetched());
	remote.override_value(blockchain::app::configuration::announcements::ID, json!([]));
	assert_eq!(*seen.lock(), vec![Ok(json!(["1", "2", "3"])), Ok(json!([]))]);
	drop(subscription);
}

#[tokio::test]
async fn test_synchronize_retries_with_backoff() {
	let remote = RemoteConfiguration::new(config(), Arc::new(MemoryPreferences::new()));
	let provider = StaticRemote::from_values([("ios_ff_apple_pay", json!(true))]);
	provider.fail_next(2);

	remote.synchronize(&provider, false).await.unwrap();
	assert_eq!(provider.fetches(), 3);
	assert_eq!(remote.get(blockchain::app::configuration::apple::pay::is::enabled::ID), Ok(json!(true)));
}

#[tokio::test]
async fn test_synchronize_gives_up_after_max_attempts() {
	let remote = RemoteConfiguration::new(config(), Arc::new(MemoryPreferences::new()));
	let provider = StaticRemote::new();
	provider.fail_next(5);

	let result = remote.synchronize(&provider, true).await;
	assert!(matches!(result, Err(RemoteError::Fetch(_))));
	assert_eq!(provider.fetches(), 3);
	assert!(!remote.is_synchronized());
}
