use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use namespace_lexicon::blockchain;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::preferences::MemoryPreferences;

const USER: &str = "160c4c417f8490658a8396d0283fb0d6fb98c327";

fn state() -> (State, Arc<MemoryPreferences>) {
	let preferences = Arc::new(MemoryPreferences::new());
	(State::new(Language::root(), preferences.clone()), preferences)
}

fn signed_in() -> State {
	let (state, _) = state();
	state.set(blockchain::user::id::ID, USER).unwrap();
	state
}

fn record(state: &State, key: impl TagKey) -> (Arc<Mutex<Vec<FetchResult>>>, Subscription) {
	let seen = Arc::new(Mutex::new(Vec::new()));
	let subscription = {
		let seen = Arc::clone(&seen);
		state.publisher(key).sink(move |result| seen.lock().push(result))
	};
	(seen, subscription)
}

#[test]
fn test_set_get_clear() {
	let state = signed_in();
	state.set(blockchain::user::name::first::ID, "Oliver").unwrap();
	assert_eq!(state.get(blockchain::user::name::first::ID), Ok(json!("Oliver")));
	assert_eq!(state.get_as::<String>(blockchain::user::name::first::ID), Ok("Oliver".to_owned()));

	state.clear(blockchain::user::name::first::ID).unwrap();
	assert!(matches!(
		state.get(blockchain::user::name::first::ID),
		Err(FetchError::KeyDoesNotExist(_))
	));
}

#[test]
fn test_indices_bind_from_state() {
	let state = signed_in();
	state.set(blockchain::user::is::tier::gold::ID, true).unwrap();

	let explicit = blockchain::user::is::tier::gold::ID.with(blockchain::user::ID, USER);
	assert_eq!(state.get(explicit), Ok(json!(true)));

	let other = blockchain::user::is::tier::gold::ID.with(blockchain::user::ID, "someone.else");
	assert!(matches!(state.get(other), Err(FetchError::KeyDoesNotExist(_))));
}

#[test]
fn test_unresolved_key_is_an_error() {
	let (state, _) = state();
	assert!(matches!(
		state.set(blockchain::user::name::first::ID, "Oliver"),
		Err(FetchError::Unresolved { .. })
	));
	assert!(matches!(
		state.result_for(blockchain::user::name::first::ID),
		FetchResult::Error(FetchError::Unresolved { .. }, _)
	));
}

#[test]
fn test_computed_value_is_recomputed_on_every_read() {
	let state = signed_in();
	let flip = Arc::new(AtomicBool::new(true));
	state
		.set_computed(blockchain::user::is::tier::gold::ID, move || json!(flip.fetch_xor(true, Ordering::SeqCst)))
		.unwrap();

	let a = state.get(blockchain::user::is::tier::gold::ID).unwrap();
	let b = state.get(blockchain::user::is::tier::gold::ID).unwrap();
	assert_ne!(a, b);
	assert_eq!(state.result_for(blockchain::user::is::tier::gold::ID).metadata().origin, Origin::Compute);
}

#[test]
fn test_publisher_emits_current_then_every_set() {
	let state = signed_in();
	let (seen, subscription) = record(&state, blockchain::user::is::tier::gold::ID);

	state.set(blockchain::user::is::tier::gold::ID, true).unwrap();
	state.set(blockchain::user::is::tier::gold::ID, true).unwrap();

	let seen = seen.lock();
	assert_eq!(seen.len(), 3);
	assert!(matches!(seen[0], FetchResult::Error(FetchError::KeyDoesNotExist(_), _)));
	assert!(seen[1].is_yes());
	assert!(seen[2].is_yes());
	drop(subscription);
}

#[test]
fn test_cancelled_publisher_releases_its_subject() {
	let state = signed_in();
	let (_, subscription) = record(&state, blockchain::user::is::tier::gold::ID);
	assert_eq!(state.inner.subjects.lock().len(), 1);
	drop(subscription);
	assert!(state.inner.subjects.lock().is_empty());
}

#[test]
fn test_transaction_is_observed_once_committed() {
	let state = signed_in();
	let (first, a) = record(&state, blockchain::user::name::first::ID);
	let (last, b) = record(&state, blockchain::user::name::last::ID);

	state
		.transaction(|state| {
			state.set(blockchain::user::name::first::ID, "Oliver")?;
			state.set(blockchain::user::name::last::ID, "Atkinson")?;
			assert_eq!(state.get(blockchain::user::name::first::ID), Ok(json!("Oliver")));
			assert_eq!(first.lock().len(), 1);
			Ok::<_, FetchError>(())
		})
		.unwrap();

	assert_eq!(first.lock().len(), 2);
	assert_eq!(last.lock().len(), 2);
	assert_eq!(last.lock()[1].value(), Some(&json!("Atkinson")));
	drop((a, b));
}

#[test]
fn test_transaction_rollback() {
	#[derive(Debug)]
	struct Explicit;

	let state = signed_in();
	state.set(blockchain::user::is::tier::gold::ID, true).unwrap();

	let result = state.transaction(|state| {
		state.set(blockchain::user::is::tier::gold::ID, false).unwrap();
		state.clear(blockchain::user::is::tier::gold::ID).unwrap();
		assert!(!state.contains(blockchain::user::is::tier::gold::ID));
		Err::<(), _>(Explicit)
	});

	assert!(result.is_err());
	assert_eq!(state.get(blockchain::user::is::tier::gold::ID), Ok(json!(true)));
}

#[test]
fn test_nested_failure_discards_the_outer_batch() {
	let state = signed_in();
	let outer: Result<(), FetchError> = state.transaction(|state| {
		state.set(blockchain::user::name::first::ID, "Oliver")?;
		let inner = state.transaction(|state| {
			state.set(blockchain::user::name::last::ID, "Atkinson")?;
			Err::<(), _>(FetchError::Other("inner".into()))
		});
		assert!(inner.is_err());
		Ok(())
	});

	assert!(outer.is_ok());
	assert!(!state.contains(blockchain::user::name::first::ID));
	assert!(!state.contains(blockchain::user::name::last::ID));
}

#[test]
fn test_signing_out_keeps_shared_and_stored_values() {
	let state = signed_in();
	state.set(blockchain::user::name::first::ID, "Oliver").unwrap();
	state.set(blockchain::app::is::ready::r#for::deep_link::ID, true).unwrap();
	state.set(blockchain::session::state::shared::value::ID, "shared").unwrap();
	state.set(blockchain::namespace::test::session::state::stored::shared::value::ID, 1).unwrap();

	state.clear(blockchain::user::id::ID).unwrap();

	assert!(!state.contains(blockchain::user::id::ID));
	assert!(!state.contains(blockchain::user::name::first::ID.with(blockchain::user::ID, USER)));
	assert!(!state.contains(blockchain::app::is::ready::r#for::deep_link::ID));
	assert_eq!(state.get(blockchain::session::state::shared::value::ID), Ok(json!("shared")));
	assert_eq!(state.get(blockchain::namespace::test::session::state::stored::shared::value::ID), Ok(json!(1)));
}

#[test]
fn test_preference_is_scoped_to_the_user() {
	let (state, preferences) = state();
	state.set(blockchain::user::id::ID, USER).unwrap();
	state.set(blockchain::session::state::preference::value::ID, true).unwrap();

	let object = preferences.object(PREFERENCES_KEY).unwrap();
	assert_eq!(object[USER]["blockchain.session.state.preference.value"], json!(true));
	assert_eq!(state.get(blockchain::session::state::preference::value::ID), Ok(json!(true)));

	state.clear(blockchain::user::id::ID).unwrap();
	assert!(!state.contains(blockchain::session::state::preference::value::ID));
	assert_eq!(
		preferences.object(PREFERENCES_KEY).unwrap()[USER],
		json!({ "blockchain.session.state.preference.value": true })
	);

	state.set(blockchain::user::id::ID, USER).unwrap();
	assert_eq!(state.get(blockchain::session::state::preference::value::ID), Ok(json!(true)));
}

#[test]
fn test_shared_preference_survives_sign_out() {
	let (state, preferences) = state();
	state.set(blockchain::user::id::ID, USER).unwrap();
	state.set(blockchain::namespace::test::session::state::shared::preference::ID, true).unwrap();

	let object = preferences.object(PREFERENCES_KEY).unwrap();
	assert_eq!(object[SHARED_SCOPE]["blockchain.namespace.test.session.state.shared.preference"], json!(true));

	state.clear(blockchain::user::id::ID).unwrap();
	assert_eq!(state.get(blockchain::namespace::test::session::state::shared::preference::ID), Ok(json!(true)));
}

#[test]
fn test_preference_notifies_on_sign_in() {
	let (state, preferences) = state();
	preferences.set_object(
		PREFERENCES_KEY,
		json!({
			USER: { "blockchain.session.state.preference.value": "signed_in" },
			SHARED_SCOPE: { "blockchain.session.state.preference.value": "signed_out" },
		}),
	);

	let (seen, subscription) = record(&state, blockchain::session::state::preference::value::ID);
	assert!(seen.lock()[0].value().is_none());

	state.set(blockchain::user::id::ID, USER).unwrap();
	assert_eq!(seen.lock().last().and_then(FetchResult::value), Some(&json!("signed_in")));
	drop(subscription);
}

#[test]
fn test_boolean_logic() {
	let state = signed_in();
	let fan = blockchain::user::is::cowboy::fan::ID;
	let gold = blockchain::user::is::tier::gold::ID;
	let silver = blockchain::user::is::tier::silver::ID;
	let none = blockchain::user::is::tier::none::ID;

	state.set(fan, true).unwrap();
	state.set(gold, true).unwrap();
	state.set(silver, false).unwrap();
	state.set(none, false).unwrap();

	assert!(state.yes(&[&fan], &[]));
	assert!(state.yes(&[&fan, &gold], &[]));
	assert!(state.yes(&[], &[&silver, &none]));
	assert!(!state.yes(&[], &[&silver, &fan]));
	assert!(state.yes(&[&fan, &gold], &[&silver, &none]));

	assert!(!state.no(&[&fan], &[]));
	assert!(!state.no(&[&fan, &gold], &[]));
	assert!(!state.no(&[], &[&silver, &none]));
	assert!(state.no(&[], &[&silver, &fan]));
	assert!(state.no(&[&silver], &[]));
}
