//! Dotted ids of the tags the runtime itself gives meaning to.

pub const COLLECTION: &str = namespace_lexicon_spec::COLLECTION;
pub const COLLECTION_ID: &str = "blockchain.db.collection.id";

pub const STATE_VALUE: &str = "blockchain.session.state.value";
pub const SHARED_VALUE: &str = "blockchain.session.state.shared.value";
pub const PREFERENCE_VALUE: &str = "blockchain.session.state.preference.value";
pub const STORED_VALUE: &str = "blockchain.session.state.stored.value";
pub const CONFIGURATION_VALUE: &str = "blockchain.session.configuration.value";

pub const USER: &str = "blockchain.user";
pub const USER_ID: &str = "blockchain.user.id";

pub const WILL_SIGN_IN: &str = "blockchain.session.event.will.sign.in";
pub const DID_SIGN_IN: &str = "blockchain.session.event.did.sign.in";
pub const WILL_SIGN_OUT: &str = "blockchain.session.event.will.sign.out";
pub const DID_SIGN_OUT: &str = "blockchain.session.event.did.sign.out";

pub const ANALYTICS_ERROR: &str = "blockchain.ux.type.analytics.error";
pub const ANALYTICS_ERROR_MESSAGE: &str = "blockchain.ux.type.analytics.error.message";
pub const ANALYTICS_ERROR_SOURCE_FILE: &str = "blockchain.ux.type.analytics.error.source.file";
pub const ANALYTICS_ERROR_SOURCE_LINE: &str = "blockchain.ux.type.analytics.error.source.line";

pub const REMOTE_IS_STALE: &str = "blockchain.app.configuration.remote.is.stale";
