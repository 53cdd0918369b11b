use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{LoggerConfig, PersonFn};
use crate::person::{non_null, PersonDescriptor, ResolvedUser, EMAIL_KEY, ID_KEY, PERSON_KEY, SESSION_KEY, USERNAME_KEY};
use crate::session::SessionStore;

/// Computes the person descriptor for each record and keeps it sticky in
/// the logger configuration.
///
/// Sources, highest precedence first:
/// 1. a `person` mapping in the record context (replaces everything),
/// 2. the configured person callback,
/// 3. the configuration's current person.
///
/// After that the session snapshot is folded into `person.session` and the
/// session id fills in a missing `person.id`.
pub struct ContextEnricher {
    config: LoggerConfig,
    session: RwLock<Option<Arc<dyn SessionStore>>>,
}

impl ContextEnricher {
    /// Create an enricher over `config` with no session attached.
    pub fn new(config: LoggerConfig) -> Self {
        ContextEnricher {
            config,
            session: RwLock::new(None),
        }
    }

    /// Attach a session, builder style.
    pub fn with_session(self, session: Arc<dyn SessionStore>) -> Self {
        self.set_session(Some(session));
        self
    }

    /// Attach (or detach, with `None`) the session consulted on later calls.
    pub fn set_session(&self, session: Option<Arc<dyn SessionStore>>) {
        *self.session.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    /// The configuration the descriptor is read from and written back to.
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Rewrite a record context and compute its person descriptor.
    ///
    /// The returned context never contains a `person` key. The descriptor is
    /// also written back into the logger configuration, so it becomes the
    /// baseline for the next call. Never fails: a broken person callback or
    /// a missing session just means less context.
    pub fn enrich(&self, mut context: Map<String, Value>) -> (Map<String, Value>, PersonDescriptor) {
        let mut person = self.config.person();

        match context.remove(PERSON_KEY) {
            Some(Value::Object(explicit)) => person = PersonDescriptor::from(explicit),
            _ => {
                if let Some(person_fn) = self.config.person_fn() {
                    apply_resolved_user(&mut person, call_person_fn(&person_fn));
                }
            }
        }

        self.merge_session(&mut person);

        let mut partial = Map::new();
        partial.insert(PERSON_KEY.to_string(), person.clone().into_value());
        self.config.configure(partial);

        (context, person)
    }

    fn merge_session(&self, person: &mut PersonDescriptor) {
        let session = self
            .session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let Some(session) = session else {
            return;
        };

        let snapshot = session.all();
        if snapshot.is_empty() {
            return;
        }

        // Values already on the person override the fresh snapshot.
        let merged = match person.session() {
            Some(existing) => {
                let mut merged = snapshot;
                merged.extend(existing.clone());
                merged
            }
            None => snapshot,
        };
        person.set(SESSION_KEY, Value::Object(merged));

        if !person.has_id() {
            person.set(ID_KEY, Value::String(session.id()));
        }
    }
}

fn call_person_fn(person_fn: &PersonFn) -> Option<ResolvedUser> {
    match panic::catch_unwind(AssertUnwindSafe(|| person_fn())) {
        Ok(Ok(user)) => user,
        Ok(Err(err)) => {
            debug!(error = %err, "person callback failed, logging without user data");
            None
        }
        Err(_) => {
            debug!("person callback panicked, logging without user data");
            None
        }
    }
}

fn apply_resolved_user(person: &mut PersonDescriptor, user: Option<ResolvedUser>) {
    match user {
        Some(ResolvedUser::Object(identity)) => {
            let Some(id) = identity.id() else {
                return;
            };
            person.set(ID_KEY, id);
            if let Some(username) = non_null(identity.username) {
                person.set(USERNAME_KEY, username);
            }
            if let Some(email) = non_null(identity.email) {
                person.set(EMAIL_KEY, email);
            }
        }
        Some(ResolvedUser::Mapping(map)) => {
            if map.get(ID_KEY).is_some_and(|id| !id.is_null()) {
                *person = PersonDescriptor::from(map);
            }
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person::{Identifiable, UserIdentity};
    use crate::session::MemorySession;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    struct User {
        id: u64,
        username: &'static str,
        email: &'static str,
    }

    impl Identifiable for User {
        fn identity_field(&self) -> Option<Value> {
            Some(json!(self.id))
        }

        fn username(&self) -> Option<Value> {
            Some(json!(self.username))
        }

        fn email(&self) -> Option<Value> {
            Some(json!(self.email))
        }
    }

    struct Anonymous;

    impl Identifiable for Anonymous {
        fn username(&self) -> Option<Value> {
            Some(json!("ghost"))
        }
    }

    fn user_config() -> LoggerConfig {
        LoggerConfig::new().with_person_fn(|| {
            Ok(Some(ResolvedUser::object(&User {
                id: 42,
                username: "a",
                email: "b@x.com",
            })))
        })
    }

    #[test]
    fn explicit_person_replaces_everything() {
        let config = user_config();
        config.configure(map(json!({"person": {"id": 1, "username": "sticky"}})));
        let enricher = ContextEnricher::new(config);

        let context = map(json!({"person": {"id": "explicit"}, "order": 9}));
        let (context, person) = enricher.enrich(context);

        assert_eq!(person.as_map(), &map(json!({"id": "explicit"})));
        assert!(!context.contains_key("person"));
        assert_eq!(context["order"], json!(9));
    }

    #[test]
    fn non_mapping_person_is_stripped_and_ignored() {
        let enricher = ContextEnricher::new(user_config());

        let (context, person) = enricher.enrich(map(json!({"person": "bob"})));

        assert!(context.is_empty());
        assert_eq!(person.id(), Some(&json!(42)));
    }

    #[test]
    fn callback_object_supplies_identity() {
        let enricher = ContextEnricher::new(user_config());

        let (_, person) = enricher.enrich(Map::new());

        assert_eq!(
            person.into_value(),
            json!({"id": 42, "username": "a", "email": "b@x.com"})
        );
    }

    #[test]
    fn key_accessor_is_used_when_no_id_field() {
        let config = LoggerConfig::new().with_person_fn(|| {
            Ok(Some(ResolvedUser::Object(UserIdentity {
                id_key: Some(json!(5)),
                email: Some(json!("k@x.com")),
                ..Default::default()
            })))
        });
        let enricher = ContextEnricher::new(config);

        let (_, person) = enricher.enrich(Map::new());

        assert_eq!(person.into_value(), json!({"id": 5, "email": "k@x.com"}));
    }

    #[test]
    fn object_without_identity_changes_nothing() {
        let config = LoggerConfig::new().with_person_fn(|| Ok(Some(ResolvedUser::object(&Anonymous))));
        config.configure(map(json!({"person": {"id": 3}})));
        let enricher = ContextEnricher::new(config);

        let (_, person) = enricher.enrich(Map::new());

        assert_eq!(person.into_value(), json!({"id": 3}));
    }

    #[test]
    fn mapping_with_id_is_used_wholesale() {
        let config = LoggerConfig::new()
            .with_person_fn(|| Ok(Some(ResolvedUser::Mapping(map(json!({"id": 8, "team": "ops"}))))));
        config.configure(map(json!({"person": {"id": 1, "username": "prior"}})));
        let enricher = ContextEnricher::new(config);

        let (_, person) = enricher.enrich(Map::new());

        assert_eq!(person.into_value(), json!({"id": 8, "team": "ops"}));
    }

    #[test]
    fn mapping_without_id_is_ignored() {
        let config =
            LoggerConfig::new().with_person_fn(|| Ok(Some(ResolvedUser::Mapping(map(json!({"team": "ops"}))))));
        let enricher = ContextEnricher::new(config);

        let (_, person) = enricher.enrich(Map::new());

        assert!(person.is_empty());
    }

    #[test]
    fn failing_callback_behaves_like_no_user() {
        let session = Arc::new(MemorySession::with_data("sess-1", map(json!({"cart": 1}))));

        let failing = ContextEnricher::new(LoggerConfig::new().with_person_fn(|| Err("lookup failed".into())))
            .with_session(session.clone());
        let silent = ContextEnricher::new(LoggerConfig::new().with_person_fn(|| Ok(None))).with_session(session);

        assert_eq!(failing.enrich(Map::new()), silent.enrich(Map::new()));
    }

    #[test]
    fn panicking_callback_is_contained() {
        let enricher = ContextEnricher::new(LoggerConfig::new().with_person_fn(|| panic!("user provider exploded")));

        let (context, person) = enricher.enrich(map(json!({"k": "v"})));

        assert_eq!(context, map(json!({"k": "v"})));
        assert!(person.is_empty());
    }

    // Existing person.session values win over the fresh snapshot. This is
    // the opposite of a latest-wins merge and is kept on purpose.
    #[test]
    fn existing_session_values_take_precedence() {
        let config = LoggerConfig::new();
        config.configure(map(json!({"person": {"id": 1, "session": {"theme": "dark"}}})));
        let session = MemorySession::with_data("sess-1", map(json!({"theme": "light", "cart": 3})));
        let enricher = ContextEnricher::new(config).with_session(Arc::new(session));

        let (_, person) = enricher.enrich(Map::new());

        assert_eq!(person.session(), Some(&map(json!({"theme": "dark", "cart": 3}))));
        assert_eq!(person.id(), Some(&json!(1)));
    }

    #[test]
    fn session_id_fills_missing_person_id() {
        let session = MemorySession::with_data("sess-abc", map(json!({"locale": "en"})));
        let enricher = ContextEnricher::new(LoggerConfig::new()).with_session(Arc::new(session));

        let (_, person) = enricher.enrich(Map::new());

        assert_eq!(person.id(), Some(&json!("sess-abc")));
        assert_eq!(person.session(), Some(&map(json!({"locale": "en"}))));
    }

    #[test]
    fn session_id_does_not_override_resolved_id() {
        let session = MemorySession::with_data("sess-abc", map(json!({"locale": "en"})));
        let enricher = ContextEnricher::new(user_config()).with_session(Arc::new(session));

        let (_, person) = enricher.enrich(Map::new());

        assert_eq!(person.id(), Some(&json!(42)));
    }

    #[test]
    fn empty_session_is_skipped() {
        let enricher = ContextEnricher::new(LoggerConfig::new()).with_session(Arc::new(MemorySession::new("sess-x")));

        let (_, person) = enricher.enrich(Map::new());

        assert!(person.is_empty());
    }

    #[test]
    fn non_mapping_session_value_is_replaced_by_snapshot() {
        let config = LoggerConfig::new();
        config.configure(map(json!({"person": {"id": 1, "session": "stale"}})));
        let session = MemorySession::with_data("sess-1", map(json!({"cart": 2})));
        let enricher = ContextEnricher::new(config).with_session(Arc::new(session));

        let (_, person) = enricher.enrich(Map::new());

        assert_eq!(person.session(), Some(&map(json!({"cart": 2}))));
    }

    #[test]
    fn descriptor_is_written_back_and_stable() {
        let session = MemorySession::with_data("sess-1", map(json!({"cart": 3})));
        let enricher = ContextEnricher::new(user_config()).with_session(Arc::new(session));

        let (_, first) = enricher.enrich(map(json!({"a": 1})));
        assert_eq!(enricher.config().person(), first);

        let (_, second) = enricher.enrich(map(json!({"a": 1})));
        assert_eq!(first, second);
    }

    #[test]
    fn explicit_person_sticks_for_later_calls() {
        let enricher = ContextEnricher::new(LoggerConfig::new());

        enricher.enrich(map(json!({"person": {"id": "u-1"}})));
        let (_, later) = enricher.enrich(Map::new());

        assert_eq!(later.into_value(), json!({"id": "u-1"}));
    }

    #[test]
    fn detached_session_is_no_longer_consulted() {
        let session = MemorySession::with_data("sess-1", map(json!({"cart": 1})));
        let enricher = ContextEnricher::new(LoggerConfig::new()).with_session(Arc::new(session));
        enricher.set_session(None);

        let (_, person) = enricher.enrich(Map::new());

        assert!(person.is_empty());
    }
}
