use serde::Serialize;
use serde_json::{Map, Value};

/// Key under which the person descriptor travels in record context and in
/// the logger configuration.
pub const PERSON_KEY: &str = "person";
pub const ID_KEY: &str = "id";
pub const USERNAME_KEY: &str = "username";
pub const EMAIL_KEY: &str = "email";
pub const SESSION_KEY: &str = "session";

/// Current-user identity attached to outgoing records.
///
/// A plain string-keyed mapping. By convention it carries `id`, `username`,
/// `email` and optionally a nested `session` mapping. A key counts as set
/// only when it is present with a non-null value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PersonDescriptor(Map<String, Value>);

impl PersonDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn id(&self) -> Option<&Value> {
        self.get(ID_KEY)
    }

    pub fn has_id(&self) -> bool {
        self.id().is_some()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// The nested session mapping, when one is set and is a mapping.
    pub fn session(&self) -> Option<&Map<String, Value>> {
        self.get(SESSION_KEY).and_then(Value::as_object)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for PersonDescriptor {
    fn from(map: Map<String, Value>) -> Self {
        PersonDescriptor(map)
    }
}

/// Capability adapter for host user types.
///
/// A user either exposes its identifier directly (`identity_field`) or
/// through a key accessor (`identity_key`, e.g. a primary key lookup).
/// The field wins when both are available.
pub trait Identifiable {
    fn identity_field(&self) -> Option<Value> {
        None
    }

    fn identity_key(&self) -> Option<Value> {
        None
    }

    fn username(&self) -> Option<Value> {
        None
    }

    fn email(&self) -> Option<Value> {
        None
    }
}

/// Normalized view of a user object returned by a person callback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserIdentity {
    pub id_field: Option<Value>,
    pub id_key: Option<Value>,
    pub username: Option<Value>,
    pub email: Option<Value>,
}

impl UserIdentity {
    pub fn from_user<U: Identifiable + ?Sized>(user: &U) -> Self {
        UserIdentity {
            id_field: user.identity_field(),
            id_key: user.identity_key(),
            username: user.username(),
            email: user.email(),
        }
    }

    /// Resolved identifier: the direct field first, then the key accessor.
    pub fn id(&self) -> Option<Value> {
        non_null(self.id_field.clone()).or_else(|| non_null(self.id_key.clone()))
    }
}

/// What a person callback may hand back.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedUser {
    /// An object-like user; only its identity fields are consulted.
    Object(UserIdentity),
    /// Associative user data, used wholesale when it carries an `id`.
    Mapping(Map<String, Value>),
}

impl ResolvedUser {
    pub fn object<U: Identifiable + ?Sized>(user: &U) -> Self {
        ResolvedUser::Object(UserIdentity::from_user(user))
    }
}

pub(crate) fn non_null(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}
