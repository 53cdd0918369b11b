use crate::env::{
    env_or, PERSON_CONTEXT_ACCESS_TOKEN_ENV, PERSON_CONTEXT_ENDPOINT_ENV, PERSON_CONTEXT_ENVIRONMENT_ENV,
};
use crate::person::{PersonDescriptor, ID_KEY};
use crate::sink::{Envelope, LogSink};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;

pub const DEFAULT_ENDPOINT: &str = "https://api.rollbar.com/api/1/item/";
pub const DEFAULT_ENVIRONMENT: &str = "production";

const CONTEXT_BODY_KEY: &str = "context_body";

/// Configuration for [`HttpItemSink`].
///
/// Each envelope becomes one JSON item posted to `endpoint`, authenticated
/// with `access_token`.
#[derive(Clone, Debug)]
pub struct HttpSinkConfig {
    pub endpoint: String,
    pub access_token: String,
    pub environment: String,
}

impl HttpSinkConfig {
    /// Default endpoint and environment with the given token.
    pub fn new(access_token: impl Into<String>) -> Self {
        HttpSinkConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_token: access_token.into(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
        }
    }

    /// Read the configuration from `PERSON_CONTEXT_*` environment variables.
    ///
    /// Returns [`HttpSinkError::MissingToken`] when no access token is set.
    pub fn from_env() -> Result<Self, HttpSinkError> {
        let access_token = env_or(PERSON_CONTEXT_ACCESS_TOKEN_ENV, "");
        if access_token.is_empty() {
            return Err(HttpSinkError::MissingToken);
        }
        Ok(HttpSinkConfig {
            endpoint: env_or(PERSON_CONTEXT_ENDPOINT_ENV, DEFAULT_ENDPOINT),
            access_token,
            environment: env_or(PERSON_CONTEXT_ENVIRONMENT_ENV, DEFAULT_ENVIRONMENT),
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HttpSinkError {
    #[error("no access token configured")]
    MissingToken,
}

/// Error-tracking item sink using the HTTP item API.
///
/// Record context is flattened into the item's message next to `body`,
/// which holds the log message. A context entry that is itself named
/// `body` is moved to `context_body`.
#[derive(Clone)]
pub struct HttpItemSink {
    client: Client,
    config: HttpSinkConfig,
}

impl HttpItemSink {
    /// Construct a new sink instance using the provided configuration.
    pub fn new(config: HttpSinkConfig) -> Self {
        let client = Client::new();
        Self { client, config }
    }

    /// Configuration the sink was built with.
    pub fn config(&self) -> &HttpSinkConfig {
        &self.config
    }

    fn map_envelope(&self, envelope: &Envelope) -> Item {
        let record = &envelope.record;

        let mut message = Map::new();
        message.insert("body".to_string(), Value::String(record.message.clone()));
        for (key, value) in &record.context {
            let key = if key == "body" { CONTEXT_BODY_KEY } else { key.as_str() };
            message.insert(key.to_string(), value.clone());
        }

        Item {
            access_token: self.config.access_token.clone(),
            data: ItemData {
                environment: self.config.environment.clone(),
                level: item_level(&record.level),
                timestamp: record.timestamp.timestamp(),
                body: ItemBody { message },
                person: item_person(&envelope.person),
                custom: record.extra.clone(),
                language: "rust",
                notifier: Notifier {
                    name: env!("CARGO_PKG_NAME"),
                    version: env!("CARGO_PKG_VERSION"),
                },
            },
        }
    }
}

#[derive(Serialize)]
struct Item {
    access_token: String,
    data: ItemData,
}

#[derive(Serialize)]
struct ItemData {
    environment: String,
    level: &'static str,
    timestamp: i64,
    body: ItemBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    person: Option<Map<String, Value>>,
    custom: Map<String, Value>,
    language: &'static str,
    notifier: Notifier,
}

#[derive(Serialize)]
struct ItemBody {
    message: Map<String, Value>,
}

#[derive(Serialize)]
struct Notifier {
    name: &'static str,
    version: &'static str,
}

fn item_level(level: &str) -> &'static str {
    match level.to_ascii_uppercase().as_str() {
        "CRITICAL" | "ALERT" | "EMERGENCY" => "critical",
        "ERROR" => "error",
        "WARN" | "WARNING" => "warning",
        "INFO" | "NOTICE" => "info",
        _ => "debug",
    }
}

// The item API expects a string id.
fn item_person(person: &PersonDescriptor) -> Option<Map<String, Value>> {
    if person.is_empty() {
        return None;
    }
    let mut map = person.as_map().clone();
    if let Some(id) = person.id() {
        let id = match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        map.insert(ID_KEY.to_string(), Value::String(id));
    }
    Some(map)
}

#[async_trait]
impl LogSink for HttpItemSink {
    async fn send(&self, envelope: &Envelope) -> Result<(), Box<dyn Error + Send + Sync>> {
        let item = self.map_envelope(envelope);
        let resp = self
            .client
            .post(&self.config.endpoint)
            .header("X-Rollbar-Access-Token", &self.config.access_token)
            .json(&item)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(format!("item post failed with status {}: {}", status, text).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogRecord;
    use serde_json::json;

    fn sink() -> HttpItemSink {
        HttpItemSink::new(HttpSinkConfig {
            endpoint: "http://127.0.0.1:9/item/".to_string(),
            access_token: "token-1".to_string(),
            environment: "test".to_string(),
        })
    }

    #[test]
    fn item_carries_person_and_context() {
        let mut person = PersonDescriptor::new();
        person.set("id", json!(42));
        person.set("session", json!({"cart": 3}));
        let envelope = Envelope {
            record: LogRecord::new("app", "WARN", "slow checkout").context_entry("order", json!(7)),
            person,
        };

        let item = serde_json::to_value(sink().map_envelope(&envelope)).unwrap();

        assert_eq!(item["access_token"], json!("token-1"));
        assert_eq!(item["data"]["environment"], json!("test"));
        assert_eq!(item["data"]["level"], json!("warning"));
        assert_eq!(item["data"]["body"]["message"], json!({"body": "slow checkout", "order": 7}));
        assert_eq!(item["data"]["person"], json!({"id": "42", "session": {"cart": 3}}));
    }

    #[test]
    fn context_body_does_not_replace_message() {
        let envelope = Envelope {
            record: LogRecord::new("app", "ERROR", "upload rejected").context_entry("body", json!({"size": 10})),
            person: PersonDescriptor::new(),
        };

        let item = serde_json::to_value(sink().map_envelope(&envelope)).unwrap();

        assert_eq!(
            item["data"]["body"]["message"],
            json!({"body": "upload rejected", "context_body": {"size": 10}})
        );
    }

    #[test]
    fn empty_person_is_omitted() {
        let envelope = Envelope {
            record: LogRecord::new("app", "ERROR", "boom"),
            person: PersonDescriptor::new(),
        };

        let item = serde_json::to_value(sink().map_envelope(&envelope)).unwrap();

        assert_eq!(item["data"]["level"], json!("error"));
        assert!(item["data"].get("person").is_none());
    }

    #[test]
    fn unknown_levels_map_to_debug() {
        assert_eq!(item_level("TRACE"), "debug");
        assert_eq!(item_level("critical"), "critical");
    }
}
