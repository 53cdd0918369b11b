use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::{sleep, Duration};
use tracing::error;

use tracing_person_context::backend::sink_from_env;
use tracing_person_context::config::LoggerConfig;
use tracing_person_context::enrich::ContextEnricher;
use tracing_person_context::init::init_tracing;
use tracing_person_context::person::{Identifiable, ResolvedUser};
use tracing_person_context::session::MemorySession;

struct CurrentUser;

impl Identifiable for CurrentUser {
    fn identity_key(&self) -> Option<Value> {
        Some(json!(1001))
    }

    fn username(&self) -> Option<Value> {
        Some(json!("demo"))
    }
}

/// Set `PERSON_CONTEXT_DSN=https://TOKEN@api.rollbar.com/api/1/item/` to
/// ship the items; without it they go to a no-op sink.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = sink_from_env()?;

    let config = LoggerConfig::new().with_person_fn(|| Ok(Some(ResolvedUser::object(&CurrentUser))));
    let session = Arc::new(MemorySession::new("sess-demo"));
    session.put("locale", json!("en"));
    let enricher = Arc::new(ContextEnricher::new(config).with_session(session));

    let installed = init_tracing(sink, Arc::clone(&enricher))?;

    error!(order = 7, "payment declined");
    println!("person after first event: {:?}", enricher.config().person());

    error!(person = %json!({"id": "guest-3"}), "explicit person wins");
    println!("person after second event: {:?}", enricher.config().person());

    sleep(Duration::from_secs(2)).await;
    println!(
        "events: {} dropped: {}",
        installed.handler.total_events.load(std::sync::atomic::Ordering::Relaxed),
        installed.handler.dropped_events.load(std::sync::atomic::Ordering::Relaxed),
    );
    Ok(())
}
