use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};
use tracing_person_context::{
    config::LoggerConfig,
    enrich::ContextEnricher,
    init::init_tracing,
    sink::{Envelope, LogSink},
};

/// Example of plugging in a custom transport by implementing `LogSink`
/// directly.
struct PrintSink;

#[async_trait]
impl LogSink for PrintSink {
    async fn send(&self, envelope: &Envelope) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        println!("[print-sink] person={:?} record={:?}", envelope.person, envelope.record);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink: Arc<dyn LogSink> = Arc::new(PrintSink);
    let enricher = Arc::new(ContextEnricher::new(LoggerConfig::new()));

    let _installed = init_tracing(sink, enricher)?;

    info!("custom sink example started");
    error!(db = "orders", "simulated error sent through the custom sink");

    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
    Ok(())
}
