use crate::sink::{Envelope, LogSink};
use async_trait::async_trait;
use std::error::Error;
use tokio::sync::Mutex;

/// A sink that simply drops all records.
///
/// Useful for measuring the overhead of enrichment itself without any
/// external I/O.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn send(&self, _envelope: &Envelope) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// A sink that keeps every envelope in memory.
#[derive(Default)]
pub struct MemorySink {
    envelopes: Mutex<Vec<Envelope>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far, in arrival order.
    pub async fn envelopes(&self) -> Vec<Envelope> {
        self.envelopes.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.envelopes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.envelopes.lock().await.is_empty()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn send(&self, envelope: &Envelope) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.envelopes.lock().await.push(envelope.clone());
        Ok(())
    }
}
