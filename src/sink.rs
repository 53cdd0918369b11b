use crate::person::PersonDescriptor;
use crate::record::LogRecord;
use async_trait::async_trait;
use serde::Serialize;
use std::error::Error;

/// A rewritten record together with the person computed for it.
///
/// The person is captured when the record is written, so later changes to
/// the sticky configuration never bleed into records already queued.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub record: LogRecord,
    pub person: PersonDescriptor,
}

/// Asynchronous destination for [`Envelope`]s produced by the handler.
///
/// Implementations are responsible for transporting records to a concrete
/// backend (an error-tracking HTTP API, an in-memory buffer, etc). The
/// handler calls `send` from a background task and never awaits it on the
/// application thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Send a single enriched record to the underlying backend.
    ///
    /// **Returns**
    /// - `Ok(())` if the record was accepted by the backend.
    /// - `Err(..)` if the backend failed (network error, serialization
    ///   error, HTTP status, etc.). The handler treats this as a transient
    ///   failure and retries the batch with backoff.
    async fn send(&self, envelope: &Envelope) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered records, if the backend implements buffering.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
