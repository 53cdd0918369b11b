use crate::enrich::ContextEnricher;
use crate::handler::PersonHandler;
use crate::layer::PersonContextLayer;
use crate::sink::LogSink;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the enrichment layer.
///
/// **Fields**
/// - `channel_buffer`: maximum number of queued records before new ones
///   are dropped.
/// - `batch_size`: number of records sent to the sink per batch.
/// - `flush_interval`: longest wait before a partial batch is flushed.
/// - `min_level`: least severe level that is captured.
/// - `enable_stdout`: when `true`, a `tracing_subscriber::fmt` layer is
///   installed next to the enrichment layer.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub min_level: Level,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            min_level: Level::ERROR,
            enable_stdout: true,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Handles returned by [`init_tracing_with_config`].
pub struct Installed {
    /// The handler behind the installed layer, e.g. for attaching a session
    /// through [`PersonHandler::enricher`] or reading its counters.
    pub handler: Arc<PersonHandler>,
    /// Background sink worker.
    pub worker: JoinHandle<()>,
}

/// Build the enrichment layer without installing it, for callers composing
/// their own subscriber.
pub fn build_layer(
    sink: Arc<dyn LogSink>,
    enricher: Arc<ContextEnricher>,
    config: &LayerConfig,
) -> (PersonContextLayer, JoinHandle<()>) {
    let (handler, worker) = PersonHandler::new(
        sink,
        enricher,
        config.channel_buffer,
        config.batch_size,
        config.flush_interval,
    );
    let layer = PersonContextLayer::new(Arc::new(handler)).with_min_level(config.min_level);
    (layer, worker)
}

/// Install a global `tracing` subscriber that enriches captured events with
/// person context and ships them to `sink`.
///
/// Must be called from within a Tokio runtime.
pub fn init_tracing_with_config(
    sink: Arc<dyn LogSink>,
    enricher: Arc<ContextEnricher>,
    config: LayerConfig,
) -> Result<Installed, InitError> {
    let (layer, worker) = build_layer(sink, enricher, &config);
    let handler = Arc::clone(layer.handler());

    // The two subscriber shapes have different types, hence the branches.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(Installed { handler, worker })
}

/// Initialize tracing with [`LayerConfig::default`].
pub fn init_tracing(sink: Arc<dyn LogSink>, enricher: Arc<ContextEnricher>) -> Result<Installed, InitError> {
    init_tracing_with_config(sink, enricher, LayerConfig::default())
}
