//! Application context shared by every route handler via Axum state.

use std::sync::Arc;

use mm_av::{DurationProber, EncodeProfile, FilterGraphBuilder, MediaEngine, ToolRegistry};
use mm_core::config::Config;
use mm_pipeline::{CombinationOrchestrator, OutputStore};
use tokio_util::sync::CancellationToken;

/// Immutable infrastructure shared across handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Discovered external tools.
    pub tools: Arc<ToolRegistry>,
    pub orchestrator: Arc<CombinationOrchestrator>,
    /// Persisted outputs of deferred runs.
    pub store: Arc<OutputStore>,
    /// Cancelled on shutdown; every run gets a child token.
    pub shutdown: CancellationToken,
}

impl AppContext {
    /// Build a context whose prober and engine come from the tool registry.
    pub fn new(config: Config, tools: ToolRegistry) -> Self {
        let prober: Arc<dyn DurationProber> =
            Arc::new(tools.prober(config.engine.probe_timeout()));
        let engine: Arc<dyn MediaEngine> = Arc::new(tools.engine(config.engine.timeout()));
        Self::with_backends(config, tools, prober, engine)
    }

    /// Build a context around explicit prober and engine implementations.
    pub fn with_backends(
        config: Config,
        tools: ToolRegistry,
        prober: Arc<dyn DurationProber>,
        engine: Arc<dyn MediaEngine>,
    ) -> Self {
        let builder = FilterGraphBuilder::new(EncodeProfile::from(&config.engine));
        let orchestrator = CombinationOrchestrator::new(
            prober,
            engine,
            builder,
            config.storage.temp_dir.clone(),
            config.storage.output_dir.clone(),
        );
        let store = OutputStore::new(config.storage.output_dir.clone());

        Self {
            config: Arc::new(config),
            tools: Arc::new(tools),
            orchestrator: Arc::new(orchestrator),
            store: Arc::new(store),
            shutdown: CancellationToken::new(),
        }
    }
}
