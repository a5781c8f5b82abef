//! Engine configuration, assembled once and shared read-only by every chain.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    chain::definition::{ChainParser, JsonParser},
    logger::Logger,
    message::Message,
    node::NodeError,
    pool::WorkerPool,
    registry::{self, Registry},
};

/// Which side of a node invocation a debug event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugStage {
    /// About to invoke the node: the relation is the one it was reached by.
    In,
    /// The node has told its outcome: the relation is the one it chose.
    Out,
}

/// Node-level debug hook: stage, node id, message, relation, error.
pub type DebugFn = dyn Fn(DebugStage, &str, &Message, &str, Option<&NodeError>) + Send + Sync;

/// End-of-message hook, invoked once per terminal leaf a traversal reaches.
pub type EndFn = dyn Fn(&Message, Option<&NodeError>) + Send + Sync;

const DEFAULT_SCRIPT_MAX_DURATION: Duration = Duration::from_millis(2000);

#[derive(Clone)]
pub struct EngineConfig {
    pub(crate) on_debug: Option<Arc<DebugFn>>,
    pub(crate) on_end: Option<Arc<EndFn>>,
    pub(crate) script_max_duration: Duration,
    pub(crate) pool: WorkerPool,
    pub(crate) registry: Arc<Registry>,
    pub(crate) parser: Arc<dyn ChainParser>,
    pub(crate) logger: Logger,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            on_debug: None,
            on_end: None,
            script_max_duration: DEFAULT_SCRIPT_MAX_DURATION,
            pool: WorkerPool::unbounded(),
            registry: registry::default_registry(),
            parser: Arc::new(JsonParser),
            logger: Logger::default(),
        }
    }

    /// Node-level debug callback, fired before and after every invocation.
    pub fn with_on_debug<F>(mut self, f: F) -> Self
    where
        F: Fn(DebugStage, &str, &Message, &str, Option<&NodeError>) + Send + Sync + 'static,
    {
        self.on_debug = Some(Arc::new(f));
        self
    }

    /// End-of-message callback. A chain with several terminal leaves invokes
    /// it once per leaf reached, not once per input message.
    pub fn with_on_end<F>(mut self, f: F) -> Self
    where
        F: Fn(&Message, Option<&NodeError>) + Send + Sync + 'static,
    {
        self.on_end = Some(Arc::new(f));
        self
    }

    /// Deadline for embedded script execution. Default 2000 ms.
    pub fn with_script_max_duration(mut self, max: Duration) -> Self {
        self.script_max_duration = max;
        self
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn ChainParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn script_max_duration(&self) -> Duration {
        self.script_max_duration
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("on_debug", &self.on_debug.is_some())
            .field("on_end", &self.on_end.is_some())
            .field("script_max_duration", &self.script_max_duration)
            .field("registry", &self.registry)
            .finish()
    }
}
