//! Engine facade: owns the chain table and the shared configuration.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::{
    chain::{ChainDefinition, ChainError, CompiledChain},
    config::EngineConfig,
    message::Message,
    node::NodeError,
};

/// The process-level entry point. Chains are compiled into a shared table so
/// they can invoke each other by id; messages enter through [`Engine::process`].
pub struct Engine {
    config: EngineConfig,
    chains: Arc<DashMap<String, Arc<CompiledChain>>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            chains: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse raw bytes with the configured parser and compile the result.
    pub fn load(&self, input: &[u8]) -> Result<Arc<CompiledChain>, ChainError> {
        let def = self.config.parser.parse(input)?;
        self.add(def)
    }

    /// Compile a definition and install it. Re-adding an id replaces the
    /// previous chain and destroys it.
    pub fn add(&self, def: ChainDefinition) -> Result<Arc<CompiledChain>, ChainError> {
        let chain = CompiledChain::build(&def, self.config.clone(), self.chains.clone())?;
        if let Some(old) = self.chains.insert(def.id.clone(), chain.clone()) {
            old.destroy();
        }
        info!(chain = %def.id, "installed chain");
        Ok(chain)
    }

    pub fn get(&self, id: &str) -> Option<Arc<CompiledChain>> {
        self.chains.get(id).map(|entry| entry.value().clone())
    }

    /// Remove and destroy a chain. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        match self.chains.remove(id) {
            Some((_, chain)) => {
                chain.destroy();
                true
            }
            None => false,
        }
    }

    pub fn chain_ids(&self) -> Vec<String> {
        self.chains.iter().map(|e| e.key().clone()).collect()
    }

    /// Route a message into the named chain. Completion is reported through
    /// the configured end-of-message callback, once per terminal leaf.
    pub fn process(&self, chain_id: &str, msg: Message) -> Result<(), ChainError> {
        let chain = self
            .get(chain_id)
            .ok_or_else(|| ChainError::NotFound(chain_id.to_string()))?;
        chain.run(msg);
        Ok(())
    }

    /// Route a message with a per-invocation end callback overriding the
    /// configured one. Endpoints use this to collect a chain's outcome into
    /// an outbound message.
    pub fn process_with_end<F>(&self, chain_id: &str, msg: Message, end: F) -> Result<(), ChainError>
    where
        F: Fn(&Message, Option<&NodeError>) + Send + Sync + 'static,
    {
        let chain = self
            .get(chain_id)
            .ok_or_else(|| ChainError::NotFound(chain_id.to_string()))?;
        chain.run_with_end(msg, Arc::new(end));
        Ok(())
    }

    /// Destroy every chain and shut the worker pool down. The engine is not
    /// usable afterwards.
    pub fn stop(&self) {
        for entry in self.chains.iter() {
            entry.value().destroy();
        }
        self.chains.clear();
        self.config.pool.shutdown();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("chains", &self.chain_ids())
            .finish()
    }
}
