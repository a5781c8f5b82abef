use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    config::EngineConfig,
    context::ExecutionContext,
    message::Message,
    node::{Node, NodeError, RawNodeConfig, decode_config},
};

/// Delegates the message to another chain. The target chain's terminal
/// leaves bubble back into this node's `Success`/`Failure` relations, so
/// composition is invisible to the caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubChainConfig {
    pub chain_id: String,
}

#[derive(Debug, Default)]
pub struct SubChainNode {
    config: SubChainConfig,
}

#[async_trait]
impl Node for SubChainNode {
    fn type_name(&self) -> &str {
        "sub_chain"
    }

    fn create(&self) -> Box<dyn Node> {
        Box::new(SubChainNode::default())
    }

    fn init(&mut self, _config: &EngineConfig, raw: &RawNodeConfig) -> Result<(), NodeError> {
        self.config = decode_config(raw)?;
        if self.config.chain_id.is_empty() {
            return Err(NodeError::InvalidConfig("chain_id must not be empty".to_string()));
        }
        Ok(())
    }

    async fn on_msg(&self, ctx: ExecutionContext, msg: Message) -> Result<(), NodeError> {
        // resolved lazily so chains can reference each other regardless of
        // load order
        match ctx.chain().resolve_chain(&self.config.chain_id) {
            Some(target) => target.run_with_parent(msg, ctx),
            None => ctx.tell_failure(msg, NodeError::ChainNotFound(self.config.chain_id.clone())),
        }
        Ok(())
    }
}
