//! Per-message traversal handle and the dispatch algorithm.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{
    chain::{CompiledChain, relation},
    config::{DebugStage, EndFn},
    message::Message,
    node::NodeError,
};

/// Ambient key/value store shared by every branch of one message traversal.
/// Reads are concurrent, writes serialized. Dropped with the traversal.
#[derive(Clone, Debug, Default)]
pub struct SharedStore(Arc<DashMap<String, Value>>);

impl SharedStore {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key).map(|entry| entry.value().clone())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.remove(key).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Where a terminal leaf reports to: the top-level end callback, or the
/// parent context when the chain runs as a sub-chain.
enum LeafSink {
    TopLevel(Option<Arc<EndFn>>),
    Parent(ExecutionContext),
}

/// The traversal handle passed to every node invocation. Each invocation
/// gets its own context value; only the compiled chain, the engine
/// configuration and the per-traversal store are shared behind it.
#[derive(Clone)]
pub struct ExecutionContext {
    node_id: String,
    /// Relation by which the current node was reached; empty at the root.
    relation: String,
    chain: Arc<CompiledChain>,
    globals: SharedStore,
    sink: Arc<LeafSink>,
}

impl ExecutionContext {
    /// Begin a fresh top-level traversal at the chain root. A new context and
    /// a new ambient store per invocation; concurrent messages through the
    /// same chain never share mutable state.
    pub(crate) fn start(chain: Arc<CompiledChain>, msg: Message, end: Option<Arc<EndFn>>) {
        let ctx = Self {
            node_id: chain.root_id().to_string(),
            relation: String::new(),
            globals: SharedStore::default(),
            sink: Arc::new(LeafSink::TopLevel(end)),
            chain,
        };
        ctx.invoke(msg);
    }

    /// Begin a sub-chain traversal. The ambient store is the parent's (it is
    /// the same message traversal) and leaves bubble back into the parent's
    /// relation resolution.
    pub(crate) fn start_with_parent(
        chain: Arc<CompiledChain>,
        msg: Message,
        parent: ExecutionContext,
    ) {
        let ctx = Self {
            node_id: chain.root_id().to_string(),
            relation: String::new(),
            globals: parent.globals.clone(),
            sink: Arc::new(LeafSink::Parent(parent)),
            chain,
        };
        ctx.invoke(msg);
    }

    /// Id of the node this context is executing.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn chain(&self) -> &Arc<CompiledChain> {
        &self.chain
    }

    pub fn config(&self) -> &crate::config::EngineConfig {
        self.chain.config()
    }

    /// The ambient store scoped to this message traversal.
    pub fn globals(&self) -> &SharedStore {
        &self.globals
    }

    /// Route along the `Success` relation.
    pub fn tell_success(&self, msg: Message) {
        self.tell(msg, relation::SUCCESS, None);
    }

    /// Route along the `Failure` relation, recording the error. With no
    /// `Failure` edge declared the branch terminates silently; retries are a
    /// node implementation concern, the engine never redelivers.
    pub fn tell_failure(&self, msg: Message, err: NodeError) {
        self.tell(msg, relation::FAILURE, Some(err));
    }

    /// Route along an arbitrary relation, e.g. `True`/`False` branches.
    pub fn tell_next(&self, msg: Message, relation: &str) {
        self.tell(msg, relation, None);
    }

    fn tell(&self, msg: Message, relation: &str, err: Option<NodeError>) {
        self.debug_event(DebugStage::Out, &msg, relation, err.as_ref());
        match self.chain.targets(&self.node_id, relation) {
            Some(targets) => {
                // fan-out: every target continues independently on its own
                // copy of the message
                for target in targets {
                    let child = ExecutionContext {
                        node_id: target.clone(),
                        relation: relation.to_string(),
                        chain: self.chain.clone(),
                        globals: self.globals.clone(),
                        sink: self.sink.clone(),
                    };
                    child.invoke(msg.clone());
                }
            }
            None => self.leaf(msg, relation, err),
        }
    }

    /// Dispatch one node invocation as an independent task on the pool.
    fn invoke(self, msg: Message) {
        let Some(node) = self.chain.node(&self.node_id) else {
            error!(chain = %self.chain.id(), node = %self.node_id, "dispatch to unknown node id");
            return;
        };
        self.debug_event(DebugStage::In, &msg, &self.relation, None);

        let pool = self.chain.config().pool.clone();
        let dispatch_chain_id = self.chain.id().to_string();
        let dispatch_node_id = self.node_id.clone();
        let submitted = pool.submit(async move {
            let invocation = node.on_msg(self.clone(), msg.clone());
            match AssertUnwindSafe(invocation).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    // infrastructure failure: the node could not even attempt
                    // delivery. No relation is followed.
                    error!(
                        chain = %self.chain.id(),
                        node = %self.node_id,
                        %err,
                        "node failed to handle message"
                    );
                }
                Err(_) => {
                    // contain the panic at the task boundary and route it as
                    // a domain error for this branch only
                    self.tell_failure(
                        msg,
                        NodeError::ExecutionFailed("node panicked".to_string()),
                    );
                }
            }
        });
        if let Err(err) = submitted {
            warn!(chain = %dispatch_chain_id, node = %dispatch_node_id, %err, "dropping dispatch");
        }
    }

    /// Terminal leaf for this traversal path.
    fn leaf(&self, msg: Message, relation_label: &str, err: Option<NodeError>) {
        if relation_label == relation::FAILURE {
            // documented policy: a failure with no Failure edge ends the
            // branch silently, visible only to the debug hook
            debug!(
                chain = %self.chain.id(),
                node = %self.node_id,
                "failure branch terminated without a Failure edge"
            );
            return;
        }
        match self.sink.as_ref() {
            LeafSink::TopLevel(end_override) => {
                if let Some(end) = end_override {
                    end(&msg, err.as_ref());
                } else if let Some(end) = &self.chain.config().on_end {
                    end(&msg, err.as_ref());
                }
            }
            LeafSink::Parent(parent) => match err {
                None => parent.tell_success(msg),
                Some(e) => parent.tell_failure(msg, e),
            },
        }
    }

    fn debug_event(&self, stage: DebugStage, msg: &Message, relation: &str, err: Option<&NodeError>) {
        if let Some(on_debug) = &self.chain.config().on_debug {
            on_debug(stage, &self.node_id, msg, relation, err);
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("chain", &self.chain.id())
            .field("node", &self.node_id)
            .field("relation", &self.relation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shared_store_set_get_remove() {
        let store = SharedStore::default();
        assert!(store.is_empty());

        store.set("key", json!(42));
        assert_eq!(store.get("key"), Some(json!(42)));
        assert_eq!(store.len(), 1);

        assert_eq!(store.remove("key"), Some(json!(42)));
        assert!(store.get("key").is_none());
    }

    #[test]
    fn test_shared_store_clones_share_data() {
        let store = SharedStore::default();
        let view = store.clone();

        store.set("seen", json!(true));
        assert_eq!(view.get("seen"), Some(json!(true)));
    }
}
