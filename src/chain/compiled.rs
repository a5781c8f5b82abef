//! Chain compilation: definition + registry in, immutable runtime graph out.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use petgraph::algo::is_cyclic_directed;
use petgraph::prelude::StableDiGraph;
use tracing::debug;

use crate::{
    chain::{ChainError, definition::ChainDefinition},
    config::{EndFn, EngineConfig},
    context::ExecutionContext,
    message::Message,
    node::Node,
};

/// A runtime graph built from a [`ChainDefinition`]: initialized node
/// instances plus relation adjacency. Read-only after compilation and safely
/// shared by any number of concurrent traversals; mutation means
/// recompiling and swapping the chain.
pub struct CompiledChain {
    id: String,
    root_id: String,
    nodes: HashMap<String, Arc<dyn Node>>,
    /// node id -> relation -> ordered target node ids.
    adjacency: HashMap<String, HashMap<String, Vec<String>>>,
    config: EngineConfig,
    /// The engine's chain table, consulted lazily for sub-chain invocation.
    /// Weak: the table owns the chains, not the other way around.
    chains: Weak<DashMap<String, Arc<CompiledChain>>>,
    destroyed: AtomicBool,
}

impl CompiledChain {
    /// Compile a definition. Validation happens before any node is
    /// instantiated; if a node fails `init`, every node initialized so far
    /// is destroyed and no chain is returned.
    pub fn build(
        def: &ChainDefinition,
        config: EngineConfig,
        chains: Arc<DashMap<String, Arc<CompiledChain>>>,
    ) -> Result<Arc<Self>, ChainError> {
        let root_id = validate(def)?;

        let mut nodes: HashMap<String, Arc<dyn Node>> = HashMap::with_capacity(def.nodes.len());
        for nd in &def.nodes {
            let mut instance = match config.registry.create(&nd.kind) {
                Some(instance) => instance,
                None => {
                    destroy_all(&nodes);
                    return Err(ChainError::UnknownType(nd.kind.clone()));
                }
            };
            if let Err(source) = instance.init(&config, &nd.config) {
                destroy_all(&nodes);
                return Err(ChainError::NodeInit {
                    chain: def.id.clone(),
                    node: nd.id.clone(),
                    source,
                });
            }
            nodes.insert(nd.id.clone(), Arc::from(instance));
        }

        let mut adjacency: HashMap<String, HashMap<String, Vec<String>>> = HashMap::new();
        for conn in &def.connections {
            adjacency
                .entry(conn.from.clone())
                .or_default()
                .entry(conn.relation.clone())
                .or_default()
                .push(conn.to.clone());
        }

        debug!(chain = %def.id, nodes = nodes.len(), "compiled chain");
        Ok(Arc::new(Self {
            id: def.id.clone(),
            root_id,
            nodes,
            adjacency,
            config,
            chains: Arc::downgrade(&chains),
            destroyed: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn node(&self, id: &str) -> Option<Arc<dyn Node>> {
        self.nodes.get(id).cloned()
    }

    pub(crate) fn targets(&self, node_id: &str, relation: &str) -> Option<&Vec<String>> {
        self.adjacency
            .get(node_id)
            .and_then(|by_relation| by_relation.get(relation))
            .filter(|targets| !targets.is_empty())
    }

    /// Look up another compiled chain by id, for sub-chain invocation.
    pub fn resolve_chain(&self, id: &str) -> Option<Arc<CompiledChain>> {
        let table = self.chains.upgrade()?;
        let chain = table.get(id).map(|entry| entry.value().clone());
        chain
    }

    /// Run a message through the chain. Each terminal leaf the traversal
    /// reaches invokes the configured end-of-message callback once.
    pub fn run(self: &Arc<Self>, msg: Message) {
        ExecutionContext::start(self.clone(), msg, None);
    }

    /// Run with a per-invocation end callback overriding the configured one.
    pub fn run_with_end(self: &Arc<Self>, msg: Message, end: Arc<EndFn>) {
        ExecutionContext::start(self.clone(), msg, Some(end));
    }

    /// Run as a sub-chain: terminal leaves bubble into the parent context's
    /// relation resolution instead of the top-level end callback.
    pub(crate) fn run_with_parent(self: &Arc<Self>, msg: Message, parent: ExecutionContext) {
        ExecutionContext::start_with_parent(self.clone(), msg, parent);
    }

    /// Tear the chain down. Node instances are destroyed exactly once, even
    /// if called repeatedly or while invocations are still in flight.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        for node in self.nodes.values() {
            node.destroy();
        }
        debug!(chain = %self.id, "destroyed chain");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Drop for CompiledChain {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for CompiledChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledChain")
            .field("id", &self.id)
            .field("root", &self.root_id)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn destroy_all(nodes: &HashMap<String, Arc<dyn Node>>) {
    for node in nodes.values() {
        node.destroy();
    }
}

/// Structural validation: unique node ids, known connection endpoints,
/// exactly one resolvable root, no cycles. Returns the root node id.
fn validate(def: &ChainDefinition) -> Result<String, ChainError> {
    let mut ids = HashSet::new();
    for nd in &def.nodes {
        if !ids.insert(nd.id.as_str()) {
            return Err(ChainError::DuplicateNode {
                chain: def.id.clone(),
                node: nd.id.clone(),
            });
        }
    }

    for conn in &def.connections {
        for endpoint in [&conn.from, &conn.to] {
            if !ids.contains(endpoint.as_str()) {
                return Err(ChainError::UnknownNode {
                    chain: def.id.clone(),
                    node: endpoint.clone(),
                });
            }
        }
    }

    let root_id = resolve_root(def)?;

    let mut graph = StableDiGraph::<&str, ()>::new();
    let mut index_of = HashMap::new();
    for nd in &def.nodes {
        let idx = graph.add_node(nd.id.as_str());
        index_of.insert(nd.id.as_str(), idx);
    }
    for conn in &def.connections {
        graph.add_edge(index_of[conn.from.as_str()], index_of[conn.to.as_str()], ());
    }
    if is_cyclic_directed(&graph) {
        return Err(ChainError::Cyclic(def.id.clone()));
    }

    Ok(root_id)
}

fn resolve_root(def: &ChainDefinition) -> Result<String, ChainError> {
    let flagged: Vec<&str> = def
        .nodes
        .iter()
        .filter(|nd| nd.root)
        .map(|nd| nd.id.as_str())
        .collect();
    match flagged.as_slice() {
        [single] => return Ok(single.to_string()),
        [] => {}
        _ => return Err(ChainError::MultipleRoots(def.id.clone())),
    }

    // no explicit flag: the unique node without incoming connections
    let targets: HashSet<&str> = def.connections.iter().map(|c| c.to.as_str()).collect();
    let entry_points: Vec<&str> = def
        .nodes
        .iter()
        .map(|nd| nd.id.as_str())
        .filter(|id| !targets.contains(id))
        .collect();
    match entry_points.as_slice() {
        [single] => Ok(single.to_string()),
        [] => Err(ChainError::NoRoot(def.id.clone())),
        _ => Err(ChainError::MultipleRoots(def.id.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::definition::{Connection, NodeDefinition};
    use serde_json::json;

    fn node(id: &str, kind: &str) -> NodeDefinition {
        NodeDefinition {
            id: id.to_string(),
            kind: kind.to_string(),
            config: serde_json::Map::new(),
            root: false,
        }
    }

    fn conn(from: &str, to: &str, relation: &str) -> Connection {
        Connection {
            from: from.to_string(),
            to: to.to_string(),
            relation: relation.to_string(),
        }
    }

    fn log_def(id: &str) -> ChainDefinition {
        ChainDefinition {
            id: id.to_string(),
            root: true,
            nodes: vec![node("a", "log"), node("b", "log")],
            connections: vec![conn("a", "b", "Success")],
        }
    }

    fn build(def: &ChainDefinition) -> Result<Arc<CompiledChain>, ChainError> {
        CompiledChain::build(def, EngineConfig::new(), Arc::new(DashMap::new()))
    }

    #[tokio::test]
    async fn test_build_linear_chain() {
        let chain = build(&log_def("linear")).unwrap();
        assert_eq!(chain.root_id(), "a");
        assert_eq!(chain.targets("a", "Success").unwrap(), &vec!["b".to_string()]);
        assert!(chain.targets("b", "Success").is_none());
    }

    #[tokio::test]
    async fn test_unknown_connection_endpoint_fails() {
        let mut def = log_def("bad");
        def.connections.push(conn("a", "ghost", "Success"));

        let err = build(&def).unwrap_err();
        assert!(matches!(err, ChainError::UnknownNode { node, .. } if node == "ghost"));
    }

    #[tokio::test]
    async fn test_unknown_type_fails() {
        let mut def = log_def("bad");
        def.nodes.push(node("c", "does_not_exist"));
        def.connections.push(conn("b", "c", "Success"));

        let err = build(&def).unwrap_err();
        assert!(matches!(err, ChainError::UnknownType(kind) if kind == "does_not_exist"));
    }

    #[tokio::test]
    async fn test_two_declared_roots_fail() {
        let mut def = log_def("two_roots");
        def.nodes[0].root = true;
        def.nodes[1].root = true;

        let err = build(&def).unwrap_err();
        assert!(matches!(err, ChainError::MultipleRoots(_)));
    }

    #[tokio::test]
    async fn test_cycle_fails() {
        let mut def = log_def("cyclic");
        def.connections.push(conn("b", "a", "Success"));
        // both nodes now have an incoming edge, so flag the root explicitly
        def.nodes[0].root = true;

        let err = build(&def).unwrap_err();
        assert!(matches!(err, ChainError::Cyclic(_)));
    }

    #[tokio::test]
    async fn test_self_loop_fails() {
        let mut def = log_def("self_loop");
        def.connections.push(conn("b", "b", "Success"));

        let err = build(&def).unwrap_err();
        assert!(matches!(err, ChainError::Cyclic(_)));
    }

    #[tokio::test]
    async fn test_duplicate_node_id_fails() {
        let mut def = log_def("dup");
        def.nodes.push(node("a", "log"));

        let err = build(&def).unwrap_err();
        assert!(matches!(err, ChainError::DuplicateNode { node, .. } if node == "a"));
    }

    #[tokio::test]
    async fn test_bad_node_config_fails_compilation() {
        let mut def = log_def("bad_config");
        let mut cfg = serde_json::Map::new();
        cfg.insert("script".into(), json!("let x ="));
        def.nodes.push(NodeDefinition {
            id: "broken".to_string(),
            kind: "script_filter".to_string(),
            config: cfg,
            root: false,
        });
        def.connections.push(conn("b", "broken", "Success"));

        let err = build(&def).unwrap_err();
        assert!(matches!(err, ChainError::NodeInit { node, .. } if node == "broken"));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let chain = build(&log_def("teardown")).unwrap();
        chain.destroy();
        assert!(chain.is_destroyed());
        chain.destroy(); // second call is a no-op
        assert!(chain.is_destroyed());
    }
}
