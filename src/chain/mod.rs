pub mod compiled;
pub mod definition;

pub use compiled::CompiledChain;
pub use definition::{ChainDefinition, ChainParser, Connection, JsonParser, NodeDefinition};

use thiserror::Error;

use crate::node::NodeError;

/// The conventional relation labels. Relations are free-form strings; these
/// are the ones the built-in components route along.
pub mod relation {
    pub const SUCCESS: &str = "Success";
    pub const FAILURE: &str = "Failure";
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("node type `{0}` is already registered")]
    DuplicateType(String),

    #[error("unknown node type `{0}`")]
    UnknownType(String),

    #[error("chain `{chain}` declares node id `{node}` more than once")]
    DuplicateNode { chain: String, node: String },

    #[error("chain `{chain}` connects unknown node id `{node}`")]
    UnknownNode { chain: String, node: String },

    #[error("chain `{0}` declares more than one root node")]
    MultipleRoots(String),

    #[error("chain `{0}` has no resolvable root node")]
    NoRoot(String),

    #[error("chain `{0}` contains a relation cycle")]
    Cyclic(String),

    #[error("node `{node}` in chain `{chain}` failed to initialize: {source}")]
    NodeInit {
        chain: String,
        node: String,
        source: NodeError,
    },

    #[error("chain `{0}` not found")]
    NotFound(String),

    #[error("invalid chain definition: {0}")]
    Parse(String),
}
