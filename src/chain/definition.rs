//! The declarative shape a chain is compiled from. The on-wire schema is
//! owned by the parser collaborator; this is the already-parsed form.

use serde::{Deserialize, Serialize};

use crate::{chain::ChainError, node::RawNodeConfig};

/// An immutable, already-parsed description of a chain: its nodes, their
/// configuration bags, and the relation-labeled edges between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDefinition {
    pub id: String,
    /// Whether this chain is a root chain (directly addressable by ingress)
    /// or only ever invoked as a sub-chain.
    #[serde(default)]
    pub root: bool,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    /// Registry type name.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: RawNodeConfig,
    /// Marks this node as the chain entry point. With no flags set anywhere,
    /// the unique node without incoming connections is the root.
    #[serde(default)]
    pub root: bool,
}

/// A relation-labeled edge. Several connections sharing (from, relation)
/// form a fan-out: all targets fire concurrently and independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
    pub relation: String,
}

/// Produces chain definitions from raw bytes. The engine only consumes the
/// parsed form; swap the parser to support another wire format.
pub trait ChainParser: Send + Sync {
    fn parse(&self, input: &[u8]) -> Result<ChainDefinition, ChainError>;
}

/// Default parser: the definition as a JSON document.
#[derive(Debug, Clone, Default)]
pub struct JsonParser;

impl ChainParser for JsonParser {
    fn parse(&self, input: &[u8]) -> Result<ChainDefinition, ChainError> {
        serde_json::from_slice(input).map_err(|e| ChainError::Parse(e.to_string()))
    }
}
