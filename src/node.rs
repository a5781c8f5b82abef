use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{config::EngineConfig, context::ExecutionContext, message::Message};

/// The untyped attribute bag a node receives at init time. Nodes decode it
/// into their own typed config record with [`decode_config`].
pub type RawNodeConfig = serde_json::Map<String, Value>;

/// Decode an untyped config bag into a typed record, with serde defaulting
/// for omitted fields.
pub fn decode_config<T: DeserializeOwned>(raw: &RawNodeConfig) -> Result<T, NodeError> {
    serde_json::from_value(Value::Object(raw.clone()))
        .map_err(|e| NodeError::InvalidConfig(e.to_string()))
}

/// The lifecycle contract every node variant implements.
///
/// A node lives as long as the compiled chain that created it: `init` runs
/// once at compile time, `on_msg` once per message reaching the node, and
/// `destroy` once at chain teardown. `on_msg` must call exactly one of the
/// context continuation primitives before returning, or return an error to
/// signal that it could not even attempt delivery.
#[async_trait]
pub trait Node: Send + Sync {
    /// Stable type name, used as the registry key.
    fn type_name(&self) -> &str;

    /// Produce a fresh, zero-initialized instance. The registry keeps one
    /// prototype per type and clones new instances from it.
    fn create(&self) -> Box<dyn Node>;

    /// Decode configuration and allocate long-lived resources. Fails fast on
    /// malformed input; a failing node fails the whole chain compilation.
    fn init(&mut self, config: &EngineConfig, raw: &RawNodeConfig) -> Result<(), NodeError>;

    /// Process one message. Invoked asynchronously on the worker pool.
    async fn on_msg(&self, ctx: ExecutionContext, msg: Message) -> Result<(), NodeError>;

    /// Release resources. Called exactly once, at chain teardown; in-flight
    /// invocations may still observe the node afterwards and must surface
    /// that as a normal node error.
    fn destroy(&self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeError {
    InvalidConfig(String),
    ExecutionFailed(String),
    Timeout(String),
    ChainNotFound(String),
    Destroyed,
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            NodeError::ExecutionFailed(msg) => write!(f, "Processing error: {}", msg),
            NodeError::Timeout(msg) => write!(f, "Execution deadline exceeded: {}", msg),
            NodeError::ChainNotFound(id) => write!(f, "Chain not found: {}", id),
            NodeError::Destroyed => write!(f, "Node already destroyed"),
        }
    }
}

impl std::error::Error for NodeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct DemoConfig {
        script: String,
        limit: usize,
    }

    impl Default for DemoConfig {
        fn default() -> Self {
            Self {
                script: "true".to_string(),
                limit: 10,
            }
        }
    }

    #[test]
    fn test_decode_config_with_defaults() {
        let mut raw = RawNodeConfig::new();
        raw.insert("script".into(), json!("1 + 1"));

        let cfg: DemoConfig = decode_config(&raw).unwrap();
        assert_eq!(cfg.script, "1 + 1");
        assert_eq!(cfg.limit, 10);
    }

    #[test]
    fn test_decode_config_rejects_bad_types() {
        let mut raw = RawNodeConfig::new();
        raw.insert("limit".into(), json!("not a number"));

        let err = decode_config::<DemoConfig>(&raw).unwrap_err();
        assert!(matches!(err, NodeError::InvalidConfig(_)));
    }

    #[test]
    fn test_node_error_display() {
        let err = NodeError::InvalidConfig("bad".to_string());
        assert_eq!(format!("{}", err), "Invalid configuration: bad");
    }
}
