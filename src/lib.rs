//! rulekit — a rule-chain execution engine.
//!
//! Messages travel through a compiled DAG of pluggable nodes. Edges are
//! resolved by relation label (`Success`, `Failure`, `True`, `False`, ...),
//! every node invocation runs as an independent task on a shared worker
//! pool, and each terminal leaf reports through the end-of-message callback.
//! The endpoint layer adapts transport events into chain invocations via
//! declarative routers and a global interceptor chain.
//!
//! ```no_run
//! use rulekit::{config::EngineConfig, engine::Engine, message::Message};
//! use serde_json::json;
//!
//! let config = EngineConfig::new().with_on_end(|msg, err| {
//!     println!("done: {} ({:?})", msg.data(), err);
//! });
//! let engine = Engine::new(config);
//!
//! let def = json!({
//!     "id": "telemetry",
//!     "root": true,
//!     "nodes": [
//!         {"id": "hot", "type": "script_filter", "config": {"script": "data.temp > 20"}},
//!         {"id": "note", "type": "log", "config": {"template": "hot reading: ${data}"}}
//!     ],
//!     "connections": [
//!         {"from": "hot", "to": "note", "relation": "True"}
//!     ]
//! });
//! engine.load(def.to_string().as_bytes()).unwrap();
//! engine.process("telemetry", Message::new("telemetry", r#"{"temp": 21}"#)).unwrap();
//! ```

pub mod chain;
pub mod components;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod engine;
pub mod logger;
pub mod message;
pub mod node;
pub mod pool;
pub mod registry;

pub use chain::{ChainDefinition, ChainError, CompiledChain, relation};
pub use config::{DebugStage, EngineConfig};
pub use context::{ExecutionContext, SharedStore};
pub use engine::Engine;
pub use message::Message;
pub use node::{Node, NodeError, RawNodeConfig};
pub use pool::WorkerPool;
pub use registry::Registry;
