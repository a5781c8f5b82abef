//! Built-in node components.

pub mod log_node;
pub mod script_filter;
pub mod script_transform;
pub mod sub_chain;

pub use log_node::LogNode;
pub use script_filter::ScriptFilterNode;
pub use script_transform::ScriptTransformNode;
pub use sub_chain::SubChainNode;

use crate::node::Node;

/// Prototypes for the default registry.
pub(crate) fn builtin_prototypes() -> Vec<Box<dyn Node>> {
    vec![
        Box::new(ScriptFilterNode::default()),
        Box::new(ScriptTransformNode::default()),
        Box::new(LogNode::default()),
        Box::new(SubChainNode::default()),
    ]
}

/// Shared rhai plumbing for the script nodes.
pub(crate) mod script {
    use std::time::{Duration, Instant};

    use rhai::{AST, Dynamic, Engine, EvalAltResult, Scope};
    use serde_json::{Value, json};

    use crate::{message::Message, node::NodeError};

    /// Compile a script once, at node init time, so malformed scripts fail
    /// the chain compilation instead of the first message.
    pub fn compile(script: &str) -> Result<AST, NodeError> {
        if script.trim().is_empty() {
            return Err(NodeError::InvalidConfig("script must not be empty".to_string()));
        }
        Engine::new()
            .compile(script)
            .map_err(|e| NodeError::InvalidConfig(format!("script does not compile: {e}")))
    }

    /// Evaluate a compiled script against a message, enforcing the engine's
    /// script deadline. Overrunning the deadline is a node-local failure,
    /// never a process-level abort.
    pub fn eval(ast: &AST, msg: &Message, max: Duration) -> Result<Dynamic, NodeError> {
        let mut engine = Engine::new();
        let deadline = Instant::now() + max;
        engine.on_progress(move |_| {
            if Instant::now() >= deadline {
                Some("deadline exceeded".into())
            } else {
                None
            }
        });

        let mut scope = Scope::new();
        push_message(&mut scope, msg);

        match engine.eval_ast_with_scope::<Dynamic>(&mut scope, ast) {
            Ok(result) => Ok(result),
            Err(err) => match *err {
                EvalAltResult::ErrorTerminated(..) => Err(NodeError::Timeout(format!(
                    "script ran longer than {}ms",
                    max.as_millis()
                ))),
                other => Err(NodeError::ExecutionFailed(format!("script error: {other}"))),
            },
        }
    }

    /// Scripts see `msg` (id/type/data/metadata), `data` (the payload,
    /// JSON-parsed when possible) and `metadata`.
    fn push_message(scope: &mut Scope, msg: &Message) {
        let data: Value = match serde_json::from_str(msg.data()) {
            Ok(parsed) => parsed,
            Err(_) => Value::String(msg.data().to_string()),
        };
        let as_json = json!({
            "id": msg.id(),
            "type": msg.msg_type(),
            "data": data,
            "metadata": msg.metadata(),
        });

        if let Ok(dynamic) = rhai::serde::to_dynamic(&as_json) {
            scope.push_dynamic("msg", dynamic);
        }
        if let Ok(dynamic) = rhai::serde::to_dynamic(&data) {
            scope.push_dynamic("data", dynamic);
        }
        if let Ok(dynamic) = rhai::serde::to_dynamic(msg.metadata()) {
            scope.push_dynamic("metadata", dynamic);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_compile_rejects_empty_and_broken_scripts() {
            assert!(matches!(compile("  "), Err(NodeError::InvalidConfig(_))));
            assert!(matches!(compile("let x ="), Err(NodeError::InvalidConfig(_))));
        }

        #[test]
        fn test_eval_sees_payload_fields() {
            let ast = compile("data.temp > 20").unwrap();
            let msg = Message::new("telemetry", r#"{"temp": 21}"#);

            let result = eval(&ast, &msg, Duration::from_millis(2000)).unwrap();
            assert_eq!(result.as_bool(), Ok(true));
        }

        #[test]
        fn test_eval_sees_metadata() {
            let ast = compile(r#"metadata.source == "sensor-1""#).unwrap();
            let mut msg = Message::new("telemetry", "{}");
            msg.set("source", "sensor-1");

            let result = eval(&ast, &msg, Duration::from_millis(2000)).unwrap();
            assert_eq!(result.as_bool(), Ok(true));
        }

        #[test]
        fn test_eval_deadline_is_enforced() {
            let ast = compile("let n = 0; while true { n += 1; } n").unwrap();
            let msg = Message::new("t", "{}");

            let err = eval(&ast, &msg, Duration::from_millis(30)).unwrap_err();
            assert!(matches!(err, NodeError::Timeout(_)));
        }

        #[test]
        fn test_eval_runtime_error_is_execution_failure() {
            let ast = compile("this_function_does_not_exist()").unwrap();
            let msg = Message::new("t", "{}");

            let err = eval(&ast, &msg, Duration::from_millis(2000)).unwrap_err();
            assert!(matches!(err, NodeError::ExecutionFailed(_)));
        }
    }
}
