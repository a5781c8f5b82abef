use async_trait::async_trait;
use rhai::AST;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    components::script,
    config::EngineConfig,
    context::ExecutionContext,
    message::Message,
    node::{Node, NodeError, RawNodeConfig, decode_config},
};

/// A rhai transform over the message, routed along `Success`/`Failure`.
///
/// The script result becomes the new payload. Returning a map with any of
/// the keys `data`, `metadata` or `msg_type` instead updates those parts of
/// the message:
///
/// ```rhai
/// #{ data: data.temp, metadata: #{ unit: "celsius" } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScriptTransformConfig {
    pub script: String,
}

#[derive(Debug, Default)]
pub struct ScriptTransformNode {
    config: ScriptTransformConfig,
    ast: Option<AST>,
}

impl ScriptTransformNode {
    fn apply(&self, msg: &mut Message, result: Value) {
        match result {
            Value::String(s) => msg.set_data(s),
            Value::Object(map)
                if map.contains_key("data")
                    || map.contains_key("metadata")
                    || map.contains_key("msg_type") =>
            {
                if let Some(data) = map.get("data") {
                    match data {
                        Value::String(s) => msg.set_data(s.clone()),
                        other => msg.set_data(other.to_string()),
                    }
                }
                if let Some(Value::Object(meta)) = map.get("metadata") {
                    for (key, value) in meta {
                        match value {
                            Value::String(s) => msg.set(key.clone(), s.clone()),
                            other => msg.set(key.clone(), other.to_string()),
                        }
                    }
                }
                if let Some(Value::String(msg_type)) = map.get("msg_type") {
                    msg.set_msg_type(msg_type.clone());
                }
            }
            other => msg.set_data(other.to_string()),
        }
    }
}

#[async_trait]
impl Node for ScriptTransformNode {
    fn type_name(&self) -> &str {
        "script_transform"
    }

    fn create(&self) -> Box<dyn Node> {
        Box::new(ScriptTransformNode::default())
    }

    fn init(&mut self, _config: &EngineConfig, raw: &RawNodeConfig) -> Result<(), NodeError> {
        self.config = decode_config(raw)?;
        self.ast = Some(script::compile(&self.config.script)?);
        Ok(())
    }

    async fn on_msg(&self, ctx: ExecutionContext, mut msg: Message) -> Result<(), NodeError> {
        let Some(ast) = self.ast.as_ref() else {
            return Err(NodeError::ExecutionFailed("transform not initialized".to_string()));
        };
        match script::eval(ast, &msg, ctx.config().script_max_duration()) {
            Ok(result) => match rhai::serde::from_dynamic::<Value>(&result) {
                Ok(value) => {
                    self.apply(&mut msg, value);
                    ctx.tell_success(msg);
                }
                Err(err) => ctx.tell_failure(
                    msg,
                    NodeError::ExecutionFailed(format!("transform result not convertible: {err}")),
                ),
            },
            Err(err) => ctx.tell_failure(msg, err),
        }
        Ok(())
    }
}
