use async_trait::async_trait;
use rhai::AST;
use serde::Deserialize;

use crate::{
    chain::relation,
    components::script,
    config::EngineConfig,
    context::ExecutionContext,
    message::Message,
    node::{Node, NodeError, RawNodeConfig, decode_config},
};

/// A rhai predicate over the message. The script must return a boolean;
/// `true` routes along `True`, `false` along `False`. A script error or an
/// exceeded deadline routes along `Failure`.
///
/// ```rhai
/// data.temp > 20 && metadata.source == "sensor-1"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScriptFilterConfig {
    pub script: String,
}

#[derive(Debug, Default)]
pub struct ScriptFilterNode {
    config: ScriptFilterConfig,
    ast: Option<AST>,
}

#[async_trait]
impl Node for ScriptFilterNode {
    fn type_name(&self) -> &str {
        "script_filter"
    }

    fn create(&self) -> Box<dyn Node> {
        Box::new(ScriptFilterNode::default())
    }

    fn init(&mut self, _config: &EngineConfig, raw: &RawNodeConfig) -> Result<(), NodeError> {
        self.config = decode_config(raw)?;
        self.ast = Some(script::compile(&self.config.script)?);
        Ok(())
    }

    async fn on_msg(&self, ctx: ExecutionContext, msg: Message) -> Result<(), NodeError> {
        let Some(ast) = self.ast.as_ref() else {
            return Err(NodeError::ExecutionFailed("filter not initialized".to_string()));
        };
        match script::eval(ast, &msg, ctx.config().script_max_duration()) {
            Ok(result) => match result.as_bool() {
                Ok(true) => ctx.tell_next(msg, relation::TRUE),
                Ok(false) => ctx.tell_next(msg, relation::FALSE),
                Err(actual) => ctx.tell_failure(
                    msg,
                    NodeError::ExecutionFailed(format!(
                        "filter script must return a boolean, got {actual}"
                    )),
                ),
            },
            Err(err) => ctx.tell_failure(msg, err),
        }
        Ok(())
    }
}
