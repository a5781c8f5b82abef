use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    config::EngineConfig,
    context::ExecutionContext,
    logger::LogLevel,
    message::Message,
    node::{Node, NodeError, RawNodeConfig, decode_config},
};

/// Renders a template over the message and writes it to the configured
/// logger, then routes along `Success`.
///
/// Placeholders: `${id}`, `${type}`, `${data}` and `${metadata.<key>}`.
/// Unknown placeholders are left unchanged.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogNodeConfig {
    pub template: String,
}

impl Default for LogNodeConfig {
    fn default() -> Self {
        Self {
            template: "${type}: ${data}".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct LogNode {
    config: LogNodeConfig,
}

fn render(template: &str, msg: &Message) -> String {
    let mut out = template
        .replace("${id}", msg.id())
        .replace("${type}", msg.msg_type())
        .replace("${data}", msg.data());
    for (key, value) in msg.metadata() {
        out = out.replace(&format!("${{metadata.{key}}}"), value);
    }
    out
}

#[async_trait]
impl Node for LogNode {
    fn type_name(&self) -> &str {
        "log"
    }

    fn create(&self) -> Box<dyn Node> {
        Box::new(LogNode::default())
    }

    fn init(&mut self, _config: &EngineConfig, raw: &RawNodeConfig) -> Result<(), NodeError> {
        self.config = decode_config(raw)?;
        Ok(())
    }

    async fn on_msg(&self, ctx: ExecutionContext, msg: Message) -> Result<(), NodeError> {
        let rendered = render(&self.config.template, &msg);
        ctx.config()
            .logger()
            .log(LogLevel::Info, ctx.chain().id(), &rendered);
        ctx.tell_success(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_builtin_placeholders() {
        let mut msg = Message::new("telemetry", "42");
        msg.set("source", "sensor-1");

        let out = render("${type} from ${metadata.source}: ${data}", &msg);
        assert_eq!(out, "telemetry from sensor-1: 42");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let msg = Message::new("t", "");
        let out = render("${metadata.missing}", &msg);
        assert_eq!(out, "${metadata.missing}");
    }

    #[test]
    fn test_init_defaults_template() {
        let mut node = LogNode::default();
        node.init(&EngineConfig::new(), &RawNodeConfig::new()).unwrap();
        assert_eq!(node.config.template, "${type}: ${data}");
    }

    #[test]
    fn test_init_accepts_custom_template() {
        let mut raw = RawNodeConfig::new();
        raw.insert("template".into(), json!("got ${data}"));

        let mut node = LogNode::default();
        node.init(&EngineConfig::new(), &raw).unwrap();
        assert_eq!(node.config.template, "got ${data}");
    }
}
