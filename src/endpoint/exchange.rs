use std::collections::HashMap;

use crate::message::Message;

/// Uniform view over an inbound transport event: the engine-facing message
/// plus the transport headers, without leaking transport details downstream.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    topic: String,
    headers: HashMap<String, String>,
    msg: Message,
}

impl InboundMessage {
    pub fn new(
        topic: impl Into<String>,
        headers: HashMap<String, String>,
        body: impl Into<String>,
    ) -> Self {
        let topic = topic.into();
        let mut msg = Message::new("ingress", body);
        msg.set("topic", topic.clone());
        Self { topic, headers, msg }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn msg(&self) -> &Message {
        &self.msg
    }

    /// Router steps may enrich the message before it reaches a chain.
    pub fn msg_mut(&mut self) -> &mut Message {
        &mut self.msg
    }
}

/// The reply half of an exchange, filled in by router steps or by the
/// invoked chain's completion. Status follows HTTP conventions but is only
/// ever interpreted by the transport.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    status: u16,
    headers: HashMap<String, String>,
    body: String,
}

impl OutboundMessage {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }
}

/// Paired inbound/outbound message at a protocol boundary.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub in_msg: InboundMessage,
    pub out_msg: OutboundMessage,
}

impl Exchange {
    pub fn new(in_msg: InboundMessage) -> Self {
        Self {
            in_msg,
            out_msg: OutboundMessage::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_carries_topic_as_metadata() {
        let inbound = InboundMessage::new("sensors/1/temp", HashMap::new(), "21");
        assert_eq!(inbound.topic(), "sensors/1/temp");
        assert_eq!(inbound.msg().get("topic"), Some(&"sensors/1/temp".to_string()));
        assert_eq!(inbound.msg().data(), "21");
    }

    #[test]
    fn test_outbound_defaults() {
        let exchange = Exchange::new(InboundMessage::new("t", HashMap::new(), ""));
        assert_eq!(exchange.out_msg.status(), 0);
        assert_eq!(exchange.out_msg.body(), "");
    }

    #[test]
    fn test_outbound_headers() {
        let mut out = OutboundMessage::default();
        out.set_header("content-type", "application/json");
        assert_eq!(out.header("content-type"), Some(&"application/json".to_string()));
        assert_eq!(out.header("missing"), None);
    }
}
