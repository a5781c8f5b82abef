use std::sync::Arc;

use crate::endpoint::exchange::Exchange;

/// A transform/filter step: may mutate the exchange, returns whether to
/// continue down the pipeline.
pub type RouterStep = dyn Fn(&Router, &mut Exchange) -> bool + Send + Sync;

#[derive(Clone)]
pub enum Destination {
    /// Invoke the named compiled chain.
    Chain(String),
    /// Continue through another router's steps.
    Router(Arc<Router>),
}

/// An immutable match-transform-destination pipeline, built once via
/// [`Router::from`]:
///
/// ```
/// use rulekit::endpoint::Router;
///
/// let router = Router::from("sensors/#")
///     .process(|_router, exchange| {
///         exchange.in_msg.msg_mut().set("ingress", "mqtt");
///         true
///     })
///     .to("chain:telemetry")
///     .end();
/// assert!(router.matches("sensors/1/temp"));
/// ```
pub struct Router {
    pattern: String,
    steps: Vec<Arc<RouterStep>>,
    destination: Option<Destination>,
}

impl Router {
    pub fn from(pattern: impl Into<String>) -> RouterBuilder {
        RouterBuilder {
            pattern: pattern.into(),
            steps: Vec::new(),
            destination: None,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, topic: &str) -> bool {
        topic_matches(&self.pattern, topic)
    }

    /// Run the steps in order; false from a step stops the pipeline.
    pub(crate) fn run_steps(&self, exchange: &mut Exchange) -> bool {
        self.steps.iter().all(|step| step(self, exchange))
    }

    pub(crate) fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("pattern", &self.pattern)
            .field("steps", &self.steps.len())
            .finish()
    }
}

pub struct RouterBuilder {
    pattern: String,
    steps: Vec<Arc<RouterStep>>,
    destination: Option<Destination>,
}

impl RouterBuilder {
    /// Append a transform/filter step.
    pub fn process<F>(mut self, step: F) -> Self
    where
        F: Fn(&Router, &mut Exchange) -> bool + Send + Sync + 'static,
    {
        self.steps.push(Arc::new(step));
        self
    }

    /// Set the destination. `chain:<id>` (or a bare id) names a compiled
    /// chain to invoke.
    pub fn to(mut self, destination: &str) -> Self {
        let chain_id = destination.strip_prefix("chain:").unwrap_or(destination);
        self.destination = Some(Destination::Chain(chain_id.to_string()));
        self
    }

    /// Chain into another router instead of a chain.
    pub fn to_router(mut self, router: Arc<Router>) -> Self {
        self.destination = Some(Destination::Router(router));
        self
    }

    /// Finish the pipeline.
    pub fn end(self) -> Arc<Router> {
        Arc::new(Router {
            pattern: self.pattern,
            steps: self.steps,
            destination: self.destination,
        })
    }
}

/// MQTT-style topic matching: `/`-separated segments, `+` matches a single
/// segment, a trailing `#` matches any remainder.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern = pattern.split('/');
    let mut topic = topic.split('/');
    loop {
        match (pattern.next(), topic.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(expected), Some(actual)) if expected == actual => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::exchange::InboundMessage;
    use std::collections::HashMap;

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches("#", "anything/at/all"));
        assert!(topic_matches("sensors/#", "sensors/1/temp"));
        assert!(topic_matches("sensors/#", "sensors"));
        assert!(topic_matches("sensors/+/temp", "sensors/1/temp"));
        assert!(topic_matches("sensors/1/temp", "sensors/1/temp"));

        assert!(!topic_matches("sensors/+/temp", "sensors/1/humidity"));
        assert!(!topic_matches("sensors/1", "sensors/1/temp"));
        assert!(!topic_matches("sensors/1/temp", "sensors/1"));
    }

    #[test]
    fn test_builder_produces_immutable_router() {
        let router = Router::from("events/#")
            .process(|_r, _ex| true)
            .to("chain:audit")
            .end();

        assert_eq!(router.pattern(), "events/#");
        assert!(matches!(
            router.destination(),
            Some(Destination::Chain(id)) if id == "audit"
        ));
    }

    #[test]
    fn test_to_accepts_bare_chain_id() {
        let router = Router::from("#").to("audit").end();
        assert!(matches!(
            router.destination(),
            Some(Destination::Chain(id)) if id == "audit"
        ));
    }

    #[test]
    fn test_steps_short_circuit() {
        let router = Router::from("#")
            .process(|_r, ex| {
                ex.in_msg.msg_mut().set("first", "ran");
                true
            })
            .process(|_r, _ex| false)
            .process(|_r, ex| {
                ex.in_msg.msg_mut().set("third", "ran");
                true
            })
            .end();

        let mut exchange = Exchange::new(InboundMessage::new("t", HashMap::new(), ""));
        assert!(!router.run_steps(&mut exchange));
        assert_eq!(exchange.in_msg.msg().get("first"), Some(&"ran".to_string()));
        assert_eq!(exchange.in_msg.msg().get("third"), None);
    }
}
