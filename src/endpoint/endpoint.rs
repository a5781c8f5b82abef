use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    endpoint::{
        exchange::{Exchange, InboundMessage},
        router::{Destination, Router},
    },
    engine::Engine,
    message::Message,
    node::NodeError,
};

/// A global pre-routing predicate; returning false discards the event.
pub type Interceptor = dyn Fn(&mut Exchange) -> bool + Send + Sync;

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Binds routers and a global interceptor chain to a transport. The
/// transport itself stays outside: it feeds [`Endpoint::dispatch`] directly
/// or pushes events through [`Endpoint::serve`].
///
/// Per inbound event: interceptors run in registration order (first `false`
/// discards the event), the first router whose pattern matches runs its
/// steps (first `false` stops), and the destination chain's completion is
/// routed into the outbound message. Transport-level problems surface
/// through the outbound status, never as process faults.
pub struct Endpoint {
    engine: Arc<Engine>,
    routers: Vec<Arc<Router>>,
    interceptors: Vec<Arc<Interceptor>>,
    reply_timeout: Duration,
}

impl Endpoint {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            routers: Vec::new(),
            interceptors: Vec::new(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    /// How long to wait for the first terminal leaf of an invoked chain
    /// before answering with a gateway-timeout status.
    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    pub fn add_interceptor<F>(&mut self, interceptor: F) -> &mut Self
    where
        F: Fn(&mut Exchange) -> bool + Send + Sync + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn add_router(&mut self, router: Arc<Router>) -> &mut Self {
        self.routers.push(router);
        self
    }

    /// Handle one inbound event. Returns the completed exchange, or `None`
    /// when an interceptor discarded the event, no router matched, or a
    /// router step stopped the pipeline.
    pub async fn dispatch(&self, inbound: InboundMessage) -> Option<Exchange> {
        let mut exchange = Exchange::new(inbound);

        for interceptor in &self.interceptors {
            if !interceptor(&mut exchange) {
                debug!(topic = %exchange.in_msg.topic(), "interceptor discarded event");
                return None;
            }
        }

        let router = self
            .routers
            .iter()
            .find(|router| router.matches(exchange.in_msg.topic()))?;
        if !router.run_steps(&mut exchange) {
            debug!(topic = %exchange.in_msg.topic(), "router step stopped event");
            return None;
        }

        // follow nested routers until a chain destination (or none) is found
        let mut current = router.clone();
        let chain_id = loop {
            match current.destination() {
                Some(Destination::Chain(id)) => break id.clone(),
                Some(Destination::Router(next)) => {
                    let next = next.clone();
                    if !next.run_steps(&mut exchange) {
                        return None;
                    }
                    current = next;
                }
                // a router without a destination is a pure transform pipeline
                None => return Some(exchange),
            }
        };

        self.invoke_chain(&chain_id, &mut exchange).await;
        Some(exchange)
    }

    /// Invoke the destination chain and fill the outbound message from the
    /// first terminal leaf.
    async fn invoke_chain(&self, chain_id: &str, exchange: &mut Exchange) {
        let (tx, rx) = oneshot::channel::<(Message, Option<NodeError>)>();
        let tx = Mutex::new(Some(tx));
        let end = move |msg: &Message, err: Option<&NodeError>| {
            // several leaves may complete; the first one answers the exchange
            if let Some(tx) = tx.lock().ok().and_then(|mut slot| slot.take()) {
                let _ = tx.send((msg.clone(), err.cloned()));
            }
        };

        let msg = exchange.in_msg.msg().clone();
        if let Err(err) = self.engine.process_with_end(chain_id, msg, end) {
            warn!(chain = %chain_id, %err, "destination chain unavailable");
            exchange.out_msg.set_status(404);
            return;
        }

        match timeout(self.reply_timeout, rx).await {
            Ok(Ok((msg, err))) => {
                exchange.out_msg.set_body(msg.data());
                exchange.out_msg.set_status(if err.is_some() { 500 } else { 200 });
            }
            // no leaf reported in time (or every branch ended silently)
            _ => exchange.out_msg.set_status(504),
        }
    }

    /// Drive the endpoint from a channel-shaped transport: every received
    /// event is dispatched and completed exchanges are pushed to `replies`.
    pub async fn serve(
        &self,
        mut events: mpsc::Receiver<InboundMessage>,
        replies: mpsc::Sender<Exchange>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if let Some(exchange) = self.dispatch(event).await {
                        if replies.send(exchange).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("routers", &self.routers)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine_with_echo_chain() -> Arc<Engine> {
        let engine = Engine::new(EngineConfig::new());
        let def = json!({
            "id": "echo",
            "root": true,
            "nodes": [
                {"id": "shout", "type": "script_transform",
                 "config": {"script": r#"data + "!""#}}
            ]
        });
        engine.load(def.to_string().as_bytes()).unwrap();
        Arc::new(engine)
    }

    fn inbound(topic: &str, body: &str) -> InboundMessage {
        InboundMessage::new(topic, HashMap::new(), body)
    }

    #[tokio::test]
    async fn test_dispatch_invokes_destination_chain() {
        let mut endpoint = Endpoint::new(engine_with_echo_chain())
            .with_reply_timeout(Duration::from_secs(2));
        endpoint.add_router(Router::from("events/#").to("chain:echo").end());

        let exchange = endpoint.dispatch(inbound("events/a", r#""hi""#)).await.unwrap();
        assert_eq!(exchange.out_msg.status(), 200);
        assert_eq!(exchange.out_msg.body(), "hi!");
    }

    #[tokio::test]
    async fn test_interceptor_false_discards_before_any_step() {
        let steps_run = Arc::new(AtomicUsize::new(0));
        let mut endpoint = Endpoint::new(engine_with_echo_chain());
        endpoint.add_interceptor(|_ex| true);
        endpoint.add_interceptor(|_ex| false);
        endpoint.add_interceptor(|_ex| true);
        let counter = steps_run.clone();
        endpoint.add_router(
            Router::from("#")
                .process(move |_r, _ex| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    true
                })
                .to("chain:echo")
                .end(),
        );

        assert!(endpoint.dispatch(inbound("events/a", "")).await.is_none());
        assert_eq!(steps_run.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_matching_router() {
        let mut endpoint = Endpoint::new(engine_with_echo_chain());
        endpoint.add_router(Router::from("sensors/#").to("chain:echo").end());

        assert!(endpoint.dispatch(inbound("events/a", "")).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_destination_reports_through_status() {
        let mut endpoint = Endpoint::new(engine_with_echo_chain());
        endpoint.add_router(Router::from("#").to("chain:missing").end());

        let exchange = endpoint.dispatch(inbound("events/a", "")).await.unwrap();
        assert_eq!(exchange.out_msg.status(), 404);
    }

    #[tokio::test]
    async fn test_first_matching_router_wins() {
        let mut endpoint = Endpoint::new(engine_with_echo_chain())
            .with_reply_timeout(Duration::from_secs(2));
        endpoint.add_router(
            Router::from("events/special")
                .process(|_r, ex| {
                    ex.in_msg.msg_mut().set("route", "special");
                    true
                })
                .to("chain:echo")
                .end(),
        );
        endpoint.add_router(Router::from("events/#").to("chain:echo").end());

        let exchange = endpoint.dispatch(inbound("events/special", r#""x""#)).await.unwrap();
        assert_eq!(exchange.in_msg.msg().get("route"), Some(&"special".to_string()));
    }

    #[tokio::test]
    async fn test_serve_loop() {
        let mut endpoint = Endpoint::new(engine_with_echo_chain())
            .with_reply_timeout(Duration::from_secs(2));
        endpoint.add_router(Router::from("#").to("chain:echo").end());

        let (event_tx, event_rx) = mpsc::channel(4);
        let (reply_tx, mut reply_rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();

        let server = {
            let shutdown = shutdown.clone();
            async move { endpoint.serve(event_rx, reply_tx, shutdown).await }
        };
        let handle = tokio::spawn(server);

        event_tx.send(inbound("events/a", r#""ping""#)).await.unwrap();
        let exchange = reply_rx.recv().await.unwrap();
        assert_eq!(exchange.out_msg.body(), "ping!");

        shutdown.cancel();
        handle.await.unwrap();
    }
}
