//! Protocol-agnostic ingress: routers match and transform inbound events,
//! endpoints bind routers plus a global interceptor chain and hand matched
//! events to the engine. Concrete transport listeners live outside the
//! engine; [`endpoint::Endpoint::serve`](Endpoint::serve) adapts any
//! channel-shaped transport.

pub mod endpoint;
pub mod exchange;
pub mod router;

pub use endpoint::{Endpoint, Interceptor};
pub use exchange::{Exchange, InboundMessage, OutboundMessage};
pub use router::{Destination, Router, RouterBuilder, RouterStep};
