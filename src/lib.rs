//! A single-process analytics event relay.
//!
//! Accepts flat, fixed-field events over HTTP, reshapes each into a nested
//! canonical record and forwards it to one downstream collector.
//!
//! ## Guarantees
//! - Acceptance latency is independent of delivery latency
//! - Bounded resource usage: fixed worker pool, bounded queue
//! - Explicit backpressure (503 when the queue is full)
//! - Every failed delivery is logged and dead-lettered
//!
//! ## Non-Guarantees
//! - Durability across restarts
//! - Ordering between events
//! - Delivery confirmation to the original caller
//!
//! This crate is intentionally **not a message broker**: one request
//! produces at most one downstream delivery.

mod config;
mod dead_letter;
mod delivery;
mod dispatcher;
mod error;
mod server;
mod transform;
mod types;
mod worker;

pub use config::{RelayConfig, DEFAULT_MAX_BODY_BYTES};
pub use dead_letter::{DeadLetterSink, InMemoryDeadLetters};
pub use delivery::DeliveryClient;
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{ConfigError, DeliveryError, DispatchError, IngressError, ServerError};
pub use server::{router, run, serve, AppState, ACK_BODY};
pub use transform::transform;
pub use types::{CanonicalEvent, Collector, DeadLetter, InboundEvent, TypedValue};
pub use worker::RetryPolicy;
