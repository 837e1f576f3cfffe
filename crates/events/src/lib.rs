//! Event contracts and in-process fan-out.
//!
//! - `Event`: metadata every persisted domain event exposes
//! - `EventEnvelope`: stream metadata wrapped around a payload
//! - `EventBus`: publish/subscribe used to hand committed events and audit
//!   records to out-of-process consumers (notification delivery etc.)

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
