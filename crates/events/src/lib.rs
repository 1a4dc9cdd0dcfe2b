//! Domain events and their in-process distribution.
//!
//! Campaign lifecycle events are wrapped in organizer-scoped envelopes and
//! fanned out over an [`EventBus`]; the delivery worker pool is the main
//! subscriber.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
