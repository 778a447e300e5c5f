//! Post-commit domain events and the bus that distributes them.
//!
//! Events are published only after the transaction that produced them has
//! committed. Consumers (such as the PDF snapshot worker) run independently
//! and may fail without affecting the publisher.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
