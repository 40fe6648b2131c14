//! Cross-node invalidation bus.
//!
//! Every mutation of shared cache state publishes an [`InvalidationEvent`]
//! after the local mutation succeeds. Subscribers apply events only to their
//! own local tier and never republish, which rules out propagation loops.
//! Cross-node ordering is not guaranteed; conflicting concurrent events
//! converge by last-timestamp-wins and application is idempotent.

pub mod event;
pub mod transport;

pub use event::{EventType, InvalidationEvent};
pub use transport::{
    BroadcastTransport, DEFAULT_TRANSPORT_CAPACITY, EventTransport, TransportError,
};
