//! Session stream protocol: type + payload + envelope.
//!
//! This crate defines the wire shape of a single session event and envelope injection.
//! It does not depend on vellum. Vellum emits [`ProtocolEvent`] values from its session
//! and coordinator; a server or CLI serializes them with [`to_json`].

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::{PendingAction, ProtocolEvent};
