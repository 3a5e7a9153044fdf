//! Presence
//!
//! [`PresenceRegistry`] is the ephemeral "who is connected and how" map;
//! [`PresenceService`] ties it to the social graph so that friends, and
//! only friends, hear about changes.

mod registry;
mod service;

pub use registry::{Departure, PresenceRegistry};
pub use service::PresenceService;
