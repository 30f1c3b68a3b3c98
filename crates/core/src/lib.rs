//! Task runner domain types.
//!
//! Pure state machines, schedules and source descriptors shared by the
//! worker agent. Nothing in this crate performs I/O.

pub mod error;
pub mod heartbeat;
pub mod registration;
pub mod roles;
pub mod sources;
pub mod sync;
pub mod types;

pub use error::CoreError;
