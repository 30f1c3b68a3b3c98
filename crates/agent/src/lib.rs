//! `taskrunner-agent` library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod config;
pub mod dispatch;
pub mod heartbeat;
pub mod host;
pub mod process;
pub mod registration;
pub mod shutdown;
pub mod synchronizer;
pub mod vcs;
pub mod worker;
