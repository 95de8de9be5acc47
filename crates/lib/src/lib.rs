//! wabridge core library — channel connector, relay, and gateway shared by
//! the CLI binary and the integration tests.

pub mod channel;
pub mod config;
pub mod gateway;
pub mod relay;
