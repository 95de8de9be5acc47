//! Bidirectional relay between visitor sessions and the operator channel.

mod core;
mod correlations;

pub use self::core::RelayCore;
pub use correlations::CorrelationStore;
