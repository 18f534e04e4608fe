//! Per-connection session lifecycle and the process-wide lookup registry.

pub mod machine;
pub mod registry;

pub use machine::{SessionMachine, SessionState};
pub use registry::{SessionRegistry, SessionSnapshot};
