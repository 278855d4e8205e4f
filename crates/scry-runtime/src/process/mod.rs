//! Process supervision.
//!
//! # Structure
//!
//! - `ProcessSpec` - What to spawn and how to judge it ready
//! - `ManagedProcess` - Lifecycle state machine with bounded auto-restart
//! - `EventBroadcaster` - Fan-out of supervision and chat events
//! - `ServerLogBuffer` - Recent child output per source
//! - Stream readers, port pre-flight and graceful shutdown helpers

mod broadcaster;
mod logs;
mod managed;
mod ports;
pub mod shutdown;
mod spec;
mod stream;

pub use broadcaster::{EventBroadcaster, next_event};
pub use logs::{ServerLogBuffer, ServerLogEntry};
pub use managed::ManagedProcess;
pub use ports::is_port_available;
pub use shutdown::shutdown_child;
pub use spec::ProcessSpec;
