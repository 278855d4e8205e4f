//! Runtime side of the Scry supervision core.
//!
//! Everything here touches a process, a socket, the file system or HTTP:
//! the process supervisor, the inference socket client, the service
//! registry and the configuration-change coordinator. Domain types and the
//! port traits live in `scry-core`.
#![deny(unsafe_code)]

pub mod coordinator;
pub mod health;
pub mod health_monitor;
pub mod process;
pub mod registry;
pub mod socket;

// Re-export the main components
pub use coordinator::{
    ApplyReport, BarrierError, BarrierReport, ConfigCoordinator, CoordinatorConfig, HttpLedger,
    ReadinessBarrier,
};
pub use process::{
    EventBroadcaster, ManagedProcess, ProcessSpec, ServerLogBuffer, ServerLogEntry, next_event,
};
pub use registry::{ServiceHandle, ServiceRegistry};
pub use socket::{PromptPhase, PromptTracker, SocketClient};

// Re-export probe primitives
pub use health::{HttpProbe, TcpProbe, poll_until_ready};
pub use health_monitor::HealthMonitor;
