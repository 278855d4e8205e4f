//! Domain types for the supervision core.
//!
//! Pure data and state machines: nothing here spawns, sleeps or touches
//! the network.

mod config_mutation;
mod coordinator;
mod process;
mod protocol;
mod retry;
mod service;

pub use config_mutation::{ConfigMutation, MutationError, content_hash, read_operation_id};
pub use coordinator::{ApplyOutcome, CoordinatorState};
pub use process::{ProcessInfo, ProcessState};
pub use protocol::{
    ConnectionState, Decoded, InboundMessage, MalformedMessage, OutboundMessage, PromptId,
    StatusUpdate,
};
pub use retry::{Backoff, RetryDecision, RetryPolicy, RetryState};
pub use service::{ServiceConfig, ServiceReport, ServiceStatus, script_working_dir};
