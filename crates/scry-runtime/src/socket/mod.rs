//! Inference socket client.

mod client;
mod tracker;

pub use client::SocketClient;
pub use tracker::{PromptPhase, PromptTracker};
