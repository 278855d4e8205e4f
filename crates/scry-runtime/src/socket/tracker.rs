//! Bookkeeping for prompts that are in flight on the socket.
//!
//! The client hands out its own id from `send_prompt`. A server may answer
//! `started` under an id of its own; that id is then aliased to the oldest
//! pending client id, and every later event is reported under the client id
//! so callers can keep correlating with what `send_prompt` returned.

use std::collections::VecDeque;

use scry_core::{AppEvent, InboundMessage, PromptId, StatusUpdate};
use tracing::debug;

/// Finished ids remembered to drop late frames.
const FINISHED_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPhase {
    /// Sent, not yet acknowledged.
    Pending,
    /// Server has started generating.
    Streaming,
}

#[derive(Debug)]
struct Entry {
    id: PromptId,
    server_id: Option<PromptId>,
    phase: PromptPhase,
}

impl Entry {
    fn answers_to(&self, wire_id: &PromptId) -> bool {
        &self.id == wire_id || self.server_id.as_ref() == Some(wire_id)
    }
}

#[derive(Debug, Default)]
pub struct PromptTracker {
    prompts: Vec<Entry>,
    finished: VecDeque<PromptId>,
}

impl PromptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, id: PromptId) {
        self.prompts.push(Entry {
            id,
            server_id: None,
            phase: PromptPhase::Pending,
        });
    }

    /// Drop a prompt that never made it onto the wire.
    pub fn abandon(&mut self, id: &PromptId) {
        self.prompts.retain(|e| &e.id != id);
    }

    pub fn phase(&self, id: &PromptId) -> Option<PromptPhase> {
        self.find(id).map(|idx| self.prompts[idx].phase)
    }

    pub fn in_flight(&self) -> Vec<PromptId> {
        self.prompts.iter().map(|e| e.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Id to put on the wire for a client id.
    pub fn wire_id(&self, id: &PromptId) -> PromptId {
        self.find(id)
            .and_then(|idx| self.prompts[idx].server_id.clone())
            .unwrap_or_else(|| id.clone())
    }

    /// Forget everything (connection lost).
    pub fn clear(&mut self) {
        if !self.prompts.is_empty() {
            debug!(count = self.prompts.len(), "Dropping in-flight prompts");
        }
        self.prompts.clear();
        self.finished.clear();
    }

    /// Translate an inbound message into the event to publish, updating
    /// tracking. `None` means the frame is stale and must be dropped.
    pub fn route(&mut self, message: InboundMessage) -> Option<AppEvent> {
        match message {
            InboundMessage::Token { prompt_id, token } => {
                let prompt_id = self.streaming(prompt_id)?;
                Some(AppEvent::NewToken { prompt_id, token })
            }
            InboundMessage::Complete { prompt_id } => {
                let prompt_id = self.finish(prompt_id)?;
                Some(AppEvent::Complete { prompt_id })
            }
            InboundMessage::Error {
                prompt_id: Some(prompt_id),
                error,
            } => {
                let prompt_id = self.finish(prompt_id)?;
                Some(AppEvent::Error {
                    prompt_id: Some(prompt_id),
                    error,
                })
            }
            InboundMessage::Error {
                prompt_id: None,
                error,
            } => Some(AppEvent::Error {
                prompt_id: None,
                error,
            }),
            InboundMessage::Status(StatusUpdate::Started {
                prompt_id,
                session_id,
            }) => {
                let prompt_id = self.started(prompt_id)?;
                Some(AppEvent::Started {
                    prompt_id,
                    session_id,
                })
            }
            InboundMessage::Status(StatusUpdate::Canceled { prompt_id }) => {
                let prompt_id = match prompt_id {
                    Some(id) => Some(self.finish(id)?),
                    None => None,
                };
                Some(AppEvent::Canceled { prompt_id })
            }
            InboundMessage::Status(StatusUpdate::MemoryCleared { session_id }) => {
                Some(AppEvent::MemoryCleared { session_id })
            }
        }
    }

    fn find(&self, wire_id: &PromptId) -> Option<usize> {
        self.prompts.iter().position(|e| e.answers_to(wire_id))
    }

    fn is_finished(&self, wire_id: &PromptId) -> bool {
        self.finished.contains(wire_id)
    }

    fn oldest_pending(&self) -> Option<usize> {
        self.prompts
            .iter()
            .position(|e| e.phase == PromptPhase::Pending)
    }

    fn started(&mut self, wire_id: Option<PromptId>) -> Option<Option<PromptId>> {
        let idx = match &wire_id {
            Some(id) if self.is_finished(id) => {
                debug!(prompt_id = %id, "Dropping start of a finished prompt");
                return None;
            }
            Some(id) => match self.find(id) {
                Some(idx) => Some(idx),
                None => {
                    let adopted = self.oldest_pending();
                    if let Some(idx) = adopted {
                        debug!(
                            client_id = %self.prompts[idx].id,
                            server_id = %id,
                            "Remapping pending prompt to server id"
                        );
                        self.prompts[idx].server_id = Some(id.clone());
                    }
                    adopted
                }
            },
            None => self.oldest_pending(),
        };

        Some(match idx {
            Some(idx) => {
                self.prompts[idx].phase = PromptPhase::Streaming;
                Some(self.prompts[idx].id.clone())
            }
            None => wire_id,
        })
    }

    fn streaming(&mut self, wire_id: PromptId) -> Option<PromptId> {
        if let Some(idx) = self.find(&wire_id) {
            self.prompts[idx].phase = PromptPhase::Streaming;
            return Some(self.prompts[idx].id.clone());
        }
        if self.is_finished(&wire_id) {
            debug!(prompt_id = %wire_id, "Dropping late token");
            return None;
        }
        Some(wire_id)
    }

    fn finish(&mut self, wire_id: PromptId) -> Option<PromptId> {
        if let Some(idx) = self.find(&wire_id) {
            let entry = self.prompts.remove(idx);
            if let Some(server_id) = entry.server_id {
                self.remember(server_id);
            }
            self.remember(entry.id.clone());
            return Some(entry.id);
        }
        if self.is_finished(&wire_id) {
            debug!(prompt_id = %wire_id, "Dropping repeated terminal frame");
            return None;
        }
        self.remember(wire_id.clone());
        Some(wire_id)
    }

    fn remember(&mut self, id: PromptId) {
        if self.finished.len() == FINISHED_CAPACITY {
            self.finished.pop_front();
        }
        self.finished.push_back(id);
    }
}
