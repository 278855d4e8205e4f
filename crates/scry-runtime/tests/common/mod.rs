//! Shared fixtures for the runtime integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scry_core::ports::{AppEventEmitter, ReadinessProbe};
use scry_core::AppEvent;
use tokio::sync::watch;

/// Emitter that keeps every event for later assertions.
#[derive(Clone, Default)]
pub struct RecordingEmitter {
    events: Arc<Mutex<Vec<AppEvent>>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AppEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }
}

impl AppEventEmitter for RecordingEmitter {
    fn emit(&self, event: AppEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}

/// Ready once a marker file exists.
pub struct FileProbe(pub PathBuf);

#[async_trait]
impl ReadinessProbe for FileProbe {
    async fn check(&self) -> bool {
        self.0.exists()
    }

    fn describe(&self) -> String {
        format!("file {}", self.0.display())
    }
}

/// Number of lines in a counter file the child scripts append to.
pub fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

/// Wait until the watched value satisfies `done`, or panic after `limit`.
pub async fn wait_for<T: Clone>(
    rx: &mut watch::Receiver<T>,
    limit: Duration,
    done: impl Fn(&T) -> bool,
) -> T {
    tokio::time::timeout(limit, async {
        loop {
            let current = rx.borrow_and_update().clone();
            if done(&current) {
                return current;
            }
            rx.changed().await.expect("sender dropped");
        }
    })
    .await
    .expect("timed out waiting for state")
}
