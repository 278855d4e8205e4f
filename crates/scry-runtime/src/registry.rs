//! Keyed collection of HTTP-backed services.
//!
//! The registry is an owned object built at the composition root and passed
//! to whoever needs it. Each id maps to exactly one [`ManagedProcess`];
//! repeated `create` calls for an id hand back the existing handle, and a
//! create racing an unfinished one shares its outcome.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use scry_core::ports::{AppEventEmitter, ServerLogSinkPort};
use scry_core::{
    ProcessInfo, RegistryError, ServiceConfig, ServiceReport, ServiceSettings, SupervisorError,
};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::process::{ManagedProcess, ProcessSpec};

/// One registered service.
#[derive(Clone)]
pub struct ServiceHandle {
    id: Arc<str>,
    config: Arc<ServiceConfig>,
    process: ManagedProcess,
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ServiceHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn url(&self) -> String {
        self.config.url()
    }

    pub fn process(&self) -> &ManagedProcess {
        &self.process
    }

    /// Status with a live health probe. A service that is not running is
    /// never healthy, whatever else answers on its port.
    pub async fn report(&self) -> ServiceReport {
        let info = self.process.info().await;
        let healthy = info.is_running() && self.process.probe().await;
        ServiceReport::from_info(&self.id, &self.config, &info, healthy)
    }
}

/// Outcome of an in-flight create; `None` until it settles.
type CreateOutcome = Option<Result<ServiceHandle, RegistryError>>;

enum Entry {
    Ready(ServiceHandle),
    /// First start still running; later callers for the id wait on it.
    Creating(watch::Receiver<CreateOutcome>),
}

pub struct ServiceRegistry {
    services: Mutex<HashMap<String, Entry>>,
    emitter: Arc<dyn AppEventEmitter>,
    log_sink: Option<Arc<dyn ServerLogSinkPort>>,
}

impl ServiceRegistry {
    pub fn new(
        emitter: Arc<dyn AppEventEmitter>,
        log_sink: Option<Arc<dyn ServerLogSinkPort>>,
    ) -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
            emitter,
            log_sink,
        }
    }

    /// Register and start a service from its settings.
    pub async fn create(
        &self,
        id: &str,
        settings: &ServiceSettings,
    ) -> Result<ServiceHandle, RegistryError> {
        let config = settings.service_config();
        let spec = ProcessSpec::service(id, &config, settings);
        self.create_with_spec(id, config, spec).await
    }

    /// Register and start a service with an explicit process spec.
    ///
    /// Returns the existing handle untouched when `id` is already
    /// registered. A call racing an unfinished create for the same id waits
    /// for it and gets the same outcome. The port pre-flight runs as part of
    /// the start; on any start failure nothing stays registered.
    pub async fn create_with_spec(
        &self,
        id: &str,
        config: ServiceConfig,
        spec: ProcessSpec,
    ) -> Result<ServiceHandle, RegistryError> {
        let outcome_tx = {
            let mut services = self.services.lock().await;
            let pending = match services.get(id) {
                Some(Entry::Ready(existing)) => {
                    info!(id = %id, "Service already registered");
                    return Ok(existing.clone());
                }
                // a closed sender means that create was dropped mid-start
                Some(Entry::Creating(rx)) if rx.has_changed().is_ok() => Some(rx.clone()),
                Some(Entry::Creating(_)) | None => None,
            };
            if let Some(mut pending) = pending {
                drop(services);
                debug!(id = %id, "Waiting for in-flight create");
                return wait_for_create(id, &mut pending).await;
            }

            let (tx, rx) = watch::channel(None);
            services.insert(id.to_string(), Entry::Creating(rx));
            tx
        };

        let handle = ServiceHandle {
            id: Arc::from(id),
            config: Arc::new(config),
            process: ManagedProcess::new(spec, Arc::clone(&self.emitter), self.log_sink.clone()),
        };

        info!(id = %id, url = %handle.url(), "Starting service");
        let result = match handle.process.start().await {
            Ok(info) => {
                info!(id = %id, pid = ?info.pid, "Service started");
                Ok(handle)
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Service failed to start");
                // drop any restart the failure scheduled
                if let Err(stop_err) = handle.process.stop().await {
                    warn!(id = %id, error = %stop_err, "Cleanup after failed start failed");
                }
                Err(RegistryError::from(e))
            }
        };

        {
            let mut services = self.services.lock().await;
            match &result {
                Ok(handle) => {
                    services.insert(id.to_string(), Entry::Ready(handle.clone()));
                }
                Err(_) => {
                    services.remove(id);
                }
            }
        }
        outcome_tx.send_replace(Some(result.clone()));
        result
    }

    /// Registered handle; `None` while its first start is still running.
    pub async fn get(&self, id: &str) -> Option<ServiceHandle> {
        match self.services.lock().await.get(id) {
            Some(Entry::Ready(handle)) => Some(handle.clone()),
            Some(Entry::Creating(_)) | None => None,
        }
    }

    async fn ready_handles(&self) -> Vec<ServiceHandle> {
        self.services
            .lock()
            .await
            .values()
            .filter_map(|entry| match entry {
                Entry::Ready(handle) => Some(handle.clone()),
                Entry::Creating(_) => None,
            })
            .collect()
    }

    async fn handle(&self, id: &str) -> Result<ServiceHandle, RegistryError> {
        self.get(id)
            .await
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Status of one service. `healthy` comes from a live probe taken only
    /// while the process is running.
    pub async fn get_status(&self, id: &str) -> Result<ServiceReport, RegistryError> {
        Ok(self.handle(id).await?.report().await)
    }

    /// Cached lifecycle info, no probe.
    pub async fn get_info(&self, id: &str) -> Result<ProcessInfo, RegistryError> {
        Ok(self.handle(id).await?.process.info().await)
    }

    pub async fn start(&self, id: &str) -> Result<ProcessInfo, RegistryError> {
        Ok(self.handle(id).await?.process.start().await?)
    }

    /// Stop a service. Its health poll and any pending restart are cancelled.
    pub async fn stop(&self, id: &str) -> Result<(), RegistryError> {
        let handle = self.handle(id).await?;
        info!(id = %id, "Stopping service");
        Ok(handle.process.stop().await?)
    }

    pub async fn restart(&self, id: &str) -> Result<ProcessInfo, RegistryError> {
        Ok(self.handle(id).await?.process.restart().await?)
    }

    /// Registered ids, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .ready_handles()
            .await
            .iter()
            .map(|h| h.id().to_string())
            .collect();
        ids.sort();
        ids
    }

    /// Stop every service concurrently.
    pub async fn shutdown(&self) {
        let handles = self.ready_handles().await;
        info!(count = handles.len(), "Shutting down services");

        let results = join_all(handles.iter().map(|h| async move {
            (h.id(), h.process.stop().await)
        }))
        .await;
        for (id, result) in results {
            if let Err(e) = result {
                warn!(id = %id, error = %e, "Service did not stop cleanly");
            }
        }
    }
}

async fn wait_for_create(
    id: &str,
    pending: &mut watch::Receiver<CreateOutcome>,
) -> Result<ServiceHandle, RegistryError> {
    let settled = pending
        .wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|outcome| outcome.clone());
    settled.unwrap_or_else(|| Err(SupervisorError::Aborted(id.to_string()).into()))
}
