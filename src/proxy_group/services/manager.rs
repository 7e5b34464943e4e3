//! The proxy group manager control loop.
//!
//! Startup loads the durable mapping watermark, starts the update service
//! and fills the cache from the store and topology source. Each cycle then
//! reloads the topology, runs the health state machines and host
//! assignment under the cache lock, and flushes pending changes. Flushes
//! that fail because the database is unavailable are retried with the same
//! drained batch until they succeed or shutdown is requested.

use super::{ShutdownSignal, UpdateService, UpdateServiceError, UpdateServiceHandle};
use crate::ipc::{IpcError, MessageEndpoint};
use crate::proxy_group::{
    cache::{EvaluationReport, ProxyGroupCache, ResolvedSettings},
    domain::{FlushOutcome, GroupSettings},
    ports::{
        ActivityReporter, ActivityState, MacroResolver, ProxyGroupStore, StoreError,
        TopologySource,
    },
};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{Span, debug, error, info, info_span, warn};

const TITLE_PREFIX: &str = "proxy group manager";

/// Errors that stop the manager from starting or shutting down cleanly.
#[derive(Debug, Clone, Error)]
pub enum ManagerError {
    /// The store or topology source failed during startup.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The update service could not be started or stopped.
    #[error(transparent)]
    UpdateService(#[from] UpdateServiceError),

    /// The message endpoint could not be created.
    #[error(transparent)]
    Ipc(#[from] IpcError),
}

/// Identity of the hosting process, attached to log output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProcessIdentity {
    /// Program type, such as `server`.
    pub program_type: String,
    /// Process type within the program.
    pub process_type: String,
    /// Process number among processes of the same type.
    pub process_num: u32,
    /// Server number within the cluster.
    pub server_num: u32,
}

impl Default for ProcessIdentity {
    fn default() -> Self {
        Self {
            program_type: "server".to_owned(),
            process_type: "proxy group manager".to_owned(),
            process_num: 1,
            server_num: 0,
        }
    }
}

impl ProcessIdentity {
    /// Returns a span carrying the identity as fields.
    ///
    /// Threads started while the span is entered inherit it.
    #[must_use]
    pub fn span(&self) -> Span {
        info_span!(
            "proxy_group_manager",
            program_type = %self.program_type,
            process_type = %self.process_type,
            process_num = self.process_num,
            server_num = self.server_num,
        )
    }
}

/// Manager tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Cadence of topology reloads and health evaluation.
    pub status_check_interval: TimeDelta,
    /// Longest sleep between loop iterations.
    pub loop_sleep: Duration,
    /// Wait between flush attempts while the database is unavailable.
    pub flush_retry: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            status_check_interval: TimeDelta::seconds(5),
            loop_sleep: Duration::from_secs(1),
            flush_retry: Duration::from_secs(10),
        }
    }
}

/// Collaborators of the manager.
#[derive(Debug)]
pub struct ManagerPorts<S, T, M, A> {
    /// Durable storage.
    pub store: Arc<S>,
    /// Upstream group and proxy definitions.
    pub topology: Arc<T>,
    /// Macro expansion for group settings.
    pub macros: Arc<M>,
    /// Self-monitoring sink.
    pub activity: Arc<A>,
}

impl<S, T, M, A> Clone for ManagerPorts<S, T, M, A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            topology: Arc::clone(&self.topology),
            macros: Arc::clone(&self.macros),
            activity: Arc::clone(&self.activity),
        }
    }
}

/// How a flush attempt ended.
#[derive(Debug, Clone)]
pub enum FlushResult {
    /// Nothing needed persisting.
    Idle,
    /// The batch was committed.
    Persisted {
        /// Inserted, adopted and skipped mappings.
        outcome: FlushOutcome,
        /// Number of attempts, including the successful one.
        attempts: usize,
    },
    /// Shutdown was requested while the database was unavailable.
    Abandoned {
        /// Number of failed attempts.
        attempts: usize,
    },
    /// The store rejected the batch with a non-retryable error.
    Dropped(StoreError),
}

/// Result of one evaluation cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Status transitions applied in the cycle.
    pub evaluation: EvaluationReport,
    /// Flush result.
    pub flush: FlushResult,
}

/// Owner of the control loop.
pub struct ProxyGroupManager<S, T, M, A, C> {
    ports: ManagerPorts<S, T, M, A>,
    clock: Arc<C>,
    settings: ManagerSettings,
    shutdown: ShutdownSignal,
    cache: Arc<ProxyGroupCache>,
    service: Option<UpdateServiceHandle>,
    last_check: Option<DateTime<Utc>>,
}

impl<S, T, M, A, C> ProxyGroupManager<S, T, M, A, C>
where
    S: ProxyGroupStore,
    T: TopologySource,
    M: MacroResolver,
    A: ActivityReporter,
    C: Clock + Send + Sync,
{
    /// Loads initial state and starts the update service on `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Store`] when the initial load fails and
    /// [`ManagerError::UpdateService`] when the service thread cannot start.
    pub fn start<E: MessageEndpoint + 'static>(
        ports: ManagerPorts<S, T, M, A>,
        clock: Arc<C>,
        settings: ManagerSettings,
        shutdown: ShutdownSignal,
        endpoint: E,
    ) -> Result<Self, ManagerError> {
        ports.activity.set_title(&format!("{TITLE_PREFIX} [starting]"));
        let revision = ports.store.load_hostmap_revision()?;
        let cache = Arc::new(ProxyGroupCache::new(revision, clock.utc()));
        let service =
            UpdateService::new(endpoint, Arc::clone(&cache), shutdown.clone()).spawn()?;

        let mut manager = Self {
            ports,
            clock,
            settings,
            shutdown,
            cache,
            service: Some(service),
            last_check: None,
        };
        if let Err(err) = manager.load_initial_state() {
            error!(error = %err, "cannot load proxy group configuration");
            if let Err(stop_err) = manager.stop_service() {
                warn!(error = %stop_err, "cannot stop proxy group update service");
            }
            return Err(err);
        }
        info!(%revision, "proxy group manager started");
        Ok(manager)
    }

    /// Returns the shared cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ProxyGroupCache> {
        &self.cache
    }

    fn load_initial_state(&self) -> Result<(), ManagerError> {
        let groups = self.ports.topology.fetch_groups()?;
        let proxies = self.ports.topology.fetch_proxies()?;
        let host_groups = self.ports.store.load_host_groups()?;
        let mappings = self.ports.store.load_mappings()?;
        let now = self.clock.utc();

        let mut state = self.cache.lock();
        state.apply_group_records(&groups);
        state.apply_proxy_records(&proxies);
        state.load_host_groups(&host_groups);
        state.load_mappings(&mappings, now);
        info!(
            groups = groups.len(),
            proxies = proxies.len(),
            hosts = host_groups.len(),
            mappings = mappings.len(),
            "proxy group cache loaded"
        );
        Ok(())
    }

    /// Runs the loop until shutdown is requested, then shuts down.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UpdateService`] when the update service
    /// panicked.
    pub fn run(mut self) -> Result<(), ManagerError> {
        let idle_title = format!(
            "{TITLE_PREFIX} [idle {} sec]",
            self.settings.loop_sleep.as_secs()
        );
        while !self.shutdown.is_requested() {
            self.tick();
            self.ports.activity.set_title(&idle_title);
            self.ports.activity.set_state(ActivityState::Idle);
            if self.shutdown.wait(self.settings.loop_sleep) {
                break;
            }
        }
        self.shutdown()
    }

    /// Runs a cycle if the status check interval has elapsed since the last.
    pub fn tick(&mut self) -> Option<CycleReport> {
        let now = self.clock.utc();
        let interval = self.settings.status_check_interval;
        let due = self.last_check.is_none_or(|last| now - last >= interval);
        if !due {
            return None;
        }
        self.last_check = Some(now);
        Some(self.run_cycle())
    }

    /// Reloads the topology, evaluates every group and flushes changes.
    pub fn run_cycle(&self) -> CycleReport {
        self.ports.activity.set_state(ActivityState::Busy);
        self.ports
            .activity
            .set_title(&format!("{TITLE_PREFIX} [updating statuses]"));
        self.reload_topology();

        let settings = self.resolve_settings();
        let now = self.clock.utc();
        let evaluation =
            self.cache
                .lock()
                .evaluate(now, &settings, self.settings.status_check_interval);
        self.cache.dump();

        let pending = self.cache.lock().has_pending_updates();
        let flush = if pending {
            self.ports
                .activity
                .set_title(&format!("{TITLE_PREFIX} [flushing updates]"));
            self.flush()
        } else {
            FlushResult::Idle
        };
        CycleReport { evaluation, flush }
    }

    fn reload_topology(&self) {
        let Some(groups) = self
            .ports
            .topology
            .fetch_groups()
            .inspect_err(|err| warn!(error = %err, "cannot reload proxy groups"))
            .ok()
        else {
            return;
        };
        let Some(proxies) = self
            .ports
            .topology
            .fetch_proxies()
            .inspect_err(|err| warn!(error = %err, "cannot reload proxies"))
            .ok()
        else {
            return;
        };

        let relocations = {
            let mut state = self.cache.lock();
            state.apply_group_records(&groups);
            state.apply_proxy_records(&proxies)
        };
        if !relocations.is_empty() {
            debug!(count = relocations.len(), "relocated proxies");
        }
    }

    /// Expands group settings outside the cache lock.
    fn resolve_settings(&self) -> ResolvedSettings {
        let expressions = self.cache.lock().group_expressions();
        expressions
            .into_iter()
            .map(|(group_id, failover_delay, min_online)| {
                let settings = GroupSettings::parse(
                    &self.ports.macros.resolve(&failover_delay),
                    &self.ports.macros.resolve(&min_online),
                );
                (group_id, settings)
            })
            .collect()
    }

    /// Drains pending changes and persists them.
    ///
    /// The drained batch is kept across retries; changes queued meanwhile
    /// wait for the next flush.
    pub fn flush(&self) -> FlushResult {
        let batch = self.cache.lock().drain_updates();
        if batch.is_empty() {
            return FlushResult::Idle;
        }

        let mut attempts = 0_usize;
        loop {
            attempts += 1;
            match self.ports.store.flush(&batch) {
                Ok(outcome) => {
                    self.cache.lock().complete_flush(&batch, &outcome);
                    return FlushResult::Persisted { outcome, attempts };
                }
                Err(err) if err.is_retryable() => {
                    warn!(error = %err, attempts, "database unavailable, retrying proxy group flush");
                    if self.shutdown.wait(self.settings.flush_retry) {
                        warn!(attempts, "abandoning proxy group flush on shutdown");
                        return FlushResult::Abandoned { attempts };
                    }
                }
                Err(err) => {
                    error!(error = %err, "dropping proxy group flush batch");
                    let mut cache = self.cache.lock();
                    cache.restore_unassigned(&batch.new_mappings);
                    cache.release_hostmap_revision(&batch);
                    drop(cache);
                    return FlushResult::Dropped(err);
                }
            }
        }
    }

    fn stop_service(&mut self) -> Result<(), ManagerError> {
        self.service
            .take()
            .map_or(Ok(()), |handle| handle.stop().map_err(ManagerError::from))
    }

    /// Stops the update service and releases the cache.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UpdateService`] when the update service
    /// panicked.
    pub fn shutdown(mut self) -> Result<(), ManagerError> {
        self.ports
            .activity
            .set_title(&format!("{TITLE_PREFIX} [terminating]"));
        let stopped = self.stop_service();
        self.cache.clear();
        info!("proxy group manager stopped");
        stopped
    }
}
