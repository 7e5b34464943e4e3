//! The update service: applies live relocation notifications to the cache.

use super::ShutdownSignal;
use crate::ipc::{IpcError, IpcMessage, MessageCode, MessageEndpoint, codec::decode_moves};
use crate::proxy_group::cache::ProxyGroupCache;
use crate::proxy_group::domain::{HostId, ObjectMove, ProxyId};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{Span, debug, info, warn};

/// How long one receive call waits before re-checking the shutdown flag.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors raised while starting or stopping the update service.
#[derive(Debug, Clone, Error)]
pub enum UpdateServiceError {
    /// The service thread could not be started.
    #[error("cannot start proxy group update service: {0}")]
    Spawn(Arc<std::io::Error>),

    /// The service thread panicked.
    #[error("proxy group update service panicked")]
    Panicked,
}

/// Receive loop applying host and proxy relocations to the cache.
#[derive(Debug)]
pub struct UpdateService<E> {
    endpoint: E,
    cache: Arc<ProxyGroupCache>,
    shutdown: ShutdownSignal,
    stopping: Arc<AtomicBool>,
}

impl<E: MessageEndpoint> UpdateService<E> {
    /// Creates a service reading from `endpoint`.
    #[must_use]
    pub fn new(endpoint: E, cache: Arc<ProxyGroupCache>, shutdown: ShutdownSignal) -> Self {
        Self {
            endpoint,
            cache,
            shutdown,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    fn should_stop(&self) -> bool {
        self.shutdown.is_requested() || self.stopping.load(Ordering::Acquire)
    }

    /// Runs the receive loop on the current thread until a stop message,
    /// shutdown, or endpoint disconnection.
    pub fn run(mut self) {
        info!("proxy group update service started");
        while !self.should_stop() {
            match self.endpoint.recv_timeout(RECEIVE_TIMEOUT) {
                Ok(None) => {}
                Ok(Some(message)) => {
                    if self.handle(&message).is_break() {
                        break;
                    }
                }
                Err(IpcError::Disconnected) => {
                    debug!("proxy group endpoint disconnected");
                    break;
                }
                Err(err) => warn!(error = %err, "cannot receive proxy group message"),
            }
        }
        info!("proxy group update service stopped");
    }

    /// Applies one message.
    ///
    /// Returns [`ControlFlow::Break`] for stop requests. Malformed payloads
    /// and unknown codes are logged and ignored.
    pub fn handle(&self, message: &IpcMessage) -> ControlFlow<()> {
        match message.kind() {
            Some(MessageCode::HostGroupUpdate) => {
                self.apply_moves(message, MessageCode::HostGroupUpdate);
                ControlFlow::Continue(())
            }
            Some(MessageCode::ProxyGroupUpdate) => {
                self.apply_moves(message, MessageCode::ProxyGroupUpdate);
                ControlFlow::Continue(())
            }
            Some(MessageCode::Stop) => ControlFlow::Break(()),
            None => {
                debug!(code = message.raw_code(), "ignoring unknown proxy group message");
                ControlFlow::Continue(())
            }
        }
    }

    fn apply_moves(&self, message: &IpcMessage, code: MessageCode) {
        let moves = match decode_moves(message.payload()) {
            Ok(moves) => moves,
            Err(err) => {
                warn!(%code, error = %err, "ignoring malformed proxy group message");
                return;
            }
        };

        let mut state = self.cache.lock();
        for raw in moves {
            if raw.object_id == 0 {
                warn!(%code, "ignoring relocation of object 0");
                continue;
            }
            if code == MessageCode::HostGroupUpdate {
                state.apply_host_move(raw.map_object(HostId::new));
            } else {
                state.apply_proxy_move(raw.map_object(ProxyId::new));
            }
        }
    }
}

impl<E: MessageEndpoint + 'static> UpdateService<E> {
    /// Starts the receive loop on a dedicated thread.
    ///
    /// The thread inherits the caller's tracing span.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateServiceError::Spawn`] when the thread cannot start.
    pub fn spawn(self) -> Result<UpdateServiceHandle, UpdateServiceError> {
        let stopping = Arc::clone(&self.stopping);
        let span = Span::current();
        let thread = thread::Builder::new()
            .name("proxy-group-update".to_owned())
            .spawn(move || span.in_scope(|| self.run()))
            .map_err(|err| UpdateServiceError::Spawn(Arc::new(err)))?;
        Ok(UpdateServiceHandle { thread, stopping })
    }
}

/// Handle to a running update service thread.
#[derive(Debug)]
pub struct UpdateServiceHandle {
    thread: JoinHandle<()>,
    stopping: Arc<AtomicBool>,
}

impl UpdateServiceHandle {
    /// Asks the service to stop and waits for its thread.
    ///
    /// The loop notices the request within one receive timeout.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateServiceError::Panicked`] when the thread panicked.
    pub fn stop(self) -> Result<(), UpdateServiceError> {
        self.stopping.store(true, Ordering::Release);
        self.thread.join().map_err(|_| UpdateServiceError::Panicked)
    }

    /// Returns whether the service thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}
