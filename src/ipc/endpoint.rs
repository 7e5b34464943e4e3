//! Receiving endpoints and the in-process channel transport.

use super::{IpcError, IpcMessage};
use crate::proxy_group::domain::{HostId, ObjectMove, ProxyId};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Source of messages for the update service.
pub trait MessageEndpoint: Send {
    /// Waits up to `timeout` for the next message.
    ///
    /// Returns `Ok(None)` when the timeout elapsed without a message.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Disconnected`] once no message can arrive anymore.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<IpcMessage>, IpcError>;
}

/// Sending side used by collaborators to notify the update service.
pub trait MessageSender {
    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Disconnected`] when the receiving side is gone.
    fn send_message(&mut self, message: &IpcMessage) -> Result<(), IpcError>;

    /// Notifies that hosts moved between groups.
    ///
    /// # Errors
    ///
    /// See [`MessageSender::send_message`].
    fn send_host_moves(&mut self, moves: &[ObjectMove<HostId>]) -> Result<(), IpcError> {
        self.send_message(&IpcMessage::host_group_update(moves))
    }

    /// Notifies that proxies moved between groups.
    ///
    /// # Errors
    ///
    /// See [`MessageSender::send_message`].
    fn send_proxy_moves(&mut self, moves: &[ObjectMove<ProxyId>]) -> Result<(), IpcError> {
        self.send_message(&IpcMessage::proxy_group_update(moves))
    }

    /// Asks the update service to stop.
    ///
    /// # Errors
    ///
    /// See [`MessageSender::send_message`].
    fn send_stop(&mut self) -> Result<(), IpcError> {
        self.send_message(&IpcMessage::stop())
    }
}

/// Creates a connected in-process notifier and endpoint.
#[must_use]
pub fn channel() -> (UpdateNotifier, ChannelEndpoint) {
    let (sender, receiver) = mpsc::channel();
    (UpdateNotifier { sender }, ChannelEndpoint { receiver })
}

/// Receiving half of an in-process channel.
#[derive(Debug)]
pub struct ChannelEndpoint {
    receiver: Receiver<IpcMessage>,
}

impl MessageEndpoint for ChannelEndpoint {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<IpcMessage>, IpcError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(IpcError::Disconnected),
        }
    }
}

/// Cloneable sending half of an in-process channel.
#[derive(Debug, Clone)]
pub struct UpdateNotifier {
    sender: Sender<IpcMessage>,
}

impl UpdateNotifier {
    /// Queues a message without encoding it.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Disconnected`] when the endpoint was dropped.
    pub fn notify(&self, message: IpcMessage) -> Result<(), IpcError> {
        self.sender
            .send(message)
            .map_err(|_| IpcError::Disconnected)
    }
}

impl MessageSender for UpdateNotifier {
    fn send_message(&mut self, message: &IpcMessage) -> Result<(), IpcError> {
        self.notify(message.clone())
    }
}
