//! Unix-domain socket endpoint and sender.
//!
//! The endpoint accepts any number of connections. Each connection is read
//! on its own thread and decoded frames are forwarded to a channel drained
//! by [`MessageEndpoint::recv_timeout`].

use super::codec::{decode_frame, write_frame};
use super::endpoint::{ChannelEndpoint, MessageEndpoint, MessageSender, UpdateNotifier, channel};
use super::{IpcError, IpcMessage};
use bytes::BytesMut;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::io::{ErrorKind, Read};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

const ACCEPT_POLL: Duration = Duration::from_millis(100);
const READ_TIMEOUT: Duration = Duration::from_secs(1);
const READ_CHUNK: usize = 4096;

/// Listening endpoint bound to a socket path.
#[derive(Debug)]
pub struct UnixSocketEndpoint {
    path: Utf8PathBuf,
    inbox: ChannelEndpoint,
    closing: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl UnixSocketEndpoint {
    /// Binds `path`, replacing a stale socket file left by a previous run.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Bind`] when the socket cannot be created and
    /// [`IpcError::Io`] when the accept thread cannot be started.
    pub fn bind(path: &Utf8Path) -> Result<Self, IpcError> {
        remove_socket_file(path).map_err(|err| IpcError::bind(path.as_str(), err))?;
        let listener =
            UnixListener::bind(path.as_std_path()).map_err(|err| IpcError::bind(path.as_str(), err))?;
        listener
            .set_nonblocking(true)
            .map_err(|err| IpcError::bind(path.as_str(), err))?;

        let (notifier, inbox) = channel();
        let closing = Arc::new(AtomicBool::new(false));
        let acceptor_closing = Arc::clone(&closing);
        let acceptor = thread::Builder::new()
            .name("pg-ipc-accept".to_owned())
            .spawn(move || accept_loop(&listener, &notifier, &acceptor_closing))
            .map_err(IpcError::io)?;

        debug!(path = %path, "proxy group endpoint listening");
        Ok(Self {
            path: path.to_owned(),
            inbox,
            closing,
            acceptor: Some(acceptor),
        })
    }

    /// Returns the bound socket path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl MessageEndpoint for UnixSocketEndpoint {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<IpcMessage>, IpcError> {
        self.inbox.recv_timeout(timeout)
    }
}

impl Drop for UnixSocketEndpoint {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::Release);
        if let Some(acceptor) = self.acceptor.take()
            && acceptor.join().is_err()
        {
            warn!(path = %self.path, "proxy group endpoint accept thread panicked");
        }
        if let Err(err) = remove_socket_file(&self.path) {
            debug!(path = %self.path, error = %err, "cannot remove socket file");
        }
    }
}

fn remove_socket_file(path: &Utf8Path) -> std::io::Result<()> {
    let Some(name) = path.file_name() else {
        return Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            "socket path has no file name",
        ));
    };
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    match dir.remove_file(name) {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn accept_loop(listener: &UnixListener, notifier: &UpdateNotifier, closing: &Arc<AtomicBool>) {
    while !closing.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, _)) => spawn_reader(stream, notifier.clone(), Arc::clone(closing)),
            Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(err) => {
                warn!(error = %err, "cannot accept proxy group connection");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn spawn_reader(stream: UnixStream, notifier: UpdateNotifier, closing: Arc<AtomicBool>) {
    let spawned = thread::Builder::new()
        .name("pg-ipc-conn".to_owned())
        .spawn(move || {
            let mut connection = stream;
            if let Err(err) = read_connection(&mut connection, &notifier, &closing) {
                debug!(error = %err, "proxy group connection closed");
            }
        });
    if let Err(err) = spawned {
        warn!(error = %err, "cannot start proxy group connection reader");
    }
}

fn read_connection(
    stream: &mut UnixStream,
    notifier: &UpdateNotifier,
    closing: &AtomicBool,
) -> Result<(), IpcError> {
    stream.set_nonblocking(false).map_err(IpcError::io)?;
    stream
        .set_read_timeout(Some(READ_TIMEOUT))
        .map_err(IpcError::io)?;

    let mut buffer = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = [0_u8; READ_CHUNK];
    while !closing.load(Ordering::Acquire) {
        let read = match stream.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(read) => read,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(IpcError::io(err)),
        };
        buffer.extend_from_slice(chunk.get(..read).unwrap_or_default());
        while let Some(message) = decode_frame(&mut buffer)? {
            notifier.notify(message)?;
        }
    }
    Ok(())
}

/// Client connection used by collaborators to reach a [`UnixSocketEndpoint`].
#[derive(Debug)]
pub struct UnixSocketSender {
    stream: UnixStream,
}

impl UnixSocketSender {
    /// Connects to the endpoint at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Io`] when the socket cannot be reached.
    pub fn connect(path: &Utf8Path) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(path.as_std_path()).map_err(IpcError::io)?;
        Ok(Self { stream })
    }
}

impl MessageSender for UnixSocketSender {
    fn send_message(&mut self, message: &IpcMessage) -> Result<(), IpcError> {
        write_frame(&mut self.stream, message).map_err(IpcError::from)
    }
}
