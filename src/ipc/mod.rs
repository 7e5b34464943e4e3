//! Message transport used to notify the proxy group manager of topology
//! changes made elsewhere in the process.
//!
//! Frames are `u32` code, `u32` payload length and the payload itself, all
//! in network byte order. Relocation payloads are sequences of `u64`
//! triples `(object, source group, destination group)` where zero means
//! "no group".

pub mod codec;
pub mod endpoint;
mod error;
pub mod message;
#[cfg(unix)]
pub mod unix;

pub use codec::CodecError;
pub use endpoint::{ChannelEndpoint, MessageEndpoint, MessageSender, UpdateNotifier, channel};
pub use error::IpcError;
pub use message::{IpcMessage, MessageCode};
#[cfg(unix)]
pub use unix::{UnixSocketEndpoint, UnixSocketSender};
