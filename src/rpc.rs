//! msgpack-rpc transport.
//!
//! - [`codec`] turns [`Message`]s into bytes and back
//! - [`framing`] pulls whole messages off an async byte stream
//! - [`pending`] correlates responses with the calls that wait for them
//! - [`session`] owns the stream and runs the dispatch loop

pub mod codec;
pub mod framing;
pub(crate) mod pending;
pub mod session;

pub use codec::{decode, encode, Message};
pub use framing::{read_message, MAX_MESSAGE_SIZE};
pub use session::{attach, attach_with, PendingResponse, Session};
