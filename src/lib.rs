//! Async msgpack-RPC client for Neovim.
//!
//! A [`Session`] wraps any duplex byte stream (unix socket, TCP, or a
//! child's stdio) and runs one dispatch loop that matches responses to
//! callers by request id and fans notifications out to listeners.
//! [`Nvim`], [`Buffer`], [`Window`] and [`Tabpage`] are typed proxies whose
//! methods become calls on that session.
//!
//! - `rpc` - codec, framing, pending-call table and the session itself
//! - `api` - proxy types and their method tables
//! - `events` - notification listeners
//! - `connect` - sockets, TCP and embedded child processes
//!
//! # Example
//!
//! ```ignore
//! use nvim_attach::{connect, SessionConfig, Value};
//!
//! let session = connect::connect("/run/user/1000/nvim.1234.0", SessionConfig::from_env()).await?;
//! let nvim = session.nvim();
//! assert_eq!(nvim.eval("1 + 1").await?, Value::Integer(2));
//!
//! session.on("my_event", |args| println!("{:?}", args));
//! session.subscribe("my_event").await?;
//! ```

pub mod api;
pub mod config;
pub mod connect;
pub mod error;
pub mod events;
pub mod handle;
pub mod rpc;
pub mod value;

pub use api::{ApiInfo, Buffer, Nvim, Tabpage, Window};
pub use config::SessionConfig;
pub use error::{Error, RemoteError, Result};
pub use events::ListenerId;
pub use handle::{Handle, HandleKind};
pub use rpc::{attach, attach_with, PendingResponse, Session};
pub use value::{FromValue, Value};
