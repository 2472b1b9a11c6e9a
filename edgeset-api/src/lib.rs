//! # EdgeSet API
//!
//! Host-facing surface of an EdgeSet node: the line protocol, request framing
//! and the dispatcher that drives storage and index operations.
//!
//! ## Usage
//!
//! ```ignore
//! let node = EdgeNode::new(Config::default(), MemoryFlash::for_geometry(&geometry))?;
//! let mut dispatcher = Dispatcher::new(node);
//! let mut channel = StreamChannel::new(stdin.lock(), stdout.lock());
//! Session::new(&mut dispatcher).serve(&mut channel)?;
//! ```

pub mod command;
pub mod dispatcher;
pub mod node;
pub mod protocol;
pub mod session;

pub use command::{Command, PersistentTarget};
pub use dispatcher::Dispatcher;
pub use node::{EdgeNode, Selection};
pub use protocol::{recv_chunked, send_chunked, LineChannel, StreamChannel};
pub use session::{Session, SessionStats};
