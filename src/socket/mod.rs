//! Buffered asynchronous socket layer
//!
//! Presents a stream abstraction over a non-blocking TCP socket with
//! host-name resolution, local buffering of unread incoming bytes and
//! unwritten outgoing bytes, and readiness-driven event delivery.

pub mod buffered;
pub mod events;
pub mod state;

pub use buffered::BufferedSocket;
pub use events::SocketEvent;
pub use state::SocketState;
