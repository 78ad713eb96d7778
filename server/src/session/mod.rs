//! Collector sessions
//!
//! One session per accepted TCP connection. A session answers requests in
//! order until the client asks to close, disconnects, or sends something
//! that cannot be framed.

mod connection;

pub use connection::CollectorSession;
