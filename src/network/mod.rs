//! Network Layer: readiness-driven I/O multiplexing
//!
//! Menggunakan mio (epoll/kqueue) untuk non-blocking I/O. Semua socket
//! dimiliki satu event loop; tidak ada thread per connection.

mod client;
mod connection;
mod server;

pub use client::Client;
pub use connection::{ConnState, Connection, ReadOutcome};
pub use server::{Server, ServerConfig};
