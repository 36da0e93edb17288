//! CPT - Chat Protocol Server
//!
//! Arsitektur:
//! - Binary Protocol: fixed-layout frames, big-endian integer packing
//! - Non-Blocking I/O: satu readiness loop (mio) memiliki semua socket
//! - Single-Writer State: registries dimutasi hanya dari event loop
//! - Pure Dispatch: protocol logic menghasilkan output list, bukan I/O

pub mod dispatch;
pub mod network;
pub mod protocol;
pub mod registry;
