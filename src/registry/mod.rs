//! Registry Layer: Session dan Channel state
//!
//! Owned, id-indexed maps. Cross-reference antara session dan channel
//! hanya berupa plain id value, tidak pernah pointer/reference, sehingga
//! teardown tidak bisa dangling.
//!
//! Kedua registry dimutasi hanya dari satu event loop (single-writer).

mod channels;
mod sessions;

use thiserror::Error;

use crate::protocol::ResponseCode;

pub use channels::{Channel, ChannelRegistry, GLOBAL_CHANNEL_ID};
pub use sessions::{Session, SessionRegistry};

/// Handle connection milik multiplexer (nilai mio token)
pub type ConnId = usize;

/// Kegagalan operasi registry. Setiap variant punya mapping tetap ke
/// status code protokol.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session table at capacity or user id space exhausted")]
    ServerFull,
    #[error("connection already has a live session")]
    AlreadyLoggedIn,
    #[error("no live session for user {0}")]
    UnknownUser(u16),
    #[error("no channel with id {0}")]
    UnknownChannel(u16),
    #[error("user {user} is not a member of channel {channel}")]
    NotAMember { channel: u16, user: u16 },
    #[error("channel id space exhausted")]
    ChanIdOverflow,
}

impl RegistryError {
    /// Status code yang dikirim ke client untuk kegagalan ini.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Self::ServerFull => ResponseCode::ServerFull,
            Self::AlreadyLoggedIn => ResponseCode::LoginFail,
            Self::UnknownUser(_) => ResponseCode::InvalidId,
            Self::UnknownChannel(_) => ResponseCode::UnknownChannel,
            Self::NotAMember { .. } => ResponseCode::ChanEmpty,
            Self::ChanIdOverflow => ResponseCode::ChannelCreationError,
        }
    }
}
