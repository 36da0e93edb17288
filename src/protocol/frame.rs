//! CPT Frame Format
//!
//! Layout (big-endian untuk semua multi-byte integer):
//! ┌─────────────────────────────────────────────────────┐
//! │ Request:  version(1) command(1) chan_id(2) len(2)   │
//! │ Response: code(1) chan_id(2) user_id(2) len(2)      │
//! ├─────────────────────────────────────────────────────┤
//! │ Payload (variable, max 4KB)                         │
//! └─────────────────────────────────────────────────────┘
//!
//! Header di-pack dengan fixed-offset integer packing, tanpa
//! intermediate representation.

/// Versi protokol saat ini
pub const VERSION: u8 = 1;

/// Batas payload per frame untuk membatasi penggunaan memory
pub const MAX_PAYLOAD: usize = 4096;

/// Fixed header size untuk Request
pub const REQUEST_HEADER_SIZE: usize = 6;

/// Fixed header size untuk Response
pub const RESPONSE_HEADER_SIZE: usize = 7;

/// Command dalam Request frame
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Kirim pesan ke channel
    Send = 1,
    /// Tutup session
    Logout = 2,
    /// Minta daftar user dalam channel
    GetUsers = 3,
    /// Buat channel baru
    CreateChannel = 4,
    /// Gabung ke channel
    JoinChannel = 5,
    /// Keluar dari channel
    LeaveChannel = 6,
    /// Buka session dengan display name
    Login = 7,
}

impl Command {
    #[inline(always)]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Send),
            2 => Some(Self::Logout),
            3 => Some(Self::GetUsers),
            4 => Some(Self::CreateChannel),
            5 => Some(Self::JoinChannel),
            6 => Some(Self::LeaveChannel),
            7 => Some(Self::Login),
            _ => None,
        }
    }
}

/// Status/event code dalam Response frame
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success = 1,
    Message = 2,
    UserConnected = 3,
    UserDisconnected = 4,
    MessageFailed = 5,
    ChannelCreated = 6,
    ChannelCreationError = 7,
    ChannelDestroyed = 8,
    UserJoinedChannel = 9,
    UserLeftChannel = 10,
    UserList = 11,
    UnknownCmd = 12,
    LoginFail = 13,
    UnknownChannel = 14,
    BadVersion = 15,
    SendFailed = 16,
    ChanIdOverflow = 17,
    MsgOverflow = 18,
    MsgLenOverflow = 19,
    ChanEmpty = 20,
    InvalidId = 21,
    UnauthAccess = 22,
    ServerFull = 23,
    Reserved = 255,
}

impl ResponseCode {
    #[inline(always)]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Success),
            2 => Some(Self::Message),
            3 => Some(Self::UserConnected),
            4 => Some(Self::UserDisconnected),
            5 => Some(Self::MessageFailed),
            6 => Some(Self::ChannelCreated),
            7 => Some(Self::ChannelCreationError),
            8 => Some(Self::ChannelDestroyed),
            9 => Some(Self::UserJoinedChannel),
            10 => Some(Self::UserLeftChannel),
            11 => Some(Self::UserList),
            12 => Some(Self::UnknownCmd),
            13 => Some(Self::LoginFail),
            14 => Some(Self::UnknownChannel),
            15 => Some(Self::BadVersion),
            16 => Some(Self::SendFailed),
            17 => Some(Self::ChanIdOverflow),
            18 => Some(Self::MsgOverflow),
            19 => Some(Self::MsgLenOverflow),
            20 => Some(Self::ChanEmpty),
            21 => Some(Self::InvalidId),
            22 => Some(Self::UnauthAccess),
            23 => Some(Self::ServerFull),
            255 => Some(Self::Reserved),
            _ => None,
        }
    }
}

/// Request record, satu per frame dari client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub version: u8,
    pub command: Command,
    pub channel_id: u16,
    pub msg: Vec<u8>,
}

impl Request {
    /// Request baru dengan versi protokol saat ini
    pub fn new(command: Command, channel_id: u16, msg: Vec<u8>) -> Self {
        Self {
            version: VERSION,
            command,
            channel_id,
            msg,
        }
    }

    /// Total encoded size (header + payload)
    #[inline(always)]
    pub fn encoded_len(&self) -> usize {
        REQUEST_HEADER_SIZE + self.msg.len()
    }
}

/// Response record, satu per frame ke client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: ResponseCode,
    pub channel_id: u16,
    pub user_id: u16,
    pub msg: Vec<u8>,
}

impl Response {
    pub fn new(code: ResponseCode, channel_id: u16, user_id: u16, msg: Vec<u8>) -> Self {
        Self {
            code,
            channel_id,
            user_id,
            msg,
        }
    }

    /// Response tanpa payload
    pub fn bare(code: ResponseCode, channel_id: u16, user_id: u16) -> Self {
        Self::new(code, channel_id, user_id, Vec::new())
    }

    /// Total encoded size (header + payload)
    #[inline(always)]
    pub fn encoded_len(&self) -> usize {
        RESPONSE_HEADER_SIZE + self.msg.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes() {
        for v in 1..=7u8 {
            let cmd = Command::from_u8(v).unwrap();
            assert_eq!(cmd as u8, v);
        }
        assert_eq!(Command::from_u8(0), None);
        assert_eq!(Command::from_u8(8), None);
    }

    #[test]
    fn test_response_codes() {
        for v in 1..=23u8 {
            let code = ResponseCode::from_u8(v).unwrap();
            assert_eq!(code as u8, v);
        }
        assert_eq!(ResponseCode::from_u8(255), Some(ResponseCode::Reserved));
        assert_eq!(ResponseCode::from_u8(0), None);
        assert_eq!(ResponseCode::from_u8(24), None);
    }

    #[test]
    fn test_encoded_len() {
        let req = Request::new(Command::Login, 0, b"Alice".to_vec());
        assert_eq!(req.encoded_len(), REQUEST_HEADER_SIZE + 5);

        let res = Response::bare(ResponseCode::Success, 0, 1);
        assert_eq!(res.encoded_len(), RESPONSE_HEADER_SIZE);
    }
}
