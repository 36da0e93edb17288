//! Encoder/Decoder untuk CPT frames
//!
//! Encode dan decode dengan fixed-offset packing, O(msg_len).
//! Decoder membedakan frame yang belum lengkap (caller buffer lebih
//! banyak bytes) dari frame yang rusak (connection ditutup).

use thiserror::Error;

use super::frame::{
    Command, Request, Response, ResponseCode, MAX_PAYLOAD, REQUEST_HEADER_SIZE,
    RESPONSE_HEADER_SIZE, VERSION,
};

/// Kegagalan encode. Encoding tidak pernah gagal untuk record yang
/// well-formed; satu-satunya kasus adalah payload melebihi batas protokol.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("payload of {0} bytes exceeds protocol maximum of {MAX_PAYLOAD}")]
    MsgOverflow(usize),
}

/// Kegagalan decode.
///
/// `MalformedHeader` dan `MsgLenOverflow` berarti buffer belum berisi
/// frame lengkap; sisanya fatal untuk connection yang bersangkutan.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer shorter than the fixed header")]
    MalformedHeader,
    #[error("declared msg_len reads past the supplied buffer")]
    MsgLenOverflow,
    #[error("declared msg_len {0} exceeds protocol maximum of {MAX_PAYLOAD}")]
    MsgOverflow(u16),
    #[error("unsupported protocol version {0}")]
    BadVersion(u8),
    #[error("unknown command byte {0}")]
    UnknownCommand(u8),
    #[error("unknown response code byte {0}")]
    UnknownCode(u8),
}

impl DecodeError {
    /// True jika frame hanya belum lengkap: caller harus menunggu bytes
    /// berikutnya, bukan menutup connection.
    #[inline(always)]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::MalformedHeader | Self::MsgLenOverflow)
    }

    /// Status code yang dikirim ke peer sebelum teardown. None untuk
    /// error yang incomplete (tidak pernah dikirim ke peer).
    pub fn response_code(&self) -> Option<ResponseCode> {
        match self {
            Self::MalformedHeader | Self::MsgLenOverflow => None,
            Self::MsgOverflow(_) => Some(ResponseCode::MsgOverflow),
            Self::BadVersion(_) => Some(ResponseCode::BadVersion),
            Self::UnknownCommand(_) => Some(ResponseCode::UnknownCmd),
            Self::UnknownCode(_) => Some(ResponseCode::Reserved),
        }
    }
}

/// Encode Request ke `out`, header dulu lalu payload.
pub fn encode_request(req: &Request, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    if req.msg.len() > MAX_PAYLOAD {
        return Err(EncodeError::MsgOverflow(req.msg.len()));
    }

    out.reserve(req.encoded_len());
    out.push(req.version);
    out.push(req.command as u8);
    out.extend_from_slice(&req.channel_id.to_be_bytes());
    out.extend_from_slice(&(req.msg.len() as u16).to_be_bytes());
    out.extend_from_slice(&req.msg);
    Ok(())
}

/// Encode Response ke `out`, header dulu lalu payload.
pub fn encode_response(res: &Response, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    if res.msg.len() > MAX_PAYLOAD {
        return Err(EncodeError::MsgOverflow(res.msg.len()));
    }

    out.reserve(res.encoded_len());
    out.push(res.code as u8);
    out.extend_from_slice(&res.channel_id.to_be_bytes());
    out.extend_from_slice(&res.user_id.to_be_bytes());
    out.extend_from_slice(&(res.msg.len() as u16).to_be_bytes());
    out.extend_from_slice(&res.msg);
    Ok(())
}

/// Decode satu Request dari awal `buf`.
///
/// Returns record plus jumlah bytes yang dikonsumsi. Field enumerated
/// (version, command) divalidasi sebelum payload disentuh.
pub fn decode_request(buf: &[u8]) -> Result<(Request, usize), DecodeError> {
    if buf.len() < REQUEST_HEADER_SIZE {
        return Err(DecodeError::MalformedHeader);
    }

    let version = buf[0];
    if version != VERSION {
        return Err(DecodeError::BadVersion(version));
    }
    let command = Command::from_u8(buf[1]).ok_or(DecodeError::UnknownCommand(buf[1]))?;
    let channel_id = u16::from_be_bytes([buf[2], buf[3]]);
    let msg_len = u16::from_be_bytes([buf[4], buf[5]]);

    if msg_len as usize > MAX_PAYLOAD {
        return Err(DecodeError::MsgOverflow(msg_len));
    }
    let total = REQUEST_HEADER_SIZE + msg_len as usize;
    if buf.len() < total {
        return Err(DecodeError::MsgLenOverflow);
    }

    let msg = buf[REQUEST_HEADER_SIZE..total].to_vec();
    Ok((
        Request {
            version,
            command,
            channel_id,
            msg,
        },
        total,
    ))
}

/// Decode satu Response dari awal `buf`.
pub fn decode_response(buf: &[u8]) -> Result<(Response, usize), DecodeError> {
    if buf.len() < RESPONSE_HEADER_SIZE {
        return Err(DecodeError::MalformedHeader);
    }

    let code = ResponseCode::from_u8(buf[0]).ok_or(DecodeError::UnknownCode(buf[0]))?;
    let channel_id = u16::from_be_bytes([buf[1], buf[2]]);
    let user_id = u16::from_be_bytes([buf[3], buf[4]]);
    let msg_len = u16::from_be_bytes([buf[5], buf[6]]);

    if msg_len as usize > MAX_PAYLOAD {
        return Err(DecodeError::MsgOverflow(msg_len));
    }
    let total = RESPONSE_HEADER_SIZE + msg_len as usize;
    if buf.len() < total {
        return Err(DecodeError::MsgLenOverflow);
    }

    let msg = buf[RESPONSE_HEADER_SIZE..total].to_vec();
    Ok((
        Response {
            code,
            channel_id,
            user_id,
            msg,
        },
        total,
    ))
}
