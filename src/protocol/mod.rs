//! Protocol Layer: CPT Wire Codec
//!
//! Prinsip desain:
//! - Fixed layout: header lalu payload, offset konstan
//! - Big-endian: semua multi-byte integer
//! - Pure: tidak ada I/O, tidak ada state

mod codec;
mod frame;

pub use codec::{
    decode_request, decode_response, encode_request, encode_response, DecodeError, EncodeError,
};
pub use frame::{
    Command, Request, Response, ResponseCode, MAX_PAYLOAD, REQUEST_HEADER_SIZE,
    RESPONSE_HEADER_SIZE, VERSION,
};
