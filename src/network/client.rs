//! Blocking CPT client
//!
//! Sisi client dari protokol: interactive input loop di luar crate ini
//! hanya perlu memanggil `submit` dan membaca event lewat
//! `next_response`. Tidak ada correlation id di protokol, jadi response
//! dan event fan-out datang berurutan di stream yang sama.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};

use crate::protocol::{decode_response, encode_request, Command, Request, Response};

const RECV_CHUNK: usize = 4096;

/// Connection client-side dengan buffered decode
pub struct Client {
    stream: TcpStream,
    recv_buffer: Vec<u8>,
}

impl Client {
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            recv_buffer: Vec::new(),
        })
    }

    /// Kirim satu request frame.
    pub fn send_request(
        &mut self,
        command: Command,
        channel_id: u16,
        payload: &[u8],
    ) -> io::Result<()> {
        let req = Request::new(command, channel_id, payload.to_vec());
        let mut buf = Vec::with_capacity(req.encoded_len());
        encode_request(&req, &mut buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.stream.write_all(&buf)
    }

    /// Buka session dengan display name.
    ///
    /// Aman menunggu reply langsung: sebelum login, server tidak pernah
    /// mengirim event lain ke connection ini.
    pub fn login(&mut self, name: &str) -> io::Result<Response> {
        self.send_request(Command::Login, 0, name.as_bytes())?;
        self.next_response()
    }

    /// Kirim pesan ke channel. Entry point untuk input loop.
    pub fn submit(&mut self, channel_id: u16, msg: &[u8]) -> io::Result<()> {
        self.send_request(Command::Send, channel_id, msg)
    }

    /// Baca satu response/event frame berikutnya (blocking).
    pub fn next_response(&mut self) -> io::Result<Response> {
        loop {
            match decode_response(&self.recv_buffer) {
                Ok((response, consumed)) => {
                    self.recv_buffer.drain(..consumed);
                    return Ok(response);
                }
                Err(e) if e.is_incomplete() => {}
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            }

            let mut chunk = [0u8; RECV_CHUNK];
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "server closed the connection",
                    ))
                }
                Ok(n) => self.recv_buffer.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Underlying stream, mis. untuk set_read_timeout.
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}
