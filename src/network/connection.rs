//! Connection handling dengan buffered I/O
//!
//! Pre-allocated read buffer per connection; frame boleh datang sepotong
//! demi sepotong atau beberapa sekaligus dalam satu read. Write di-queue
//! dan di-flush sampai WouldBlock.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

use mio::net::TcpStream;

/// Buffer sizes - cukup untuk beberapa frame maksimum sekaligus
const READ_BUFFER_SIZE: usize = 16 * 1024;
const MAX_WRITE_BUFFER: usize = 256 * 1024;

/// State machine per connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Socket diterima, belum terdaftar di poll
    Accepted,
    /// Terdaftar, menunggu LOGIN
    Authenticating,
    /// Session hidup
    Active,
    /// Teardown dimulai, menunggu compaction
    Closing,
    /// Selesai; di-compact keluar dari active set
    Closed,
}

/// Hasil satu pass baca dari socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Socket habis dibaca sampai WouldBlock
    Drained,
    /// Read buffer penuh sebelum socket habis; decode dulu, baca lagi
    BufferFull,
    /// Peer menutup connection (read 0)
    Closed,
}

/// Satu client connection dengan buffered non-blocking I/O
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    state: ConnState,
    read_buffer: Box<[u8]>,
    read_len: usize,
    write_buffer: Vec<u8>,
    write_interest: bool,
}

impl Connection {
    /// Wrap mio stream; socket sudah non-blocking dari accept.
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        // TCP_NODELAY untuk latency fan-out
        let _ = stream.set_nodelay(true);

        // Socket buffer sizes untuk throughput; tidak semua platform
        // mendukung, error diabaikan.
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = stream.as_raw_fd();
            unsafe {
                let optval: libc::c_int = 256 * 1024;
                libc::setsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    libc::SO_SNDBUF,
                    &optval as *const _ as *const libc::c_void,
                    std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                );
                libc::setsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    libc::SO_RCVBUF,
                    &optval as *const _ as *const libc::c_void,
                    std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                );
            }
        }

        Self {
            stream,
            peer,
            state: ConnState::Accepted,
            read_buffer: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
            read_len: 0,
            write_buffer: Vec::new(),
            write_interest: false,
        }
    }

    /// Baca dari socket ke internal buffer sampai WouldBlock, buffer
    /// penuh, atau peer close.
    pub fn fill_read_buffer(&mut self) -> io::Result<ReadOutcome> {
        loop {
            if self.read_len == self.read_buffer.len() {
                return Ok(ReadOutcome::BufferFull);
            }
            match self.stream.read(&mut self.read_buffer[self.read_len..]) {
                Ok(0) => return Ok(ReadOutcome::Closed),
                Ok(n) => self.read_len += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadOutcome::Drained)
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Data yang sudah terbaca dan belum dikonsumsi (zero-copy)
    #[inline(always)]
    pub fn readable(&self) -> &[u8] {
        &self.read_buffer[..self.read_len]
    }

    /// Konsumsi n bytes dari depan read buffer, sisanya digeser ke depan
    #[inline]
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.read_len);
        if n < self.read_len {
            self.read_buffer.copy_within(n..self.read_len, 0);
        }
        self.read_len -= n;
    }

    /// Queue data untuk write. False jika write buffer melewati batas;
    /// connection harus di-teardown oleh caller.
    #[inline]
    pub fn queue_write(&mut self, data: &[u8]) -> bool {
        if self.write_buffer.len() + data.len() > MAX_WRITE_BUFFER {
            return false;
        }
        self.write_buffer.extend_from_slice(data);
        true
    }

    /// Flush write buffer ke socket sampai habis atau WouldBlock.
    pub fn flush(&mut self) -> io::Result<()> {
        while !self.write_buffer.is_empty() {
            match self.stream.write(&self.write_buffer) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket write returned zero",
                    ))
                }
                Ok(n) => {
                    self.write_buffer.drain(..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Masih ada output yang menunggu socket writable
    #[inline(always)]
    pub fn wants_write(&self) -> bool {
        !self.write_buffer.is_empty()
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnState) {
        self.state = state;
    }

    /// Interest WRITABLE yang sedang terdaftar di poll
    pub fn write_interest(&self) -> bool {
        self.write_interest
    }

    pub fn set_write_interest(&mut self, on: bool) {
        self.write_interest = on;
    }

    /// Underlying stream untuk (de)registrasi poll
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}
