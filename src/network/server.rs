//! Connection Multiplexer: mio event loop
//!
//! Satu readiness loop memiliki listener, semua client socket, dan
//! seluruh registry state. Setiap dispatch berjalan sampai selesai
//! sebelum event berikutnya diproses, jadi urutan operasi protokol
//! linearizable tanpa lock.

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use crate::dispatch::ServerState;
use crate::protocol::{
    decode_request, encode_response, Command, DecodeError, Request, Response, ResponseCode,
};

use super::connection::{ConnState, Connection, ReadOutcome};

const LISTENER: Token = Token(0);
const EVENTS_CAPACITY: usize = 1024;

/// Konfigurasi runtime untuk multiplexer
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Batas connection table; accept di atas ini ditolak SERVER_FULL
    pub max_connections: usize,
    /// Poll timeout; loop berhenti saat expire tanpa event dan tanpa
    /// connection aktif (shutdown signal, bukan per-connection timeout)
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// CPT server: listener + connection table + protocol state
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    state: ServerState,
    config: ServerConfig,
}

impl Server {
    /// Bind listener dan siapkan poll. Kegagalan di sini satu-satunya
    /// yang fatal untuk process; dilaporkan ke bootstrap layer.
    pub fn bind(addr: SocketAddr, config: ServerConfig) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(addr)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        Ok(Self {
            poll,
            listener,
            connections: HashMap::with_capacity(config.max_connections),
            next_token: 1,
            state: ServerState::new(config.max_connections),
            config,
        })
    }

    /// Alamat listener; berguna saat bind ke port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Jalankan event loop sampai idle timeout tanpa connection aktif.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        info!("cpt server listening on {}", self.listener.local_addr()?);

        loop {
            if let Err(e) = self.poll.poll(&mut events, Some(self.config.idle_timeout)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }

            if events.is_empty() && self.connections.is_empty() {
                info!("idle timeout with no active connections, shutting down");
                return Ok(());
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_pending(),
                    token => {
                        if event.is_readable() || event.is_read_closed() {
                            self.handle_read(token);
                        }
                        if event.is_writable() {
                            self.handle_write(token);
                        }
                    }
                }
            }

            // Connection yang selesai teardown di-compact keluar
            self.connections.retain(|_, c| c.state() != ConnState::Closed);
        }
    }

    /// Accept semua pending connection sampai WouldBlock.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    if self.connections.len() >= self.config.max_connections {
                        warn!("connection table full, rejecting {}", addr);
                        let mut buf = Vec::new();
                        let _ = encode_response(
                            &Response::bare(ResponseCode::ServerFull, 0, 0),
                            &mut buf,
                        );
                        let _ = stream.write(&buf);
                        continue;
                    }

                    let token = Token(self.next_token);
                    self.next_token += 1;

                    let mut conn = Connection::new(stream, addr);
                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(conn.stream_mut(), token, Interest::READABLE)
                    {
                        warn!("failed to register {}: {}", addr, e);
                        continue;
                    }
                    conn.set_state(ConnState::Authenticating);
                    info!("new connection from {} (token {})", addr, token.0);
                    self.connections.insert(token, conn);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Accept error bukan alasan mematikan loop
                    warn!("accept error: {}", e);
                    break;
                }
            }
        }
    }

    /// Readable event: isi buffer, extract frame lengkap, dispatch.
    fn handle_read(&mut self, token: Token) {
        let mut requests: Vec<Request> = Vec::new();
        let mut peer_closed = false;
        let mut framing_err: Option<DecodeError> = None;

        loop {
            let Some(conn) = self.connections.get_mut(&token) else {
                return;
            };
            if matches!(conn.state(), ConnState::Closing | ConnState::Closed) {
                return;
            }

            let outcome = match conn.fill_read_buffer() {
                Ok(o) => o,
                Err(e) => {
                    debug!("read error on token {}: {}", token.0, e);
                    peer_closed = true;
                    ReadOutcome::Drained
                }
            };

            // Satu read bisa memuat beberapa frame; frame juga bisa
            // datang terpotong, decode berhenti menunggu bytes berikutnya.
            loop {
                match decode_request(conn.readable()) {
                    Ok((req, consumed)) => {
                        conn.consume(consumed);
                        requests.push(req);
                    }
                    Err(e) if e.is_incomplete() => break,
                    Err(e) => {
                        framing_err = Some(e);
                        break;
                    }
                }
            }

            if framing_err.is_some() || peer_closed {
                break;
            }
            match outcome {
                ReadOutcome::Drained => break,
                ReadOutcome::BufferFull => continue,
                ReadOutcome::Closed => {
                    peer_closed = true;
                    break;
                }
            }
        }

        // Frame valid yang sudah terlanjur masuk tetap diproses
        for req in requests {
            self.process_request(token, req);
        }

        if let Some(e) = framing_err {
            warn!("framing error on token {}: {}", token.0, e);
            if let Some(code) = e.response_code() {
                self.deliver(token, Response::bare(code, 0, 0));
            }
            self.teardown(token);
        } else if peer_closed {
            self.teardown(token);
        }
    }

    /// Writable event: flush output yang tertunda.
    fn handle_write(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if matches!(conn.state(), ConnState::Closing | ConnState::Closed) {
            return;
        }
        if let Err(e) = conn.flush() {
            debug!("write error on token {}: {}", token.0, e);
            self.teardown(token);
            return;
        }
        self.update_interest(token);
    }

    /// Dispatch satu request dan tulis reply plus fan-out output.
    fn process_request(&mut self, token: Token, req: Request) {
        let dispatch = self.state.apply(token.0, &req);
        let activated =
            req.command == Command::Login && dispatch.reply.code == ResponseCode::Success;

        self.deliver(token, dispatch.reply);
        if activated {
            if let Some(conn) = self.connections.get_mut(&token) {
                conn.set_state(ConnState::Active);
            }
        }
        for (conn_id, response) in dispatch.fanout {
            self.deliver(Token(conn_id), response);
        }
    }

    /// Encode response dan queue ke connection tujuan, flush langsung.
    fn deliver(&mut self, token: Token, response: Response) {
        let mut buf = Vec::with_capacity(response.encoded_len());
        if let Err(e) = encode_response(&response, &mut buf) {
            warn!("dropping undeliverable response: {}", e);
            return;
        }

        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if matches!(conn.state(), ConnState::Closing | ConnState::Closed) {
            return;
        }
        if !conn.queue_write(&buf) {
            warn!("write buffer overflow on token {}, closing", token.0);
            self.teardown(token);
            return;
        }
        if let Err(e) = conn.flush() {
            debug!("write error on token {}: {}", token.0, e);
            self.teardown(token);
            return;
        }
        self.update_interest(token);
    }

    /// Daftarkan WRITABLE interest hanya selama ada output tertunda.
    fn update_interest(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        let want = conn.wants_write();
        if want == conn.write_interest() {
            return;
        }
        let interest = if want {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        match self.poll.registry().reregister(conn.stream_mut(), token, interest) {
            Ok(()) => conn.set_write_interest(want),
            Err(e) => warn!("reregister failed on token {}: {}", token.0, e),
        }
    }

    /// Lepaskan semua state milik connection, tepat satu kali.
    ///
    /// Close bisa terdeteksi lewat read 0 maupun I/O error; guard state
    /// membuat jalur kedua jadi no-op.
    fn teardown(&mut self, token: Token) {
        {
            let Some(conn) = self.connections.get_mut(&token) else {
                return;
            };
            if matches!(conn.state(), ConnState::Closing | ConnState::Closed) {
                return;
            }
            conn.set_state(ConnState::Closing);
            let _ = conn.flush();
            info!("connection {} closed (token {})", conn.peer(), token.0);
        }

        // Implicit logout plus USER_DISCONNECTED ke member lain
        for (conn_id, response) in self.state.disconnect(token.0) {
            self.deliver(Token(conn_id), response);
        }

        if let Some(conn) = self.connections.get_mut(&token) {
            let _ = self.poll.registry().deregister(conn.stream_mut());
            conn.set_state(ConnState::Closed);
        }
    }
}
