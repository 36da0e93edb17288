//! Command Dispatcher: pure protocol transitions
//!
//! `ServerState::apply` menerima satu decoded Request dan menghasilkan
//! reply untuk sender plus daftar fan-out output yang sudah teralamat.
//! Tidak ada I/O di sini; multiplexer yang menulis semua output, jadi
//! dispatcher bisa di-test tanpa socket.

use std::collections::BTreeSet;

use tracing::debug;

use crate::protocol::{Command, Request, Response, ResponseCode, MAX_PAYLOAD};
use crate::registry::{ChannelRegistry, ConnId, SessionRegistry, GLOBAL_CHANNEL_ID};

/// Output dari satu dispatch: reply untuk sender plus fan-out records
/// yang masing-masing sudah teralamat ke connection tujuan.
#[derive(Debug)]
pub struct Dispatch {
    pub reply: Response,
    pub fanout: Vec<(ConnId, Response)>,
}

impl Dispatch {
    /// Dispatch tanpa fan-out
    fn reply(reply: Response) -> Self {
        Self {
            reply,
            fanout: Vec::new(),
        }
    }
}

/// Seluruh mutable state server: kedua registry plus id allocators.
/// Dimiliki oleh event loop, dioper eksplisit ke setiap dispatch.
pub struct ServerState {
    pub sessions: SessionRegistry,
    pub channels: ChannelRegistry,
}

impl ServerState {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: SessionRegistry::new(max_sessions),
            channels: ChannelRegistry::new(),
        }
    }

    /// Transisi protokol untuk satu frame yang sudah decoded.
    pub fn apply(&mut self, conn: ConnId, req: &Request) -> Dispatch {
        if req.command == Command::Login {
            return self.login(conn, req);
        }

        // Semua command lain butuh session yang hidup
        let Some(user_id) = self.sessions.lookup(conn) else {
            return Dispatch::reply(Response::bare(
                ResponseCode::UnauthAccess,
                req.channel_id,
                0,
            ));
        };

        match req.command {
            Command::Send => self.send(user_id, req),
            Command::Logout => self.logout(user_id),
            Command::GetUsers => self.get_users(user_id, req),
            Command::CreateChannel => self.create_channel(user_id, req),
            Command::JoinChannel => self.join_channel(user_id, req),
            Command::LeaveChannel => self.leave_channel(user_id, req),
            Command::Login => unreachable!("handled above"),
        }
    }

    /// Teardown untuk connection yang putus tanpa LOGOUT (read 0 atau
    /// I/O error). Idempotent: connection tanpa session tidak punya efek.
    pub fn disconnect(&mut self, conn: ConnId) -> Vec<(ConnId, Response)> {
        match self.sessions.lookup(conn) {
            Some(user_id) => {
                debug!(user_id, conn, "implicit logout on disconnect");
                self.remove_session(user_id)
            }
            None => Vec::new(),
        }
    }

    fn login(&mut self, conn: ConnId, req: &Request) -> Dispatch {
        let name = match std::str::from_utf8(&req.msg) {
            Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                return Dispatch::reply(Response::bare(
                    ResponseCode::LoginFail,
                    GLOBAL_CHANNEL_ID,
                    0,
                ))
            }
        };

        let user_id = match self.sessions.login(conn, &name) {
            Ok(id) => id,
            Err(e) => {
                return Dispatch::reply(Response::bare(e.response_code(), GLOBAL_CHANNEL_ID, 0))
            }
        };

        // Setiap session otomatis member global channel
        let _ = self.channels.join(GLOBAL_CHANNEL_ID, user_id);
        if let Some(session) = self.sessions.get_mut(user_id) {
            session.member_of.insert(GLOBAL_CHANNEL_ID);
        }
        debug!(user_id, name = %name, "login");

        let fanout = self.broadcast(
            GLOBAL_CHANNEL_ID,
            user_id,
            ResponseCode::UserConnected,
            user_id,
            name.into_bytes(),
        );
        Dispatch {
            reply: Response::bare(ResponseCode::Success, GLOBAL_CHANNEL_ID, user_id),
            fanout,
        }
    }

    fn logout(&mut self, user_id: u16) -> Dispatch {
        debug!(user_id, "logout");
        let fanout = self.remove_session(user_id);
        Dispatch {
            reply: Response::bare(ResponseCode::Success, GLOBAL_CHANNEL_ID, user_id),
            fanout,
        }
    }

    fn get_users(&mut self, user_id: u16, req: &Request) -> Dispatch {
        let members = match self.channels.members_of(req.channel_id) {
            Ok(m) => m,
            Err(e) => {
                return Dispatch::reply(Response::bare(
                    e.response_code(),
                    req.channel_id,
                    user_id,
                ))
            }
        };

        // Satu record "<id> <name>" per baris, ascending user id.
        // Roster dipotong per baris utuh jika melebihi batas payload.
        let mut roster = String::new();
        for &uid in members {
            let Some(name) = self.sessions.name(uid) else {
                continue;
            };
            let line = format!("{} {}\n", uid, name);
            if roster.len() + line.len() > MAX_PAYLOAD {
                break;
            }
            roster.push_str(&line);
        }

        Dispatch::reply(Response::new(
            ResponseCode::UserList,
            req.channel_id,
            user_id,
            roster.into_bytes(),
        ))
    }

    fn create_channel(&mut self, user_id: u16, req: &Request) -> Dispatch {
        let fail =
            |code| Dispatch::reply(Response::bare(code, GLOBAL_CHANNEL_ID, user_id));

        // Payload: id list dipisah whitespace untuk pre-populate membership.
        // Satu token invalid menggagalkan seluruh request, tidak ada yang
        // dibuat (atomic seperti LOGIN).
        let Ok(list) = std::str::from_utf8(&req.msg) else {
            return fail(ResponseCode::InvalidId);
        };
        let mut members: BTreeSet<u16> = BTreeSet::new();
        members.insert(user_id);
        for token in list.split_ascii_whitespace() {
            let Ok(uid) = token.parse::<u16>() else {
                return fail(ResponseCode::InvalidId);
            };
            if self.sessions.get(uid).is_none() {
                return fail(ResponseCode::InvalidId);
            }
            members.insert(uid);
        }

        let channel_id = match self.channels.create(members.clone()) {
            Ok(id) => id,
            Err(e) => return fail(e.response_code()),
        };
        for &uid in &members {
            if let Some(session) = self.sessions.get_mut(uid) {
                session.member_of.insert(channel_id);
            }
        }
        debug!(channel_id, members = members.len(), "channel created");

        let mut fanout = Vec::new();
        for &uid in &members {
            if uid == user_id {
                continue;
            }
            let Some(conn) = self.sessions.conn_of(uid) else {
                continue;
            };
            let name = self.sessions.name(uid).unwrap_or_default();
            fanout.push((
                conn,
                Response::new(
                    ResponseCode::UserJoinedChannel,
                    channel_id,
                    uid,
                    name.as_bytes().to_vec(),
                ),
            ));
        }

        Dispatch {
            reply: Response::bare(ResponseCode::ChannelCreated, channel_id, user_id),
            fanout,
        }
    }

    fn join_channel(&mut self, user_id: u16, req: &Request) -> Dispatch {
        if let Err(e) = self.channels.join(req.channel_id, user_id) {
            return Dispatch::reply(Response::bare(e.response_code(), req.channel_id, user_id));
        }
        if let Some(session) = self.sessions.get_mut(user_id) {
            session.member_of.insert(req.channel_id);
        }
        debug!(user_id, channel_id = req.channel_id, "join");

        let name = self
            .sessions
            .name(user_id)
            .unwrap_or_default()
            .as_bytes()
            .to_vec();
        let fanout = self.broadcast(
            req.channel_id,
            user_id,
            ResponseCode::UserJoinedChannel,
            user_id,
            name,
        );
        Dispatch {
            reply: Response::bare(ResponseCode::UserJoinedChannel, req.channel_id, user_id),
            fanout,
        }
    }

    fn leave_channel(&mut self, user_id: u16, req: &Request) -> Dispatch {
        // Membership global channel implicit, tidak bisa ditinggalkan
        if req.channel_id == GLOBAL_CHANNEL_ID {
            return Dispatch::reply(Response::bare(
                ResponseCode::ChanEmpty,
                GLOBAL_CHANNEL_ID,
                user_id,
            ));
        }

        let destroyed = match self.channels.leave(req.channel_id, user_id) {
            Ok(d) => d,
            Err(e) => {
                return Dispatch::reply(Response::bare(
                    e.response_code(),
                    req.channel_id,
                    user_id,
                ))
            }
        };
        if let Some(session) = self.sessions.get_mut(user_id) {
            session.member_of.remove(&req.channel_id);
        }
        debug!(user_id, channel_id = req.channel_id, destroyed, "leave");

        let fanout = if destroyed {
            Vec::new()
        } else {
            let name = self
                .sessions
                .name(user_id)
                .unwrap_or_default()
                .as_bytes()
                .to_vec();
            self.broadcast(
                req.channel_id,
                user_id,
                ResponseCode::UserLeftChannel,
                user_id,
                name,
            )
        };
        Dispatch {
            reply: Response::bare(ResponseCode::UserLeftChannel, req.channel_id, user_id),
            fanout,
        }
    }

    fn send(&mut self, user_id: u16, req: &Request) -> Dispatch {
        let members = match self.channels.members_of(req.channel_id) {
            Ok(m) => m,
            Err(e) => {
                return Dispatch::reply(Response::bare(
                    e.response_code(),
                    req.channel_id,
                    user_id,
                ))
            }
        };
        if !members.contains(&user_id) {
            return Dispatch::reply(Response::bare(
                ResponseCode::SendFailed,
                req.channel_id,
                user_id,
            ));
        }

        // Satu MESSAGE per member lain; semua atau tidak sama sekali
        let fanout: Vec<(ConnId, Response)> = members
            .iter()
            .filter(|&&uid| uid != user_id)
            .filter_map(|&uid| self.sessions.conn_of(uid))
            .map(|conn| {
                (
                    conn,
                    Response::new(
                        ResponseCode::Message,
                        req.channel_id,
                        user_id,
                        req.msg.clone(),
                    ),
                )
            })
            .collect();
        if fanout.is_empty() {
            return Dispatch::reply(Response::bare(
                ResponseCode::SendFailed,
                req.channel_id,
                user_id,
            ));
        }

        Dispatch {
            reply: Response::bare(ResponseCode::Success, req.channel_id, user_id),
            fanout,
        }
    }

    /// Tutup session dan bersihkan membership di semua channel.
    /// Dipakai oleh LOGOUT eksplisit maupun disconnect.
    fn remove_session(&mut self, user_id: u16) -> Vec<(ConnId, Response)> {
        let Ok(session) = self.sessions.logout(user_id) else {
            return Vec::new();
        };
        for &channel_id in &session.member_of {
            if let Ok(destroyed) = self.channels.leave(channel_id, user_id) {
                if destroyed {
                    debug!(channel_id, "channel destroyed");
                }
            }
        }
        self.broadcast(
            GLOBAL_CHANNEL_ID,
            user_id,
            ResponseCode::UserDisconnected,
            user_id,
            session.name.into_bytes(),
        )
    }

    /// Response yang sama ke semua member channel kecuali `except`,
    /// teralamat ke connection masing-masing.
    fn broadcast(
        &self,
        channel_id: u16,
        except: u16,
        code: ResponseCode,
        subject: u16,
        msg: Vec<u8>,
    ) -> Vec<(ConnId, Response)> {
        let Ok(members) = self.channels.members_of(channel_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|&&uid| uid != except)
            .filter_map(|&uid| self.sessions.conn_of(uid))
            .map(|conn| (conn, Response::new(code, channel_id, subject, msg.clone())))
            .collect()
    }
}
