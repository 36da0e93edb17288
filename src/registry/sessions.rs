//! Session Registry
//!
//! Mapping dari connection handle ke identitas user yang sudah login.
//! User id naik monoton dari 1 dan tidak pernah dipakai ulang selama
//! process hidup.

use std::collections::{BTreeSet, HashMap};

use super::{ConnId, RegistryError};

/// Server-side record untuk satu connection yang sudah login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: u16,
    pub conn: ConnId,
    pub name: String,
    /// Channel yang diikuti; selalu konsisten dengan member set di
    /// ChannelRegistry (membership symmetry).
    pub member_of: BTreeSet<u16>,
}

/// Registry untuk semua session yang hidup
pub struct SessionRegistry {
    sessions: HashMap<u16, Session>,
    by_conn: HashMap<ConnId, u16>,
    // u32 supaya id u16 terakhir tetap terpakai sebelum exhausted
    next_user_id: u32,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            by_conn: HashMap::new(),
            next_user_id: 1,
            capacity,
        }
    }

    /// Buka session untuk `conn` dengan display name.
    ///
    /// Registrasi atomic: gagal berarti tidak ada state yang berubah.
    pub fn login(&mut self, conn: ConnId, name: &str) -> Result<u16, RegistryError> {
        if self.by_conn.contains_key(&conn) {
            return Err(RegistryError::AlreadyLoggedIn);
        }
        if self.sessions.len() >= self.capacity {
            return Err(RegistryError::ServerFull);
        }
        let user_id = u16::try_from(self.next_user_id).map_err(|_| RegistryError::ServerFull)?;

        self.next_user_id += 1;
        self.by_conn.insert(conn, user_id);
        self.sessions.insert(
            user_id,
            Session {
                user_id,
                conn,
                name: name.to_string(),
                member_of: BTreeSet::new(),
            },
        );
        Ok(user_id)
    }

    /// Tutup session dan kembalikan record-nya, termasuk `member_of`,
    /// supaya caller bisa membersihkan ChannelRegistry.
    pub fn logout(&mut self, user_id: u16) -> Result<Session, RegistryError> {
        let session = self
            .sessions
            .remove(&user_id)
            .ok_or(RegistryError::UnknownUser(user_id))?;
        self.by_conn.remove(&session.conn);
        Ok(session)
    }

    /// User id untuk connection handle, jika sudah login.
    #[inline(always)]
    pub fn lookup(&self, conn: ConnId) -> Option<u16> {
        self.by_conn.get(&conn).copied()
    }

    pub fn get(&self, user_id: u16) -> Option<&Session> {
        self.sessions.get(&user_id)
    }

    pub fn get_mut(&mut self, user_id: u16) -> Option<&mut Session> {
        self.sessions.get_mut(&user_id)
    }

    pub fn name(&self, user_id: u16) -> Option<&str> {
        self.sessions.get(&user_id).map(|s| s.name.as_str())
    }

    /// Connection handle untuk fan-out addressing.
    pub fn conn_of(&self, user_id: u16) -> Option<ConnId> {
        self.sessions.get(&user_id).map(|s| s.conn)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }
}
