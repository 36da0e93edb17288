//! Channel Registry
//!
//! Mapping dari channel id ke member set. Channel id naik monoton dari 1;
//! id 0 adalah global channel yang hidup selama process dan tidak pernah
//! di-destroy.

use std::collections::{BTreeSet, HashMap};

use super::RegistryError;

/// Channel yang setiap session join otomatis saat login
pub const GLOBAL_CHANNEL_ID: u16 = 0;

/// Satu channel: id plus member set (user id values)
#[derive(Debug, Clone)]
pub struct Channel {
    pub channel_id: u16,
    pub members: BTreeSet<u16>,
}

/// Registry untuk semua channel yang hidup
pub struct ChannelRegistry {
    channels: HashMap<u16, Channel>,
    next_channel_id: u32,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        let mut channels = HashMap::new();
        channels.insert(
            GLOBAL_CHANNEL_ID,
            Channel {
                channel_id: GLOBAL_CHANNEL_ID,
                members: BTreeSet::new(),
            },
        );
        Self {
            channels,
            next_channel_id: 1,
        }
    }

    /// Buat channel baru dengan initial member set.
    pub fn create(&mut self, members: BTreeSet<u16>) -> Result<u16, RegistryError> {
        let channel_id =
            u16::try_from(self.next_channel_id).map_err(|_| RegistryError::ChanIdOverflow)?;

        self.next_channel_id += 1;
        self.channels.insert(
            channel_id,
            Channel {
                channel_id,
                members,
            },
        );
        Ok(channel_id)
    }

    /// Tambah user ke member set. Idempotent untuk member yang sudah ada.
    pub fn join(&mut self, channel_id: u16, user_id: u16) -> Result<(), RegistryError> {
        let channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or(RegistryError::UnknownChannel(channel_id))?;
        channel.members.insert(user_id);
        Ok(())
    }

    /// Keluarkan user dari member set.
    ///
    /// Returns `true` jika member set menjadi kosong dan channel
    /// di-destroy. Global channel tidak pernah di-destroy.
    pub fn leave(&mut self, channel_id: u16, user_id: u16) -> Result<bool, RegistryError> {
        let channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or(RegistryError::UnknownChannel(channel_id))?;
        if !channel.members.remove(&user_id) {
            return Err(RegistryError::NotAMember {
                channel: channel_id,
                user: user_id,
            });
        }

        if channel.members.is_empty() && channel_id != GLOBAL_CHANNEL_ID {
            self.channels.remove(&channel_id);
            return Ok(true);
        }
        Ok(false)
    }

    /// Member set, sorted ascending (BTreeSet iteration order).
    pub fn members_of(&self, channel_id: u16) -> Result<&BTreeSet<u16>, RegistryError> {
        self.channels
            .get(&channel_id)
            .map(|c| &c.members)
            .ok_or(RegistryError::UnknownChannel(channel_id))
    }

    pub fn contains(&self, channel_id: u16) -> bool {
        self.channels.contains_key(&channel_id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u16]) -> BTreeSet<u16> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_global_channel_preexists() {
        let reg = ChannelRegistry::new();
        assert!(reg.contains(GLOBAL_CHANNEL_ID));
        assert!(reg.members_of(GLOBAL_CHANNEL_ID).unwrap().is_empty());
    }

    #[test]
    fn test_create_assigns_ascending_ids() {
        let mut reg = ChannelRegistry::new();
        assert_eq!(reg.create(set(&[1])).unwrap(), 1);
        assert_eq!(reg.create(set(&[2, 3])).unwrap(), 2);
        assert_eq!(reg.members_of(2).unwrap(), &set(&[2, 3]));
    }

    #[test]
    fn test_join_unknown_channel() {
        let mut reg = ChannelRegistry::new();
        assert_eq!(
            reg.join(999, 1),
            Err(RegistryError::UnknownChannel(999))
        );
    }

    #[test]
    fn test_leave_destroys_empty_channel() {
        let mut reg = ChannelRegistry::new();
        let id = reg.create(set(&[1, 2])).unwrap();

        assert!(!reg.leave(id, 1).unwrap());
        assert!(reg.leave(id, 2).unwrap());
        assert!(!reg.contains(id));

        // Id tidak dipakai ulang setelah destroy
        let next = reg.create(set(&[1])).unwrap();
        assert!(next > id);
    }

    #[test]
    fn test_leave_non_member() {
        let mut reg = ChannelRegistry::new();
        let id = reg.create(set(&[1])).unwrap();
        assert_eq!(
            reg.leave(id, 9),
            Err(RegistryError::NotAMember { channel: id, user: 9 })
        );
        assert!(reg.contains(id));
    }

    #[test]
    fn test_global_channel_survives_empty() {
        let mut reg = ChannelRegistry::new();
        reg.join(GLOBAL_CHANNEL_ID, 1).unwrap();
        assert!(!reg.leave(GLOBAL_CHANNEL_ID, 1).unwrap());
        assert!(reg.contains(GLOBAL_CHANNEL_ID));
    }
}
