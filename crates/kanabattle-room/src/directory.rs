//! The room directory: which code points at which running room.

use std::collections::HashMap;

use kanabattle_protocol::RoomCode;
use rand::Rng;

use crate::RoomHandle;

/// Live rooms, keyed by code.
///
/// Plain `HashMap`; the [`Hub`](crate::Hub) wraps it in a lock.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<RoomCode, RoomHandle>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws random codes until one is not in use.
    ///
    /// Call under the same lock as the following [`insert`](Self::insert)
    /// so nobody can claim the code in between.
    pub fn unused_code(&self) -> RoomCode {
        let mut rng = rand::rng();
        loop {
            let code = random_code(&mut rng);
            if !self.rooms.contains_key(&code) {
                return code;
            }
            tracing::debug!(%code, "room code collision, retrying");
        }
    }

    pub fn insert(&mut self, handle: RoomHandle) {
        self.rooms.insert(handle.code().clone(), handle);
    }

    pub fn get(&self, code: &RoomCode) -> Option<&RoomHandle> {
        self.rooms.get(code)
    }

    /// Removes `code` only if it still refers to the room with `instance`.
    ///
    /// Returns `true` if an entry was removed.
    pub(crate) fn remove_instance(&mut self, code: &RoomCode, instance: u64) -> bool {
        match self.rooms.get(code) {
            Some(handle) if handle.instance() == instance => {
                self.rooms.remove(code);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, code: &RoomCode) -> bool {
        self.rooms.contains_key(code)
    }

    pub fn codes(&self) -> Vec<RoomCode> {
        self.rooms.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

/// Six uppercase hex characters, e.g. `"3FA9C1"`.
fn random_code(rng: &mut impl Rng) -> RoomCode {
    let bytes: [u8; 3] = rng.random();
    let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
    RoomCode::new(&hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_code_shape() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let code = random_code(&mut rng);
            assert_eq!(code.as_str().len(), 6);
            assert!(
                code.as_str()
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)),
                "unexpected code {code}"
            );
        }
    }

    #[test]
    fn test_unused_code_on_empty_directory() {
        let directory = RoomDirectory::new();
        let code = directory.unused_code();
        assert!(!directory.contains(&code));
        assert!(directory.is_empty());
    }
}
