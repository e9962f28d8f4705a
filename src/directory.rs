use std::io;
use std::path::Path;

use dashmap::DashMap;

use crate::limits::MAX_USER_ID_LEN;
use crate::model::{Role, User, UserId};

/// Who the household members are and what role each holds.
pub trait UserDirectory: Send + Sync {
    fn find_user(&self, id: &str) -> Option<User>;

    fn role(&self, id: &str) -> Option<Role> {
        self.find_user(id).map(|u| u.role)
    }
}

#[derive(Default)]
pub struct InMemoryDirectory {
    users: DashMap<UserId, User>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let dir = Self::new();
        for u in users {
            dir.upsert(u);
        }
        dir
    }

    /// Load a JSON array of users. A missing file yields an empty directory.
    pub fn load(path: &Path) -> io::Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("no user directory at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(e),
        };
        let users: Vec<User> = serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(bad) = users.iter().find(|u| u.id.is_empty() || u.id.len() > MAX_USER_ID_LEN) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad user id '{}'", bad.id),
            ));
        }
        tracing::info!("loaded {} users from {}", users.len(), path.display());
        Ok(Self::with_users(users))
    }

    pub fn upsert(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for InMemoryDirectory {
    fn find_user(&self, id: &str) -> Option<User> {
        self.users.get(id).map(|e| e.value().clone())
    }
}
