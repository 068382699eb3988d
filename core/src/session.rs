use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};

use crate::db::Database;

/// The store handle shared by the chat session, the reconciler and sync.
/// Guards are never held across an `.await`.
pub type SharedDatabase = Arc<Mutex<Database>>;

#[must_use]
pub fn shared(db: Database) -> SharedDatabase {
    Arc::new(Mutex::new(db))
}

pub(crate) fn lock(db: &SharedDatabase) -> Result<MutexGuard<'_, Database>> {
    db.lock().map_err(|_| anyhow!("local store lock poisoned"))
}

/// The user a reconciliation or sync pass acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// Load the persisted local user id, creating it on first run.
    pub fn load(db: &Database) -> Result<Self> {
        Ok(Self::new(db.get_or_create_user_id()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_is_stable() {
        let db = Database::open_in_memory().unwrap();
        let first = Session::load(&db).unwrap();
        let second = Session::load(&db).unwrap();
        assert_eq!(first, second);
        assert!(!first.user_id.is_empty());
    }

    #[test]
    fn test_shared_handle_locks() {
        let db = shared(Database::open_in_memory().unwrap());
        let guard = lock(&db).unwrap();
        assert!(guard.get_setting("missing").unwrap().is_none());
    }
}
