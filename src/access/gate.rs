//! Command authorization against the admin identity and the allow-list

use std::collections::BTreeSet;

use crate::access::store::AllowListStore;
use crate::error::{Error, PermissionError, Result};
use crate::protocol::UserId;

/// Outcome of an allow-list mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Added,
    AlreadyPresent,
    Removed,
    NotPresent,
}

pub struct AccessGate {
    admin: UserId,
    allowed: BTreeSet<UserId>,
    store: Box<dyn AllowListStore>,
}

impl AccessGate {
    /// Load the allow-list once; the admin is never stored in it
    pub fn new(admin: UserId, store: Box<dyn AllowListStore>) -> Self {
        let mut allowed = store.load();
        allowed.remove(&admin);
        tracing::info!(admin = %admin, allowed = allowed.len(), "Access gate loaded");
        Self {
            admin,
            allowed,
            store,
        }
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        user == self.admin
    }

    pub fn is_allowed(&self, user: UserId) -> bool {
        self.is_admin(user) || self.allowed.contains(&user)
    }

    fn require_admin(&self, actor: UserId) -> std::result::Result<(), PermissionError> {
        if self.is_admin(actor) {
            Ok(())
        } else {
            tracing::warn!(actor = %actor, "Admin operation denied");
            Err(PermissionError::AdminOnly)
        }
    }

    pub fn add(&mut self, actor: UserId, user: UserId) -> Result<Membership> {
        self.require_admin(actor)?;
        if self.is_admin(user) || self.allowed.contains(&user) {
            return Ok(Membership::AlreadyPresent);
        }
        self.allowed.insert(user);
        if let Err(e) = self.store.save(&self.allowed) {
            self.allowed.remove(&user);
            return Err(Error::Io(e));
        }
        tracing::info!(user = %user, "User allowed");
        Ok(Membership::Added)
    }

    pub fn remove(&mut self, actor: UserId, user: UserId) -> Result<Membership> {
        self.require_admin(actor)?;
        if !self.allowed.remove(&user) {
            return Ok(Membership::NotPresent);
        }
        if let Err(e) = self.store.save(&self.allowed) {
            self.allowed.insert(user);
            return Err(Error::Io(e));
        }
        tracing::info!(user = %user, "User removed from allow-list");
        Ok(Membership::Removed)
    }

    pub fn list(&self, actor: UserId) -> std::result::Result<Vec<UserId>, PermissionError> {
        self.require_admin(actor)?;
        Ok(self.allowed.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;

    const ADMIN: UserId = UserId(1);

    #[derive(Clone, Default)]
    struct MemoryStore {
        saved: Arc<Mutex<Vec<BTreeSet<UserId>>>>,
        initial: BTreeSet<UserId>,
        fail: bool,
    }

    impl AllowListStore for MemoryStore {
        fn load(&self) -> BTreeSet<UserId> {
            self.initial.clone()
        }

        fn save(&self, users: &BTreeSet<UserId>) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
            }
            self.saved.lock().push(users.clone());
            Ok(())
        }
    }

    #[test]
    fn test_admin_always_allowed_and_never_stored() {
        let store = MemoryStore {
            initial: [ADMIN, UserId(5)].into_iter().collect(),
            ..Default::default()
        };
        let mut gate = AccessGate::new(ADMIN, Box::new(store.clone()));

        assert!(gate.is_allowed(ADMIN));
        assert!(gate.is_allowed(UserId(5)));
        assert!(!gate.is_allowed(UserId(6)));
        assert_eq!(gate.list(ADMIN).unwrap(), vec![UserId(5)]);

        assert_eq!(gate.add(ADMIN, ADMIN).unwrap(), Membership::AlreadyPresent);
        assert!(store.saved.lock().is_empty());
    }

    #[test]
    fn test_mutations_are_idempotent() {
        let store = MemoryStore::default();
        let mut gate = AccessGate::new(ADMIN, Box::new(store.clone()));

        assert_eq!(gate.add(ADMIN, UserId(9)).unwrap(), Membership::Added);
        assert_eq!(gate.add(ADMIN, UserId(9)).unwrap(), Membership::AlreadyPresent);
        assert_eq!(gate.remove(ADMIN, UserId(9)).unwrap(), Membership::Removed);
        assert_eq!(gate.remove(ADMIN, UserId(9)).unwrap(), Membership::NotPresent);

        // Only the two real changes were written
        assert_eq!(store.saved.lock().len(), 2);
    }

    #[test]
    fn test_non_admin_is_denied_without_side_effects() {
        let store = MemoryStore::default();
        let mut gate = AccessGate::new(ADMIN, Box::new(store.clone()));
        gate.add(ADMIN, UserId(2)).unwrap();

        let intruder = UserId(2);
        assert!(matches!(
            gate.add(intruder, UserId(3)),
            Err(Error::Permission(PermissionError::AdminOnly))
        ));
        assert!(matches!(
            gate.remove(intruder, UserId(2)),
            Err(Error::Permission(PermissionError::AdminOnly))
        ));
        assert_eq!(gate.list(intruder), Err(PermissionError::AdminOnly));
        assert!(!gate.is_allowed(UserId(3)));
        assert_eq!(store.saved.lock().len(), 1);
    }

    #[test]
    fn test_failed_save_rolls_back() {
        let store = MemoryStore {
            fail: true,
            ..Default::default()
        };
        let mut gate = AccessGate::new(ADMIN, Box::new(store));
        assert!(matches!(gate.add(ADMIN, UserId(4)), Err(Error::Io(_))));
        assert!(!gate.is_allowed(UserId(4)));
    }
}
