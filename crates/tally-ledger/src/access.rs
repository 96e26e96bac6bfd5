//! Admin capability for pool registration.
//!
//! Registration takes an [`AdminToken`] rather than a caller identity. The
//! only way to obtain a token is [`AdminToken::authorize`], which consults
//! an [`AccessControl`] predicate.

use std::collections::BTreeSet;

use crate::{LedgerError, Result, UserId};

/// Decides whether a caller may perform privileged operations.
pub trait AccessControl {
    /// Whether `caller` is an administrator.
    fn is_admin(&self, caller: &UserId) -> bool;
}

/// Fixed set of administrator ids.
#[derive(Debug, Clone, Default)]
pub struct AdminList {
    admins: BTreeSet<UserId>,
}

impl AdminList {
    /// Build from any collection of admin ids.
    pub fn new(admins: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }

    /// Number of configured admins.
    pub fn len(&self) -> usize {
        self.admins.len()
    }

    /// Whether no admin is configured.
    pub fn is_empty(&self) -> bool {
        self.admins.is_empty()
    }
}

impl AccessControl for AdminList {
    fn is_admin(&self, caller: &UserId) -> bool {
        self.admins.contains(caller)
    }
}

/// Proof that the holder passed the admin check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminToken {
    admin: UserId,
}

impl AdminToken {
    /// Check `caller` against `acl` and issue a token.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if `caller` is not an admin
    pub fn authorize(caller: &UserId, acl: &dyn AccessControl) -> Result<Self> {
        if !acl.is_admin(caller) {
            tracing::warn!(caller = %hex::encode(caller), "admin check failed");
            return Err(LedgerError::Unauthorized(hex::encode(caller)));
        }
        Ok(Self { admin: *caller })
    }

    /// The admin the token was issued to.
    pub fn admin(&self) -> &UserId {
        &self.admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_authorized() {
        let acl = AdminList::new([[0xAA; 32]]);
        let token = AdminToken::authorize(&[0xAA; 32], &acl).expect("admin");
        assert_eq!(token.admin(), &[0xAA; 32]);
    }

    #[test]
    fn test_non_admin_rejected() {
        let acl = AdminList::new([[0xAA; 32]]);
        let result = AdminToken::authorize(&[0x01; 32], &acl);
        assert!(matches!(result, Err(LedgerError::Unauthorized(_))));
    }

    #[test]
    fn test_empty_list_rejects_everyone() {
        let acl = AdminList::default();
        assert!(acl.is_empty());
        assert!(AdminToken::authorize(&[0x00; 32], &acl).is_err());
    }
}
