//! Write authority: the capability token that gates every graph mutation.
//!
//! A [`KernelAuthority`] mints exactly one [`WriteToken`] and keeps it. A
//! [`GraphStore`](crate::graph::GraphStore) is bound to one authority at
//! construction and only accepts that authority's token. The token cannot be
//! cloned, copied, or built outside this module, and the check compares the
//! identity of the issuing authority rather than any serialized content.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{KernelError, KernelResult};

static NEXT_AUTHORITY: AtomicU64 = AtomicU64::new(1);

/// Identity of the authority that minted a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuthorityId(u64);

/// Proof of write authority. Not `Clone`, not constructible outside this module.
#[derive(Debug)]
pub struct WriteToken {
    issuer: AuthorityId,
    _sealed: (),
}

/// Owner of a single write token.
#[derive(Debug)]
pub struct KernelAuthority {
    token: WriteToken,
}

impl KernelAuthority {
    /// Mint a fresh authority with a process-unique identity.
    pub fn new() -> Self {
        let issuer = AuthorityId(NEXT_AUTHORITY.fetch_add(1, Ordering::Relaxed));
        Self {
            token: WriteToken { issuer, _sealed: () },
        }
    }

    pub fn id(&self) -> AuthorityId {
        self.token.issuer
    }

    /// Borrow the token to prove possession to a store.
    pub fn token(&self) -> &WriteToken {
        &self.token
    }
}

impl Default for KernelAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteToken {
    /// Fail with [`KernelError::Authorization`] unless this token was minted by `expected`.
    pub fn require(&self, expected: AuthorityId, operation: &'static str) -> KernelResult<()> {
        if self.issuer == expected {
            Ok(())
        } else {
            Err(KernelError::Authorization { operation })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_accepted_by_its_own_authority() {
        let auth = KernelAuthority::new();
        assert!(auth.token().require(auth.id(), "create_symbol").is_ok());
    }

    #[test]
    fn foreign_token_rejected() {
        let owner = KernelAuthority::new();
        let intruder = KernelAuthority::new();
        let err = intruder
            .token()
            .require(owner.id(), "create_symbol")
            .unwrap_err();
        assert!(matches!(
            err,
            KernelError::Authorization { operation: "create_symbol" }
        ));
    }

    #[test]
    fn authorities_have_distinct_identities() {
        let a = KernelAuthority::new();
        let b = KernelAuthority::new();
        assert_ne!(a.id(), b.id());
    }
}
