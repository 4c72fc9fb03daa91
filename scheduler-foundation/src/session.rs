//! A configurable [`RoleAssumer`] for single-process deployments and tests.
//!
//! A real cross-account deployment assumes a role via STS; this
//! implementation hands back a caller-supplied session value directly,
//! optionally simulating access-denied or other failures for specific
//! accounts so integration tests can exercise the §4.4 failure paths
//! without a live cloud account.

use std::collections::HashSet;

use async_trait::async_trait;

use scheduler_kernel::{AssumeRoleError, RoleAssumer};

/// A [`RoleAssumer`] over a fixed session type `Sess: Clone`, with optional
/// per-account failure injection.
pub struct StaticRoleAssumer<Sess> {
    host_session: Sess,
    remote_session: Sess,
    denied_accounts: HashSet<String>,
    failing_accounts: HashSet<String>,
}

impl<Sess: Clone> StaticRoleAssumer<Sess> {
    pub fn new(host_session: Sess, remote_session: Sess) -> Self {
        Self {
            host_session,
            remote_session,
            denied_accounts: HashSet::new(),
            failing_accounts: HashSet::new(),
        }
    }

    /// Accounts that should fail assume-role with access-denied, triggering
    /// the §4.4 deconfigure path.
    pub fn with_denied_accounts(mut self, accounts: impl IntoIterator<Item = String>) -> Self {
        self.denied_accounts = accounts.into_iter().collect();
        self
    }

    /// Accounts that should fail assume-role with a non-access-denied
    /// error (throttling, invalid role, ...).
    pub fn with_failing_accounts(mut self, accounts: impl IntoIterator<Item = String>) -> Self {
        self.failing_accounts = accounts.into_iter().collect();
        self
    }
}

#[async_trait]
impl<Sess: Clone + Send + Sync> RoleAssumer<Sess> for StaticRoleAssumer<Sess> {
    async fn assume_role(&self, role_arn: &str, _session_name: &str, account: &str) -> Result<Sess, AssumeRoleError> {
        if self.denied_accounts.contains(account) {
            return Err(AssumeRoleError::AccessDenied {
                account: account.to_string(),
                role: role_arn.to_string(),
            });
        }
        if self.failing_accounts.contains(account) {
            return Err(AssumeRoleError::Other {
                account: account.to_string(),
                role: role_arn.to_string(),
                reason: "simulated failure".to_string(),
            });
        }
        Ok(self.remote_session.clone())
    }

    fn host_session(&self) -> Sess {
        self.host_session.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn denied_account_yields_access_denied() {
        let assumer = StaticRoleAssumer::new("host".to_string(), "remote".to_string())
            .with_denied_accounts(["111122223333".to_string()]);
        let err = assumer
            .assume_role("arn:aws:iam::111122223333:role/x", "session", "111122223333")
            .await
            .unwrap_err();
        assert!(matches!(err, AssumeRoleError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn undeclared_account_succeeds() {
        let assumer = StaticRoleAssumer::new("host".to_string(), "remote".to_string());
        let session = assumer
            .assume_role("arn:aws:iam::111122223333:role/x", "session", "111122223333")
            .await
            .unwrap();
        assert_eq!(session, "remote");
    }
}
