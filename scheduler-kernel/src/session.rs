//! Account session provider — yields an authenticated session per target
//! account, draining a lazily-evaluated list of remote accounts with
//! partial-failure recovery.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use thiserror::Error;
use tracing::{info, warn};

use crate::bus::{DeconfigureChannel, DeconfigureNotice};

/// Errors assuming the cross-account scheduler role.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AssumeRoleError {
    /// The assuming principal has no trust relationship with this role
    /// (anymore). Per §4.4 this triggers a deconfigure notice.
    #[error("access denied assuming role '{role}' for account '{account}'")]
    AccessDenied { account: String, role: String },
    /// Any other assume-role failure (throttling, invalid ARN, network).
    #[error("failed to assume role '{role}' for account '{account}': {reason}")]
    Other {
        account: String,
        role: String,
        reason: String,
    },
}

/// Errors surfaced by [`SessionError`] at the session-provider boundary.
pub type SessionError = AssumeRoleError;

/// Abstracts the STS-style "assume a role, get back a session" call so the
/// kernel never depends on a concrete cloud SDK. `S` is the opaque session
/// type a concrete driver understands.
#[async_trait]
pub trait RoleAssumer<S>: Send + Sync {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        account: &str,
    ) -> Result<S, AssumeRoleError>;

    /// The session for the account hosting the scheduler itself — used when
    /// `schedule_lambda_account` is set. No role assumption is needed.
    fn host_session(&self) -> S;
}

/// One account yielded by the provider, paired with its session and (for
/// remote accounts) the role ARN that was assumed to obtain it.
#[derive(Debug, Clone)]
pub struct Account<S> {
    pub session: S,
    pub name: String,
    pub role: Option<String>,
}

/// Builds the cross-account scheduler role ARN:
/// `arn:<partition>:iam::<account>:role/<namespace>-<scheduler_role_name>`.
pub fn scheduler_role_arn(partition: &str, account: &str, namespace: &str, role_name: &str) -> String {
    format!("arn:{partition}:iam::{account}:role/{namespace}-{role_name}")
}

/// Builds the STS session name: `<service>-scheduler-<account>`.
pub fn session_name(service: &str, account: &str) -> String {
    format!("{service}-scheduler-{account}")
}

/// Parameters controlling how the account list is produced. Deliberately a
/// plain struct (not `SchedulerConfiguration` itself) so the session module
/// has no dependency on the config module.
#[derive(Debug, Clone)]
pub struct AccountListing {
    pub schedule_lambda_account: bool,
    pub host_account: String,
    pub remote_account_ids: Vec<String>,
    pub aws_partition: String,
    pub namespace: String,
    pub scheduler_role_name: String,
    pub service: String,
}

/// Produces the lazy sequence of [`Account`]s described in §4.4.
///
/// Laziness matters: a caller cancelling mid-iteration must not force the
/// remaining accounts' role-assumption calls to run.
pub fn accounts<'a, S: Send + 'a>(
    listing: AccountListing,
    assumer: Arc<dyn RoleAssumer<S> + 'a>,
    deconfigure: Arc<dyn DeconfigureChannel + 'a>,
) -> impl Stream<Item = Account<S>> + 'a {
    stream::unfold(
        (listing, assumer, deconfigure, 0usize, HashSet::<String>::new(), false),
        |(listing, assumer, deconfigure, mut index, mut seen, mut host_yielded)| async move {
            loop {
                if listing.schedule_lambda_account && !host_yielded {
                    host_yielded = true;
                    seen.insert(listing.host_account.clone());
                    let account = Account {
                        session: assumer.host_session(),
                        name: listing.host_account.clone(),
                        role: None,
                    };
                    return Some((account, (listing, assumer, deconfigure, index, seen, host_yielded)));
                }

                if index >= listing.remote_account_ids.len() {
                    return None;
                }
                let account_id = listing.remote_account_ids[index].clone();
                index += 1;

                if seen.contains(&account_id) {
                    warn!(account = %account_id, "account already processed, skipping duplicate");
                    continue;
                }
                seen.insert(account_id.clone());

                let role = scheduler_role_arn(
                    &listing.aws_partition,
                    &account_id,
                    &listing.namespace,
                    &listing.scheduler_role_name,
                );
                let session_name = session_name(&listing.service, &account_id);

                match assumer.assume_role(&role, &session_name, &account_id).await {
                    Ok(session) => {
                        let account = Account {
                            session,
                            name: account_id,
                            role: Some(role),
                        };
                        return Some((account, (listing, assumer, deconfigure, index, seen, host_yielded)));
                    }
                    Err(AssumeRoleError::AccessDenied { account, role }) => {
                        warn!(%account, %role, "assume-role access denied, deconfiguring account");
                        deconfigure
                            .notify_deconfigure(DeconfigureNotice::for_account(account))
                            .await;
                        continue;
                    }
                    Err(AssumeRoleError::Other { account, role, reason }) => {
                        tracing::error!(%account, %role, %reason, "failed to assume scheduler role, skipping account");
                        continue;
                    }
                }
            }
        },
    )
    .inspect(|account| info!(account = %account.name, "yielding account session"))
}
