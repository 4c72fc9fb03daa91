//! Deconfigure side channel — a named outbound event the engine publishes to
//! when an account's cross-account trust has gone away.
//!
//! The source system self-invokes its own Lambda asynchronously to carry
//! this notice; we re-architect that as a message-bus publish so the host
//! binds the channel to its own entry point instead of the engine knowing
//! how to invoke anything.

use async_trait::async_trait;

/// Payload published when an account must be removed from scheduling
/// configuration because the scheduler role could no longer be assumed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeconfigureNotice {
    pub account: String,
    pub detail_type: String,
    pub operation: String,
}

impl DeconfigureNotice {
    /// Builds the notice carrying `{account, "Parameter Store Change", {operation: "Delete"}}`,
    /// matching the wire shape the host's configuration subsystem expects.
    pub fn for_account(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            detail_type: "Parameter Store Change".to_string(),
            operation: "Delete".to_string(),
        }
    }
}

/// A fire-and-forget outbound channel for [`DeconfigureNotice`]s.
///
/// Implementations must not block the caller on delivery confirmation and
/// must not propagate delivery failures back into the scheduling cycle —
/// the account is already being skipped for this cycle regardless of
/// whether the notice lands.
#[async_trait]
pub trait DeconfigureChannel: Send + Sync {
    async fn notify_deconfigure(&self, notice: DeconfigureNotice);
}
