//! Default [`DeconfigureChannel`] implementations: a `tracing`-backed one
//! for production (the host binds the real notification transport
//! elsewhere and simply watches the log), and a recording one for tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

use scheduler_kernel::{DeconfigureChannel, DeconfigureNotice};

/// Logs every deconfigure notice at `warn` level. A real deployment wires
/// the host's own event-bus client behind this trait instead; this
/// implementation exists so a cycle never blocks on an unconfigured
/// channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDeconfigureChannel;

#[async_trait]
impl DeconfigureChannel for LoggingDeconfigureChannel {
    async fn notify_deconfigure(&self, notice: DeconfigureNotice) {
        warn!(account = %notice.account, operation = %notice.operation, "account lost scheduler trust, deconfiguring");
    }
}

/// Records every notice it receives, for assertions in integration tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingDeconfigureChannel {
    notices: Arc<Mutex<Vec<DeconfigureNotice>>>,
}

impl RecordingDeconfigureChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<DeconfigureNotice> {
        self.notices.lock().clone()
    }
}

#[async_trait]
impl DeconfigureChannel for RecordingDeconfigureChannel {
    async fn notify_deconfigure(&self, notice: DeconfigureNotice) {
        self.notices.lock().push(notice);
    }
}
