//! One-shot session shutdown signal.

use std::fmt;
use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

/// Why a session ended. Only the first trigger is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The client sent a stop message
    ClientStop,
    /// The client socket closed or errored
    ClientDisconnected,
    /// The upstream socket closed or errored
    UpstreamClosed,
    /// Upstream never confirmed setup in time
    HandshakeTimeout,
    /// Token acquisition or the upstream connect failed
    ConnectFailed,
    /// A worker returned an error or panicked
    WorkerFault,
}

impl ShutdownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientStop => "client_stop",
            Self::ClientDisconnected => "client_disconnected",
            Self::UpstreamClosed => "upstream_closed",
            Self::HandshakeTimeout => "handshake_timeout",
            Self::ConnectFailed => "connect_failed",
            Self::WorkerFault => "worker_fault",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared latch that any worker can trip.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
    reason: OnceLock<ShutdownReason>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the latch. Returns `true` only for the call that actually did.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        if self.reason.set(reason).is_err() {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.reason.get().is_some()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
