pub mod live;
pub mod session;
pub mod transport;

pub use live::{GeminiLiveConnector, LiveConnector, LiveError, LiveEvent, LiveSetupConfig};
pub use session::{LiveSession, SessionConfig, SessionError, SessionOutcome, ShutdownReason};
pub use transport::{CloseInfo, Frame, Transport, TransportError};
