//! Client session handling: staging, control messages and orchestration.

pub mod buffer;
pub mod control;
mod error;
pub mod orchestrator;
pub mod shutdown;

pub use buffer::{AudioStagingBuffer, STAGING_CAPACITY, StagingGate};
pub use control::{ClientMessage, ControlMessage};
pub use error::{SessionError, SessionResult};
pub use orchestrator::{LiveSession, SessionConfig, SessionOutcome, SessionPhase};
pub use shutdown::{ShutdownReason, ShutdownSignal};
