mod progress;
mod service;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use progress::{QuestionStatus, SessionPhase, SessionSnapshot, LOW_TIME_WARNING_SECS};
pub use service::{AttemptSession, TickOutcome};
