#![forbid(unsafe_code)]

pub mod answer_store;
pub mod error;
pub mod session;

pub use exam_core::Clock;

pub use answer_store::AnswerStore;
pub use error::SessionError;
pub use session::{
    AttemptSession, QuestionStatus, SessionPhase, SessionSnapshot, TickOutcome,
    LOW_TIME_WARNING_SECS,
};
