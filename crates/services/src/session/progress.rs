use exam_core::model::{GradedAttempt, QuestionId};

use crate::error::SessionError;

/// Remaining seconds at or below which the snapshot raises its time warning,
/// giving the UI a visible warning phase before the forced auto-submission.
pub const LOW_TIME_WARNING_SECS: u64 = 60;

/// The externally visible lifecycle phase of an attempt session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Resolving or creating the attempt; questions not served yet.
    Initializing,
    /// Attempt running; answers are accepted.
    Active,
    /// A submission holds the gate; answers are frozen.
    Submitting,
    /// Finished, with either a graded result or a terminal error.
    Terminated,
}

/// Answered/unanswered flag for one question, for progress indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionStatus {
    pub question_id: QuestionId,
    pub answered: bool,
}

/// Aggregated view of the session for a UI collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    /// Remaining whole seconds, or `None` for untimed attempts.
    pub remaining_seconds: Option<u64>,
    /// True while active with less than a minute on the clock.
    pub time_warning: bool,
    pub questions: Vec<QuestionStatus>,
    pub outcome: Option<GradedAttempt>,
    pub error: Option<SessionError>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.questions.iter().filter(|status| status.answered).count()
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.phase == SessionPhase::Terminated
    }
}
