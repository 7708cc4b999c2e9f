use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::model::ids::{AttemptId, StudentId, TestId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("deadline is before the attempt start")]
    DeadlineBeforeStart,

    #[error("attempt number must be >= 1")]
    InvalidAttemptNumber,

    #[error("attempt already submitted")]
    AlreadySubmitted,
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// Lifecycle status of an attempt. Moves from `InProgress` to `Submitted`
/// exactly once and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    InProgress,
    Submitted,
}

/// One test-taker working through one test, from start to submission.
///
/// The deadline is absolute (`started_at` plus the test's time limit); the
/// remaining budget is always derived from it rather than counted down, so a
/// resumed attempt picks up the true remaining time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    id: AttemptId,
    test_id: TestId,
    student_id: StudentId,
    status: AttemptStatus,
    started_at: DateTime<Utc>,
    deadline: Option<DateTime<Utc>>,
    attempt_number: u32,
}

impl Attempt {
    /// Creates a fresh in-progress attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::DeadlineBeforeStart` if the deadline precedes
    /// `started_at`, or `AttemptError::InvalidAttemptNumber` for a zero
    /// attempt number.
    pub fn new(
        id: AttemptId,
        test_id: TestId,
        student_id: StudentId,
        started_at: DateTime<Utc>,
        deadline: Option<DateTime<Utc>>,
        attempt_number: u32,
    ) -> Result<Self, AttemptError> {
        if let Some(deadline) = deadline {
            if deadline < started_at {
                return Err(AttemptError::DeadlineBeforeStart);
            }
        }
        if attempt_number == 0 {
            return Err(AttemptError::InvalidAttemptNumber);
        }

        Ok(Self {
            id,
            test_id,
            student_id,
            status: AttemptStatus::InProgress,
            started_at,
            deadline,
            attempt_number,
        })
    }

    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    #[must_use]
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }

    /// Remaining time budget at `now`, clamped to zero. `None` for untimed
    /// attempts.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.deadline
            .map(|deadline| (deadline - now).max(Duration::zero()))
    }

    /// Whether the deadline has passed at `now`. Untimed attempts never
    /// expire.
    #[must_use]
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| now > deadline)
    }

    /// Transitions the attempt to `Submitted`.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadySubmitted` on a repeat transition; the
    /// move happens exactly once.
    pub fn mark_submitted(&mut self) -> Result<(), AttemptError> {
        if self.status == AttemptStatus::Submitted {
            return Err(AttemptError::AlreadySubmitted);
        }
        self.status = AttemptStatus::Submitted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn build_attempt(deadline: Option<DateTime<Utc>>) -> Attempt {
        Attempt::new(
            AttemptId::new(1),
            TestId::new(2),
            StudentId::new(3),
            fixed_now(),
            deadline,
            1,
        )
        .unwrap()
    }

    #[test]
    fn rejects_deadline_before_start() {
        let err = Attempt::new(
            AttemptId::new(1),
            TestId::new(2),
            StudentId::new(3),
            fixed_now(),
            Some(fixed_now() - Duration::seconds(1)),
            1,
        )
        .unwrap_err();
        assert_eq!(err, AttemptError::DeadlineBeforeStart);
    }

    #[test]
    fn remaining_clamps_to_zero() {
        let attempt = build_attempt(Some(fixed_now() + Duration::minutes(10)));

        let before = attempt.remaining_at(fixed_now() + Duration::minutes(4));
        assert_eq!(before, Some(Duration::minutes(6)));

        let after = attempt.remaining_at(fixed_now() + Duration::minutes(11));
        assert_eq!(after, Some(Duration::zero()));
    }

    #[test]
    fn untimed_attempt_never_expires() {
        let attempt = build_attempt(None);
        assert_eq!(attempt.remaining_at(fixed_now()), None);
        assert!(!attempt.has_expired(fixed_now() + Duration::days(365)));
    }

    #[test]
    fn submission_happens_once() {
        let mut attempt = build_attempt(None);
        assert!(attempt.is_in_progress());
        attempt.mark_submitted().unwrap();
        assert_eq!(attempt.status(), AttemptStatus::Submitted);
        assert_eq!(
            attempt.mark_submitted().unwrap_err(),
            AttemptError::AlreadySubmitted
        );
    }
}
