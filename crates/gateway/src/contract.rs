use async_trait::async_trait;

use exam_core::model::{
    Attempt, AttemptId, GradedAttempt, SanitizedQuestion, StudentId, SubmittedAnswer, TestId,
};

use crate::error::GatewayError;

/// Contract the attempt session consumes from the portal backend.
///
/// A gateway is bound to one authenticated test-taker; identity never travels
/// in the request payloads. Implementations must uphold the server-side
/// invariant that at most one in-progress attempt exists per (test-taker,
/// test) pair, and that each attempt is graded exactly once.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// The authenticated test-taker this gateway acts for.
    fn actor(&self) -> StudentId;

    /// Looks up a live attempt for the given test, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` on transport or server failures. An absent
    /// attempt is `Ok(None)`, not an error.
    async fn find_in_progress(&self, test_id: TestId) -> Result<Option<Attempt>, GatewayError>;

    /// Starts a new attempt, or returns the live one if it already exists.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::AttemptLimitExceeded` when the test-taker has
    /// used up all attempts, `GatewayError::TestInactive` for deactivated
    /// tests, or other `GatewayError` values on failure.
    async fn start_attempt(&self, test_id: TestId) -> Result<Attempt, GatewayError>;

    /// Fetches the attempt's question set with correctness flags stripped.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::AttemptNotFound` if the attempt is gone or no
    /// longer in progress.
    async fn fetch_questions(
        &self,
        test_id: TestId,
        attempt_id: AttemptId,
    ) -> Result<Vec<SanitizedQuestion>, GatewayError>;

    /// Submits answers for grading.
    ///
    /// `forced` marks a deadline-driven auto-submission; a non-forced submit
    /// past the deadline fails with `GatewayError::DeadlineExceeded`.
    /// Submission is idempotent: resubmitting a graded attempt returns the
    /// original result.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` on rejection or transport failure.
    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &[SubmittedAnswer],
        forced: bool,
    ) -> Result<GradedAttempt, GatewayError>;
}
