use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Duration;
use rand::rng;
use rand::seq::SliceRandom;

use exam_core::model::{
    Attempt, AttemptId, GradedAttempt, Question, QuestionId, SanitizedQuestion, StudentId,
    SubmittedAnswer, TestDefinition, TestId,
};
use exam_core::scoring;
use exam_core::time::Clock;

use crate::contract::SessionGateway;
use crate::error::GatewayError;

//
// ─── SERVER STATE ──────────────────────────────────────────────────────────────
//

struct AttemptRecord {
    attempt: Attempt,
    /// The question subset pinned to this attempt, in served order.
    question_ids: Vec<QuestionId>,
    max_score: u32,
    graded: Option<GradedAttempt>,
}

struct PortalState {
    clock: Clock,
    tests: HashMap<TestId, TestDefinition>,
    attempts: HashMap<AttemptId, AttemptRecord>,
    next_attempt_id: u64,
}

/// Reference implementation of the portal backend, held entirely in memory.
///
/// All handles cloned from one gateway share the same server state, so two
/// handles with the same actor model two browser tabs of one test-taker. The
/// at-most-one-in-progress-attempt invariant is enforced under a single lock:
/// `start_attempt` returns the live attempt instead of creating a second one.
pub struct InMemoryGateway {
    actor: StudentId,
    state: Arc<Mutex<PortalState>>,
}

impl InMemoryGateway {
    #[must_use]
    pub fn new(actor: StudentId, clock: Clock) -> Self {
        Self {
            actor,
            state: Arc::new(Mutex::new(PortalState {
                clock,
                tests: HashMap::new(),
                attempts: HashMap::new(),
                next_attempt_id: 1,
            })),
        }
    }

    /// A second handle onto the same server state, acting as `actor`.
    #[must_use]
    pub fn handle_for(&self, actor: StudentId) -> Self {
        Self {
            actor,
            state: Arc::clone(&self.state),
        }
    }

    /// Seeds or replaces a test definition.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Internal` if the state lock is poisoned.
    pub fn insert_test(&self, test: TestDefinition) -> Result<(), GatewayError> {
        let mut state = self.lock()?;
        state.tests.insert(test.id(), test);
        Ok(())
    }

    /// Deactivates a test; running attempts keep going, new starts fail.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::TestNotFound` if the test is unknown.
    pub fn deactivate_test(&self, test_id: TestId) -> Result<(), GatewayError> {
        let mut state = self.lock()?;
        let test = state
            .tests
            .get_mut(&test_id)
            .ok_or(GatewayError::TestNotFound)?;
        test.deactivate();
        Ok(())
    }

    /// Moves the server clock forward. Only meaningful for fixed clocks.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Internal` if the state lock is poisoned.
    pub fn advance_clock(&self, delta: Duration) -> Result<(), GatewayError> {
        let mut state = self.lock()?;
        state.clock.advance(delta);
        Ok(())
    }

    /// Total attempts on record for (`actor`, `test_id`), any status.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Internal` if the state lock is poisoned.
    pub fn attempt_count(&self, test_id: TestId) -> Result<usize, GatewayError> {
        let state = self.lock()?;
        Ok(state
            .attempts
            .values()
            .filter(|record| {
                record.attempt.test_id() == test_id && record.attempt.student_id() == self.actor
            })
            .count())
    }

    fn lock(&self) -> Result<MutexGuard<'_, PortalState>, GatewayError> {
        self.state
            .lock()
            .map_err(|err| GatewayError::Internal(err.to_string()))
    }

    fn create_attempt(
        state: &mut PortalState,
        test: &TestDefinition,
        actor: StudentId,
        attempt_number: u32,
    ) -> Result<Attempt, GatewayError> {
        let now = state.clock.now();
        let deadline = test
            .time_limit_minutes()
            .map(|minutes| now + Duration::minutes(i64::from(minutes)));

        let id = AttemptId::new(state.next_attempt_id);
        state.next_attempt_id += 1;

        let attempt = Attempt::new(id, test.id(), actor, now, deadline, attempt_number)
            .map_err(|err| GatewayError::Internal(err.to_string()))?;

        let question_ids = sample_question_ids(test);
        let max_score = test
            .questions()
            .iter()
            .filter(|question| question_ids.contains(&question.id()))
            .map(Question::points)
            .fold(0_u32, u32::saturating_add);

        tracing::debug!(
            test = %test.id(),
            attempt = %id,
            attempt_number,
            questions = question_ids.len(),
            "created attempt"
        );
        state.attempts.insert(
            id,
            AttemptRecord {
                attempt: attempt.clone(),
                question_ids,
                max_score,
                graded: None,
            },
        );
        Ok(attempt)
    }
}

/// Draws the question subset for a new attempt: the full set in authored
/// order, or a random sample when the test limits questions per attempt.
fn sample_question_ids(test: &TestDefinition) -> Vec<QuestionId> {
    let mut ids: Vec<QuestionId> = test.questions().iter().map(Question::id).collect();
    let sample = test.sample_size();
    if sample < ids.len() {
        let mut rng = rng();
        ids.as_mut_slice().shuffle(&mut rng);
        ids.truncate(sample);
    }
    ids
}

//
// ─── GATEWAY CONTRACT ──────────────────────────────────────────────────────────
//

#[async_trait]
impl SessionGateway for InMemoryGateway {
    fn actor(&self) -> StudentId {
        self.actor
    }

    async fn find_in_progress(&self, test_id: TestId) -> Result<Option<Attempt>, GatewayError> {
        let state = self.lock()?;
        Ok(state
            .attempts
            .values()
            .find(|record| {
                record.attempt.test_id() == test_id
                    && record.attempt.student_id() == self.actor
                    && record.attempt.is_in_progress()
            })
            .map(|record| record.attempt.clone()))
    }

    async fn start_attempt(&self, test_id: TestId) -> Result<Attempt, GatewayError> {
        let mut state = self.lock()?;
        let test = state
            .tests
            .get(&test_id)
            .cloned()
            .ok_or(GatewayError::TestNotFound)?;
        if !test.is_active() {
            return Err(GatewayError::TestInactive);
        }

        let now = state.clock.now();
        let live = state
            .attempts
            .values()
            .find(|record| {
                record.attempt.test_id() == test_id
                    && record.attempt.student_id() == self.actor
                    && record.attempt.is_in_progress()
            })
            .map(|record| (record.attempt.id(), record.attempt.has_expired(now)));

        match live {
            // The uniqueness invariant: a live attempt is resumed, not doubled.
            Some((id, false)) => {
                let record = state
                    .attempts
                    .get(&id)
                    .ok_or_else(|| GatewayError::Internal("attempt record vanished".into()))?;
                return Ok(record.attempt.clone());
            }
            // Abandoned past its deadline: finalize at zero and start over.
            Some((id, true)) => {
                if let Some(record) = state.attempts.get_mut(&id) {
                    let graded =
                        GradedAttempt::from_persisted(id, 0, record.max_score, now, Vec::new())
                            .map_err(|err| GatewayError::Internal(err.to_string()))?;
                    record
                        .attempt
                        .mark_submitted()
                        .map_err(|err| GatewayError::Internal(err.to_string()))?;
                    record.graded = Some(graded);
                    tracing::debug!(attempt = %id, "finalized abandoned attempt at zero score");
                }
            }
            None => {}
        }

        let completed = state
            .attempts
            .values()
            .filter(|record| {
                record.attempt.test_id() == test_id
                    && record.attempt.student_id() == self.actor
                    && !record.attempt.is_in_progress()
            })
            .count();
        let completed = u32::try_from(completed).unwrap_or(u32::MAX);
        if completed >= test.max_attempts() {
            return Err(GatewayError::AttemptLimitExceeded {
                max_attempts: test.max_attempts(),
            });
        }

        Self::create_attempt(&mut state, &test, self.actor, completed + 1)
    }

    async fn fetch_questions(
        &self,
        test_id: TestId,
        attempt_id: AttemptId,
    ) -> Result<Vec<SanitizedQuestion>, GatewayError> {
        let state = self.lock()?;
        let record = state
            .attempts
            .get(&attempt_id)
            .ok_or(GatewayError::AttemptNotFound)?;
        if record.attempt.student_id() != self.actor {
            return Err(GatewayError::Forbidden);
        }
        // A submitted or mismatched attempt is gone as far as resuming goes.
        if record.attempt.test_id() != test_id || !record.attempt.is_in_progress() {
            return Err(GatewayError::AttemptNotFound);
        }

        let test = state
            .tests
            .get(&test_id)
            .ok_or(GatewayError::TestNotFound)?;
        Ok(record
            .question_ids
            .iter()
            .filter_map(|id| {
                test.questions()
                    .iter()
                    .find(|question| question.id() == *id)
            })
            .map(Question::sanitize)
            .collect())
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &[SubmittedAnswer],
        forced: bool,
    ) -> Result<GradedAttempt, GatewayError> {
        let mut state = self.lock()?;
        let now = state.clock.now();

        let record = state
            .attempts
            .get(&attempt_id)
            .ok_or(GatewayError::AttemptNotFound)?;
        if record.attempt.student_id() != self.actor {
            return Err(GatewayError::Forbidden);
        }
        // Grading happens exactly once; a duplicate submit gets the original.
        if let Some(graded) = &record.graded {
            return Ok(graded.clone());
        }
        if record.attempt.has_expired(now) && !forced {
            return Err(GatewayError::DeadlineExceeded);
        }

        let test = state
            .tests
            .get(&record.attempt.test_id())
            .ok_or(GatewayError::TestNotFound)?;
        let questions: Vec<Question> = record
            .question_ids
            .iter()
            .filter_map(|id| {
                test.questions()
                    .iter()
                    .find(|question| question.id() == *id)
            })
            .cloned()
            .collect();

        let graded = scoring::grade_attempt(attempt_id, &questions, answers, now)
            .map_err(|err| GatewayError::Internal(err.to_string()))?;

        if forced && record.attempt.has_expired(now) {
            tracing::warn!(attempt = %attempt_id, "accepted forced submission past the deadline");
        }

        let record = state
            .attempts
            .get_mut(&attempt_id)
            .ok_or(GatewayError::AttemptNotFound)?;
        record
            .attempt
            .mark_submitted()
            .map_err(|err| GatewayError::Internal(err.to_string()))?;
        record.graded = Some(graded.clone());
        Ok(graded)
    }
}
