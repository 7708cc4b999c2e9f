use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

use exam_core::model::{
    Attempt, AttemptId, GradedAttempt, QuestionId, Response, SanitizedQuestion, StudentId,
    SubmittedAnswer, TestId,
};
use exam_core::time::{Clock, Countdown, CountdownTick};
use gateway::{GatewayError, SessionGateway};

use super::progress::{QuestionStatus, SessionPhase, SessionSnapshot, LOW_TIME_WARNING_SECS};
use crate::answer_store::AnswerStore;
use crate::error::SessionError;

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Everything `open` resolves: the attempt handle plus its question set.
#[derive(Debug, Clone)]
struct OpenedAttempt {
    attempt: Attempt,
    questions: Vec<SanitizedQuestion>,
}

#[derive(Debug, Clone)]
enum Terminal {
    Completed(GradedAttempt),
    Failed(SessionError),
}

/// One tagged variant instead of scattered loading/submitting/expired flags,
/// so illegal combinations cannot be represented.
#[derive(Debug)]
enum State {
    Initializing,
    Active,
    Submitting,
    Terminated(Terminal),
}

type OpenOutcome = Result<OpenedAttempt, GatewayError>;
type SharedOpen = Shared<BoxFuture<'static, OpenOutcome>>;
type SubmitOutcome = Result<GradedAttempt, GatewayError>;
type SharedSubmit = Shared<BoxFuture<'static, SubmitOutcome>>;

struct Inner {
    state: State,
    attempt: Option<Attempt>,
    questions: Vec<SanitizedQuestion>,
    answers: AnswerStore,
    countdown: Option<Countdown>,
    /// In-flight `open` calls, keyed by (actor, test). Entries are evicted
    /// when the request settles; overlapping calls share one future, so a
    /// duplicated UI event can never create two attempts.
    open_in_flight: HashMap<(StudentId, TestId), SharedOpen>,
    /// The single submitting gate. Whichever trigger reaches it first,
    /// explicit click or expiry, owns the submission; later calls await the
    /// same shared future.
    submit_in_flight: Option<SharedSubmit>,
}

//
// ─── TICK ──────────────────────────────────────────────────────────────────────
//

/// What one clock tick observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Seconds left on the budget.
    Remaining(u64),
    /// The deadline was reached just now. Answers are frozen already; the
    /// driver must follow up with `submit(false)`. Fires at most once.
    Expired,
    /// Nothing to count: no deadline, or the session is not active.
    Idle,
}

//
// ─── ATTEMPT SESSION ───────────────────────────────────────────────────────────
//

/// State machine for taking one test: start or resume an attempt, collect
/// answers under the time budget, and submit exactly once.
///
/// All operations take `&self`; internal state lives behind a mutex that is
/// never held across an await, so overlapping invocations from UI event
/// handlers and the timer callback are safe and deduplicated.
pub struct AttemptSession {
    gateway: Arc<dyn SessionGateway>,
    clock: Clock,
    inner: Mutex<Inner>,
}

impl AttemptSession {
    #[must_use]
    pub fn new(gateway: Arc<dyn SessionGateway>, clock: Clock) -> Self {
        Self {
            gateway,
            clock,
            inner: Mutex::new(Inner {
                state: State::Initializing,
                attempt: None,
                questions: Vec::new(),
                answers: AnswerStore::new(),
                countdown: None,
                open_in_flight: HashMap::new(),
                submit_in_flight: None,
            }),
        }
    }

    /// Resumes an in-progress attempt for `test_id`, or starts a new one.
    ///
    /// Overlapping calls collapse into one request. A resumed attempt whose
    /// deadline already passed goes straight to forced submission instead of
    /// exposing a negative countdown; the outcome is visible in the returned
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyOpen` when the session is bound to a
    /// different test, `SessionError::Gateway` when the attempt cannot be
    /// created or fetched. Such failures are fatal and terminate the
    /// session.
    pub async fn open(&self, test_id: TestId) -> Result<SessionSnapshot, SessionError> {
        let key = (self.gateway.actor(), test_id);
        let pending = {
            let mut inner = self.lock();
            match &inner.state {
                State::Terminated(Terminal::Completed(_)) => return Ok(self.snapshot_of(&inner)),
                State::Terminated(Terminal::Failed(err)) => return Err(err.clone()),
                State::Active | State::Submitting => {
                    if inner.attempt.as_ref().is_some_and(|a| a.test_id() == test_id) {
                        return Ok(self.snapshot_of(&inner));
                    }
                    return Err(SessionError::AlreadyOpen);
                }
                State::Initializing => {
                    if let Some(existing) = inner.open_in_flight.get(&key).cloned() {
                        existing
                    } else {
                        let task = open_task(Arc::clone(&self.gateway), test_id).boxed().shared();
                        inner.open_in_flight.insert(key, task.clone());
                        task
                    }
                }
            }
        };

        let outcome = pending.await;

        let expired_on_resume = {
            let mut inner = self.lock();
            inner.open_in_flight.remove(&key);
            match outcome {
                Ok(opened) => {
                    if matches!(inner.state, State::Initializing) {
                        self.apply_opened(&mut inner, opened)
                    } else {
                        // A racing `open` already applied this outcome. If it
                        // saw the deadline gone but has not submitted yet, we
                        // may still be the one to drive the forced submit.
                        matches!(inner.state, State::Submitting)
                            && inner.submit_in_flight.is_none()
                    }
                }
                Err(err) => {
                    let err = SessionError::from(err);
                    if matches!(inner.state, State::Initializing) {
                        tracing::warn!(%test_id, error = %err, "failed to open attempt");
                        inner.state = State::Terminated(Terminal::Failed(err.clone()));
                    }
                    return Err(err);
                }
            }
        };

        if expired_on_resume {
            // Whatever answers the abandoned attempt still has go in now;
            // the result (or error) lands in the snapshot.
            let _ = self.submit(false).await;
        }

        Ok(self.snapshot())
    }

    /// Records the test-taker's current response for a question.
    ///
    /// Silently ignored once a submission has begun or the session has
    /// terminated (late UI events after expiry must not corrupt the payload),
    /// and likewise for unknown questions or mismatched response shapes.
    pub fn record_answer(&self, question_id: QuestionId, response: Response) {
        let mut inner = self.lock();
        if !matches!(inner.state, State::Active) {
            tracing::debug!(%question_id, "ignored answer outside the active phase");
            return;
        }
        if !inner.answers.record(question_id, response) {
            tracing::debug!(%question_id, "ignored answer with unknown question or shape");
        }
    }

    /// Advances the countdown; call once per second while the session is
    /// active and the attempt is timed.
    ///
    /// Remaining time is recomputed from the absolute deadline, so missed
    /// ticks cannot stretch the budget. On expiry the answer gate closes
    /// atomically and `TickOutcome::Expired` instructs the driver to invoke
    /// `submit(false)`.
    pub fn tick(&self) -> TickOutcome {
        let mut inner = self.lock();
        if !matches!(inner.state, State::Active) {
            return TickOutcome::Idle;
        }
        let now = self.clock.now();
        match inner.countdown.as_mut() {
            None => TickOutcome::Idle,
            Some(countdown) => match countdown.poll(now) {
                CountdownTick::Running(secs) => TickOutcome::Remaining(secs),
                CountdownTick::Expired => {
                    tracing::debug!("time budget exhausted, freezing answers");
                    inner.state = State::Submitting;
                    TickOutcome::Expired
                }
                CountdownTick::Stopped => TickOutcome::Idle,
            },
        }
    }

    /// Submits the attempt for grading.
    ///
    /// Idempotent under concurrent triggers: whichever call reaches the gate
    /// first builds the payload and owns the network request; every other
    /// call, like a double click or the expiry racing an explicit click,
    /// awaits the same shared future and returns the same result. After
    /// termination the terminal outcome is replayed.
    ///
    /// An `explicit` submit that the server rejects with the deadline code is
    /// retried exactly once as a forced submission, since the server clock
    /// may run ahead of ours by the network's latency.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotOpen` before `open` has completed, or the
    /// terminal `SessionError` when submission fails for good.
    pub async fn submit(&self, explicit: bool) -> Result<GradedAttempt, SessionError> {
        let pending = {
            let mut inner = self.lock();
            match &inner.state {
                State::Initializing => return Err(SessionError::NotOpen),
                State::Terminated(Terminal::Completed(graded)) => return Ok(graded.clone()),
                State::Terminated(Terminal::Failed(err)) => return Err(err.clone()),
                State::Active | State::Submitting => {
                    if let Some(existing) = inner.submit_in_flight.clone() {
                        existing
                    } else {
                        let Some(attempt) = inner.attempt.clone() else {
                            return Err(SessionError::NotOpen);
                        };
                        let answers = inner.answers.snapshot();
                        let forced = !explicit
                            || inner.countdown.as_ref().is_some_and(Countdown::is_expired);
                        inner.state = State::Submitting;
                        let task =
                            submit_task(Arc::clone(&self.gateway), attempt.id(), answers, forced)
                                .boxed()
                                .shared();
                        inner.submit_in_flight = Some(task.clone());
                        task
                    }
                }
            }
        };

        let outcome = pending.await;

        let mut inner = self.lock();
        if matches!(inner.state, State::Submitting) {
            inner.submit_in_flight = None;
            match &outcome {
                Ok(graded) => {
                    if let Some(attempt) = inner.attempt.as_mut() {
                        let _ = attempt.mark_submitted();
                    }
                    tracing::debug!(score = graded.score(), max = graded.max_score(), "attempt graded");
                    inner.state = State::Terminated(Terminal::Completed(graded.clone()));
                }
                Err(err) => {
                    let err = SessionError::from(err.clone());
                    tracing::warn!(error = %err, "submission failed");
                    inner.state = State::Terminated(Terminal::Failed(err));
                }
            }
        }
        match &inner.state {
            State::Terminated(Terminal::Completed(graded)) => Ok(graded.clone()),
            State::Terminated(Terminal::Failed(err)) => Err(err.clone()),
            // Unreachable: the settle above always terminates the session.
            _ => outcome.map_err(SessionError::from),
        }
    }

    //
    // ─── VIEWS ─────────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        phase_of(&self.lock().state)
    }

    #[must_use]
    pub fn attempt(&self) -> Option<Attempt> {
        self.lock().attempt.clone()
    }

    #[must_use]
    pub fn questions(&self) -> Vec<SanitizedQuestion> {
        self.lock().questions.clone()
    }

    /// Remaining whole seconds, or `None` for untimed attempts.
    #[must_use]
    pub fn remaining_seconds(&self) -> Option<u64> {
        let inner = self.lock();
        inner
            .countdown
            .as_ref()
            .map(|countdown| countdown.remaining_seconds(self.clock.now()))
    }

    #[must_use]
    pub fn is_answered(&self, question_id: QuestionId) -> bool {
        self.lock().answers.is_answered(question_id)
    }

    /// The full UI-facing view of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        self.snapshot_of(&inner)
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs a settled `open` outcome. Returns true when the resumed
    /// attempt is already past its deadline and must be force-submitted.
    fn apply_opened(&self, inner: &mut Inner, opened: OpenedAttempt) -> bool {
        let now = self.clock.now();
        inner.answers = AnswerStore::for_questions(&opened.questions);
        inner.countdown = opened.attempt.deadline().map(Countdown::new);

        let expired = match inner.countdown.as_mut() {
            Some(countdown) => matches!(countdown.poll(now), CountdownTick::Expired),
            None => false,
        };

        tracing::debug!(
            attempt = %opened.attempt.id(),
            attempt_number = opened.attempt.attempt_number(),
            questions = opened.questions.len(),
            expired,
            "attempt opened"
        );
        inner.questions = opened.questions;
        inner.attempt = Some(opened.attempt);
        inner.state = if expired {
            State::Submitting
        } else {
            State::Active
        };
        expired
    }

    fn snapshot_of(&self, inner: &Inner) -> SessionSnapshot {
        let phase = phase_of(&inner.state);
        let remaining_seconds = inner
            .countdown
            .as_ref()
            .map(|countdown| countdown.remaining_seconds(self.clock.now()));
        let (outcome, error) = match &inner.state {
            State::Terminated(Terminal::Completed(graded)) => (Some(graded.clone()), None),
            State::Terminated(Terminal::Failed(err)) => (None, Some(err.clone())),
            _ => (None, None),
        };

        SessionSnapshot {
            phase,
            remaining_seconds,
            time_warning: phase == SessionPhase::Active
                && remaining_seconds.is_some_and(|secs| secs <= LOW_TIME_WARNING_SECS),
            questions: inner
                .questions
                .iter()
                .map(|question| QuestionStatus {
                    question_id: question.id,
                    answered: inner.answers.is_answered(question.id),
                })
                .collect(),
            outcome,
            error,
        }
    }
}

impl fmt::Debug for AttemptSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("AttemptSession")
            .field("state", &inner.state)
            .field("attempt", &inner.attempt.as_ref().map(Attempt::id))
            .field("questions_len", &inner.questions.len())
            .field("answered", &inner.answers.answered_count())
            .finish_non_exhaustive()
    }
}

fn phase_of(state: &State) -> SessionPhase {
    match state {
        State::Initializing => SessionPhase::Initializing,
        State::Active => SessionPhase::Active,
        State::Submitting => SessionPhase::Submitting,
        State::Terminated(_) => SessionPhase::Terminated,
    }
}

//
// ─── GATEWAY TASKS ─────────────────────────────────────────────────────────────
//

fn open_task(
    gateway: Arc<dyn SessionGateway>,
    test_id: TestId,
) -> impl Future<Output = OpenOutcome> + Send + 'static {
    async move {
        match gateway.find_in_progress(test_id).await? {
            Some(attempt) => match gateway.fetch_questions(test_id, attempt.id()).await {
                Ok(questions) => Ok(OpenedAttempt { attempt, questions }),
                // The resume target vanished between lookup and fetch;
                // treat it as absent and start fresh.
                Err(GatewayError::AttemptNotFound) => start_fresh(&gateway, test_id).await,
                Err(err) => Err(err),
            },
            None => start_fresh(&gateway, test_id).await,
        }
    }
}

async fn start_fresh(gateway: &Arc<dyn SessionGateway>, test_id: TestId) -> OpenOutcome {
    let attempt = gateway.start_attempt(test_id).await?;
    let questions = gateway.fetch_questions(test_id, attempt.id()).await?;
    Ok(OpenedAttempt { attempt, questions })
}

fn submit_task(
    gateway: Arc<dyn SessionGateway>,
    attempt_id: AttemptId,
    answers: Vec<SubmittedAnswer>,
    forced: bool,
) -> impl Future<Output = SubmitOutcome> + Send + 'static {
    async move {
        match gateway.submit_attempt(attempt_id, &answers, forced).await {
            // The server saw the deadline pass before we did; the clocks
            // disagree by at most the network latency. Resubmit as a forced
            // auto-submission instead of surfacing the race.
            Err(GatewayError::DeadlineExceeded) if !forced => {
                tracing::warn!(%attempt_id, "deadline passed server-side, retrying as forced submission");
                gateway.submit_attempt(attempt_id, &answers, true).await
            }
            result => result,
        }
    }
}
