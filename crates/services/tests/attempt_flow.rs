use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;

use exam_core::model::{
    AnswerId, AnswerOption, Attempt, AttemptId, GradedAttempt, Question, QuestionId, QuestionKind,
    Response, SanitizedQuestion, StudentId, SubmittedAnswer, TestDefinition, TestId,
};
use exam_core::time::{fixed_now, Clock};
use gateway::{GatewayError, InMemoryGateway, SessionGateway};
use services::{AttemptSession, SessionError, SessionPhase, TickOutcome};

fn student() -> StudentId {
    StudentId::new(7)
}

fn choice_question(id: u64, points: u32) -> Question {
    Question::new(
        QuestionId::new(id),
        format!("Q{id}"),
        QuestionKind::SingleChoice,
        points,
        vec![
            AnswerOption::new(AnswerId::new(id * 10 + 1), "right", true).unwrap(),
            AnswerOption::new(AnswerId::new(id * 10 + 2), "wrong", false).unwrap(),
        ],
    )
    .unwrap()
}

fn build_test(id: u64, time_limit_minutes: Option<u32>, questions: Vec<Question>) -> TestDefinition {
    TestDefinition::new(
        TestId::new(id),
        format!("Test {id}"),
        "Maths",
        time_limit_minutes,
        3,
        None,
        questions,
    )
    .unwrap()
}

/// Seeds a portal with one test and returns (server handle, wrapped gateway).
fn seeded(
    test: TestDefinition,
    clock: Clock,
) -> (InMemoryGateway, Arc<CountingGateway>) {
    let server = InMemoryGateway::new(student(), clock);
    server.insert_test(test).unwrap();
    let counting = Arc::new(CountingGateway::new(server.handle_for(student())));
    (server, counting)
}

//
// ─── COUNTING GATEWAY ──────────────────────────────────────────────────────────
//

/// Delegates to the in-memory portal while counting calls and capturing the
/// last submission payload. Yields before each call so overlapping session
/// operations genuinely interleave under `tokio::join!`.
struct CountingGateway {
    inner: InMemoryGateway,
    start_calls: AtomicU32,
    submit_calls: AtomicU32,
    last_submission: Mutex<Option<Vec<SubmittedAnswer>>>,
}

impl CountingGateway {
    fn new(inner: InMemoryGateway) -> Self {
        Self {
            inner,
            start_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            last_submission: Mutex::new(None),
        }
    }

    fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    fn last_submission(&self) -> Vec<SubmittedAnswer> {
        self.last_submission
            .lock()
            .unwrap()
            .clone()
            .expect("no submission captured")
    }
}

#[async_trait]
impl SessionGateway for CountingGateway {
    fn actor(&self) -> StudentId {
        self.inner.actor()
    }

    async fn find_in_progress(&self, test_id: TestId) -> Result<Option<Attempt>, GatewayError> {
        tokio::task::yield_now().await;
        self.inner.find_in_progress(test_id).await
    }

    async fn start_attempt(&self, test_id: TestId) -> Result<Attempt, GatewayError> {
        tokio::task::yield_now().await;
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.start_attempt(test_id).await
    }

    async fn fetch_questions(
        &self,
        test_id: TestId,
        attempt_id: AttemptId,
    ) -> Result<Vec<SanitizedQuestion>, GatewayError> {
        tokio::task::yield_now().await;
        self.inner.fetch_questions(test_id, attempt_id).await
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &[SubmittedAnswer],
        forced: bool,
    ) -> Result<GradedAttempt, GatewayError> {
        tokio::task::yield_now().await;
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_submission.lock().unwrap() = Some(answers.to_vec());
        self.inner.submit_attempt(attempt_id, answers, forced).await
    }
}

//
// ─── PROPERTIES ────────────────────────────────────────────────────────────────
//

#[tokio::test]
async fn overlapping_opens_create_exactly_one_attempt() {
    let clock = Clock::shared(fixed_now());
    let (server, counting) = seeded(
        build_test(1, Some(10), vec![choice_question(1, 1)]),
        clock.clone(),
    );
    let session = AttemptSession::new(counting.clone(), clock);

    let (first, second) = tokio::join!(session.open(TestId::new(1)), session.open(TestId::new(1)));
    first.unwrap();
    let snapshot = second.unwrap();

    assert_eq!(snapshot.phase, SessionPhase::Active);
    assert_eq!(counting.start_calls(), 1);
    assert_eq!(server.attempt_count(TestId::new(1)).unwrap(), 1);
}

#[tokio::test]
async fn racing_submits_share_one_result() {
    let clock = Clock::shared(fixed_now());
    let (_server, counting) = seeded(
        build_test(1, Some(10), vec![choice_question(1, 1)]),
        clock.clone(),
    );
    let session = AttemptSession::new(counting.clone(), clock);
    session.open(TestId::new(1)).await.unwrap();
    session.record_answer(
        QuestionId::new(1),
        Response::Single(Some(AnswerId::new(11))),
    );

    // A double click racing the auto-submit: both land on the same gate.
    let (explicit, auto) = tokio::join!(session.submit(true), session.submit(false));
    let explicit = explicit.unwrap();
    let auto = auto.unwrap();

    assert_eq!(explicit, auto);
    assert_eq!(counting.submit_calls(), 1);
    assert_eq!(session.phase(), SessionPhase::Terminated);
}

#[tokio::test]
async fn payload_normalizes_selections_and_text() {
    let clock = Clock::shared(fixed_now());
    let multi = Question::new(
        QuestionId::new(1),
        "Pick all",
        QuestionKind::MultipleChoice,
        2,
        vec![
            AnswerOption::new(AnswerId::new(11), "a", true).unwrap(),
            AnswerOption::new(AnswerId::new(12), "b", true).unwrap(),
            AnswerOption::new(AnswerId::new(13), "c", false).unwrap(),
        ],
    )
    .unwrap();
    let text = Question::new(
        QuestionId::new(2),
        "Capital of France?",
        QuestionKind::TextAnswer,
        1,
        vec![AnswerOption::new(AnswerId::new(21), "Paris", true).unwrap()],
    )
    .unwrap();
    let (_server, counting) = seeded(build_test(1, None, vec![multi, text]), clock.clone());
    let session = AttemptSession::new(counting.clone(), clock);
    session.open(TestId::new(1)).await.unwrap();

    // Select {a, b}, then deselect b.
    let both: BTreeSet<AnswerId> = [AnswerId::new(11), AnswerId::new(12)].into();
    session.record_answer(QuestionId::new(1), Response::Multiple(both));
    let only_a: BTreeSet<AnswerId> = [AnswerId::new(11)].into();
    session.record_answer(QuestionId::new(1), Response::Multiple(only_a));
    session.record_answer(QuestionId::new(2), Response::Text("Paris".into()));

    session.submit(true).await.unwrap();

    let payload = counting.last_submission();
    assert_eq!(payload[0].selected_answer_ids, vec![AnswerId::new(11)]);
    assert_eq!(payload[0].text_answer, None);
    assert!(payload[1].selected_answer_ids.is_empty());
    assert_eq!(payload[1].text_answer.as_deref(), Some("Paris"));
}

#[tokio::test]
async fn answers_after_expiry_never_reach_the_submission() {
    let mut clock = Clock::shared(fixed_now());
    let (_server, counting) = seeded(
        build_test(1, Some(1), vec![choice_question(1, 1)]),
        clock.clone(),
    );
    let session = AttemptSession::new(counting.clone(), clock.clone());
    session.open(TestId::new(1)).await.unwrap();
    session.record_answer(
        QuestionId::new(1),
        Response::Single(Some(AnswerId::new(11))),
    );

    clock.advance(Duration::seconds(61));
    assert_eq!(session.tick(), TickOutcome::Expired);
    // Expiry is one-shot; later ticks observe a closed gate.
    assert_eq!(session.tick(), TickOutcome::Idle);

    // A late UI event after the freeze.
    session.record_answer(
        QuestionId::new(1),
        Response::Single(Some(AnswerId::new(12))),
    );

    session.submit(false).await.unwrap();
    let payload = counting.last_submission();
    assert_eq!(payload[0].selected_answer_ids, vec![AnswerId::new(11)]);
}

#[tokio::test]
async fn expiry_auto_submit_scores_the_recorded_answer() {
    let mut clock = Clock::shared(fixed_now());
    let (_server, counting) = seeded(
        build_test(1, Some(1), vec![choice_question(1, 1)]),
        clock.clone(),
    );
    let session = AttemptSession::new(counting.clone(), clock.clone());

    let snapshot = session.open(TestId::new(1)).await.unwrap();
    assert_eq!(snapshot.remaining_seconds, Some(60));
    session.record_answer(
        QuestionId::new(1),
        Response::Single(Some(AnswerId::new(11))),
    );

    clock.advance(Duration::seconds(61));
    assert_eq!(session.tick(), TickOutcome::Expired);

    let graded = session.submit(false).await.unwrap();
    assert!(graded.is_perfect());
    assert_eq!(session.snapshot().remaining_seconds, Some(0));
}

#[tokio::test]
async fn remaining_time_is_monotonic_across_ticks() {
    let mut clock = Clock::shared(fixed_now());
    let (_server, counting) = seeded(
        build_test(1, Some(2), vec![choice_question(1, 1)]),
        clock.clone(),
    );
    let session = AttemptSession::new(counting, clock.clone());
    session.open(TestId::new(1)).await.unwrap();

    let mut last = u64::MAX;
    for _ in 0..5 {
        clock.advance(Duration::seconds(13));
        match session.tick() {
            TickOutcome::Remaining(secs) => {
                assert!(secs <= last);
                last = secs;
            }
            TickOutcome::Expired => break,
            TickOutcome::Idle => panic!("countdown stopped early"),
        }
    }
}

#[tokio::test]
async fn resume_restores_the_true_time_budget() {
    let mut clock = Clock::shared(fixed_now());
    let (server, counting) = seeded(
        build_test(1, Some(10), vec![choice_question(1, 1)]),
        clock.clone(),
    );

    let first = AttemptSession::new(counting.clone(), clock.clone());
    let opened = first.open(TestId::new(1)).await.unwrap();
    assert_eq!(opened.remaining_seconds, Some(600));
    first.record_answer(
        QuestionId::new(1),
        Response::Single(Some(AnswerId::new(11))),
    );
    drop(first);

    // Four minutes later, a fresh session (page reload) picks the attempt up.
    clock.advance(Duration::minutes(4));
    let second = AttemptSession::new(counting.clone(), clock);
    let resumed = second.open(TestId::new(1)).await.unwrap();

    assert_eq!(resumed.remaining_seconds, Some(360));
    assert_eq!(second.attempt().unwrap().attempt_number(), 1);
    assert_eq!(server.attempt_count(TestId::new(1)).unwrap(), 1);
    // Local responses do not survive the reload; only the budget does.
    assert!(!resumed.questions[0].answered);
}

#[tokio::test]
async fn resuming_past_the_deadline_forces_submission_immediately() {
    let mut clock = Clock::shared(fixed_now());
    let (_server, counting) = seeded(
        build_test(1, Some(1), vec![choice_question(1, 1)]),
        clock.clone(),
    );

    let first = AttemptSession::new(counting.clone(), clock.clone());
    first.open(TestId::new(1)).await.unwrap();
    drop(first);

    clock.advance(Duration::minutes(2));
    let second = AttemptSession::new(counting.clone(), clock);
    let snapshot = second.open(TestId::new(1)).await.unwrap();

    assert_eq!(snapshot.phase, SessionPhase::Terminated);
    let graded = snapshot.outcome.expect("forced submission result");
    assert_eq!(graded.score(), 0);
    assert_eq!(counting.submit_calls(), 1);
}

#[tokio::test]
async fn server_side_deadline_rejection_is_retried_as_forced() {
    // The server clock runs ahead of the session clock, so the client still
    // believes there is time left when the server says otherwise.
    let (server, counting) = seeded(
        build_test(1, Some(10), vec![choice_question(1, 1)]),
        Clock::shared(fixed_now()),
    );
    let session = AttemptSession::new(counting.clone(), Clock::fixed(fixed_now()));
    session.open(TestId::new(1)).await.unwrap();
    session.record_answer(
        QuestionId::new(1),
        Response::Single(Some(AnswerId::new(11))),
    );

    server.advance_clock(Duration::minutes(11)).unwrap();

    let graded = session.submit(true).await.unwrap();
    assert!(graded.is_perfect());
    assert_eq!(counting.submit_calls(), 2);
}

#[tokio::test]
async fn open_failure_terminates_the_session() {
    let clock = Clock::shared(fixed_now());
    let (_server, counting) = seeded(
        build_test(1, None, vec![choice_question(1, 1)]),
        clock.clone(),
    );
    let session = AttemptSession::new(counting, clock);

    let err = session.open(TestId::new(99)).await.unwrap_err();
    assert_eq!(err, SessionError::Gateway(GatewayError::TestNotFound));
    assert_eq!(session.phase(), SessionPhase::Terminated);

    // The terminal error replays; the session does not limp onward.
    let replay = session.open(TestId::new(99)).await.unwrap_err();
    assert_eq!(replay, err);
    assert_eq!(session.snapshot().error, Some(err));
}

#[tokio::test]
async fn exhausted_attempt_limit_surfaces_through_open() {
    let clock = Clock::shared(fixed_now());
    let question = choice_question(1, 1);
    let test = TestDefinition::new(
        TestId::new(1),
        "One shot",
        "Maths",
        None,
        1,
        None,
        vec![question],
    )
    .unwrap();
    let (server, counting) = seeded(test, clock.clone());

    // Use up the single allowed attempt directly against the portal.
    let attempt = server.start_attempt(TestId::new(1)).await.unwrap();
    server
        .submit_attempt(attempt.id(), &[], false)
        .await
        .unwrap();

    let session = AttemptSession::new(counting, clock);
    let err = session.open(TestId::new(1)).await.unwrap_err();
    assert_eq!(
        err,
        SessionError::Gateway(GatewayError::AttemptLimitExceeded { max_attempts: 1 })
    );
}

#[tokio::test]
async fn session_is_bound_to_one_test() {
    let clock = Clock::shared(fixed_now());
    let (server, counting) = seeded(
        build_test(1, None, vec![choice_question(1, 1)]),
        clock.clone(),
    );
    server
        .insert_test(build_test(2, None, vec![choice_question(2, 1)]))
        .unwrap();

    let session = AttemptSession::new(counting, clock);
    session.open(TestId::new(1)).await.unwrap();

    let err = session.open(TestId::new(2)).await.unwrap_err();
    assert_eq!(err, SessionError::AlreadyOpen);
}

#[tokio::test]
async fn untimed_attempts_never_tick() {
    let clock = Clock::shared(fixed_now());
    let (_server, counting) = seeded(
        build_test(1, None, vec![choice_question(1, 1)]),
        clock.clone(),
    );
    let session = AttemptSession::new(counting, clock);
    let snapshot = session.open(TestId::new(1)).await.unwrap();

    assert_eq!(snapshot.remaining_seconds, None);
    assert_eq!(session.tick(), TickOutcome::Idle);
}
