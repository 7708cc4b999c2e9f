use chrono::Duration;

use exam_core::model::{
    AnswerId, AnswerOption, Question, QuestionId, QuestionKind, StudentId, SubmittedAnswer,
    TestDefinition, TestId,
};
use exam_core::time::fixed_clock;
use gateway::{GatewayError, InMemoryGateway, SessionGateway};

fn student() -> StudentId {
    StudentId::new(7)
}

fn test_id() -> TestId {
    TestId::new(1)
}

fn build_test(question_count: u64, max_attempts: u32, questions_to_show: Option<u32>) -> TestDefinition {
    let questions = (1..=question_count)
        .map(|n| {
            Question::new(
                QuestionId::new(n),
                format!("Q{n}"),
                QuestionKind::SingleChoice,
                1,
                vec![
                    AnswerOption::new(AnswerId::new(n * 10 + 1), "right", true).unwrap(),
                    AnswerOption::new(AnswerId::new(n * 10 + 2), "wrong", false).unwrap(),
                ],
            )
            .unwrap()
        })
        .collect();
    TestDefinition::new(
        test_id(),
        "Contract test",
        "Maths",
        Some(10),
        max_attempts,
        questions_to_show,
        questions,
    )
    .unwrap()
}

fn seeded_gateway(test: TestDefinition) -> InMemoryGateway {
    let gateway = InMemoryGateway::new(student(), fixed_clock());
    gateway.insert_test(test).unwrap();
    gateway
}

/// Answers every question with its first (correct) option.
fn correct_answers(
    attempt_questions: &[exam_core::model::SanitizedQuestion],
) -> Vec<SubmittedAnswer> {
    attempt_questions
        .iter()
        .map(|question| SubmittedAnswer {
            question_id: question.id,
            selected_answer_ids: vec![question.options[0].id],
            text_answer: None,
        })
        .collect()
}

#[tokio::test]
async fn concurrent_starts_from_two_tabs_share_one_attempt() {
    let tab_one = seeded_gateway(build_test(2, 1, None));
    let tab_two = tab_one.handle_for(student());

    let (first, second) = tokio::join!(tab_one.start_attempt(test_id()), tab_two.start_attempt(test_id()));
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(first.id(), second.id());
    assert_eq!(tab_one.attempt_count(test_id()).unwrap(), 1);
}

#[tokio::test]
async fn submission_is_idempotent() {
    let gateway = seeded_gateway(build_test(2, 1, None));
    let attempt = gateway.start_attempt(test_id()).await.unwrap();
    let questions = gateway.fetch_questions(test_id(), attempt.id()).await.unwrap();
    let answers = correct_answers(&questions);

    let first = gateway
        .submit_attempt(attempt.id(), &answers, false)
        .await
        .unwrap();
    let second = gateway
        .submit_attempt(attempt.id(), &answers, false)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.completed_at(), second.completed_at());
}

#[tokio::test]
async fn sample_is_pinned_to_the_attempt() {
    let gateway = seeded_gateway(build_test(6, 1, Some(4)));
    let attempt = gateway.start_attempt(test_id()).await.unwrap();

    let first_fetch = gateway.fetch_questions(test_id(), attempt.id()).await.unwrap();
    let second_fetch = gateway.fetch_questions(test_id(), attempt.id()).await.unwrap();

    assert_eq!(first_fetch.len(), 4);
    assert_eq!(first_fetch, second_fetch);

    // Max score reflects the pinned subset, not the whole test.
    let answers = correct_answers(&first_fetch);
    let graded = gateway
        .submit_attempt(attempt.id(), &answers, false)
        .await
        .unwrap();
    assert_eq!(graded.max_score(), 4);
    assert_eq!(graded.score(), 4);
}

#[tokio::test]
async fn attempt_limit_counts_completed_attempts() {
    let gateway = seeded_gateway(build_test(1, 2, None));

    for _ in 0..2 {
        let attempt = gateway.start_attempt(test_id()).await.unwrap();
        let questions = gateway.fetch_questions(test_id(), attempt.id()).await.unwrap();
        let answers = correct_answers(&questions);
        gateway
            .submit_attempt(attempt.id(), &answers, false)
            .await
            .unwrap();
    }

    let err = gateway.start_attempt(test_id()).await.unwrap_err();
    assert_eq!(err, GatewayError::AttemptLimitExceeded { max_attempts: 2 });
}

#[tokio::test]
async fn abandoned_attempt_is_finalized_at_zero_and_replaced() {
    let gateway = seeded_gateway(build_test(1, 3, None));
    let first = gateway.start_attempt(test_id()).await.unwrap();

    // Walk past the 10-minute deadline and come back.
    gateway.advance_clock(Duration::minutes(11)).unwrap();
    let second = gateway.start_attempt(test_id()).await.unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(second.attempt_number(), 2);

    // The stale attempt was graded at zero; resubmitting it returns that.
    let graded = gateway
        .submit_attempt(first.id(), &[], true)
        .await
        .unwrap();
    assert_eq!(graded.score(), 0);
}

#[tokio::test]
async fn late_submit_requires_forced_flag() {
    let gateway = seeded_gateway(build_test(1, 1, None));
    let attempt = gateway.start_attempt(test_id()).await.unwrap();
    let questions = gateway.fetch_questions(test_id(), attempt.id()).await.unwrap();
    let answers = correct_answers(&questions);

    gateway.advance_clock(Duration::minutes(11)).unwrap();

    let err = gateway
        .submit_attempt(attempt.id(), &answers, false)
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::DeadlineExceeded);

    // The forced retry path still grades the provided answers.
    let graded = gateway
        .submit_attempt(attempt.id(), &answers, true)
        .await
        .unwrap();
    assert_eq!(graded.score(), 1);
}

#[tokio::test]
async fn in_progress_lookup_sees_only_live_attempts() {
    let gateway = seeded_gateway(build_test(1, 2, None));
    assert!(gateway.find_in_progress(test_id()).await.unwrap().is_none());

    let attempt = gateway.start_attempt(test_id()).await.unwrap();
    let found = gateway.find_in_progress(test_id()).await.unwrap().unwrap();
    assert_eq!(found.id(), attempt.id());

    let questions = gateway.fetch_questions(test_id(), attempt.id()).await.unwrap();
    let answers = correct_answers(&questions);
    gateway
        .submit_attempt(attempt.id(), &answers, false)
        .await
        .unwrap();

    assert!(gateway.find_in_progress(test_id()).await.unwrap().is_none());
}
