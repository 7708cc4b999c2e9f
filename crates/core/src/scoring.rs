//! Grading of a submitted attempt against its question set.
//!
//! Text answers are compared case-insensitively against the reference answer,
//! single-choice questions are all-or-nothing, and multiple-choice questions
//! earn partial credit: the fraction of correct options selected, minus half
//! the fraction of incorrect options selected, floored at zero.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::model::{
    AnswerOption, AttemptId, GradedAttempt, GradedAttemptError, Question, QuestionGrade,
    QuestionId, QuestionKind, SubmittedAnswer,
};

/// Weight of the penalty for selecting incorrect options, relative to the
/// reward for correct ones. Scaled down so minor mistakes do not zero out a
/// mostly-correct selection.
const WRONG_SELECTION_PENALTY: f64 = 0.5;

/// Grades a full submission.
///
/// `questions` is the attempt's served question set (the pinned sample, not
/// necessarily the whole test); entries in `answers` for unknown questions
/// are ignored, and questions without an entry score zero but still appear in
/// the breakdown. The max score is the point sum of `questions`.
///
/// # Errors
///
/// Returns `GradedAttemptError` if the breakdown totals are inconsistent,
/// which would indicate a grading bug rather than bad input.
///
/// # Examples
///
/// ```
/// # use exam_core::model::{AnswerId, AnswerOption, AttemptId, Question, QuestionId,
/// #     QuestionKind, SubmittedAnswer};
/// # use exam_core::scoring::grade_attempt;
/// # use exam_core::time::fixed_now;
/// let question = Question::new(
///     QuestionId::new(1),
///     "2 + 2 = ?",
///     QuestionKind::SingleChoice,
///     1,
///     vec![
///         AnswerOption::new(AnswerId::new(1), "4", true)?,
///         AnswerOption::new(AnswerId::new(2), "5", false)?,
///     ],
/// )?;
/// let answer = SubmittedAnswer {
///     question_id: QuestionId::new(1),
///     selected_answer_ids: vec![AnswerId::new(1)],
///     text_answer: None,
/// };
///
/// let graded = grade_attempt(AttemptId::new(1), &[question], &[answer], fixed_now())?;
/// assert!(graded.is_perfect());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn grade_attempt(
    attempt_id: AttemptId,
    questions: &[Question],
    answers: &[SubmittedAnswer],
    completed_at: DateTime<Utc>,
) -> Result<GradedAttempt, GradedAttemptError> {
    let by_question: HashMap<QuestionId, &SubmittedAnswer> = answers
        .iter()
        .map(|answer| (answer.question_id, answer))
        .collect();

    let max_score = questions
        .iter()
        .map(Question::points)
        .fold(0_u32, u32::saturating_add);

    let breakdown = questions
        .iter()
        .map(|question| match by_question.get(&question.id()) {
            Some(answer) => grade_question(question, answer),
            None => unanswered(question.id()),
        })
        .collect();

    GradedAttempt::from_breakdown(attempt_id, max_score, completed_at, breakdown)
}

/// Grades a single question.
#[must_use]
pub fn grade_question(question: &Question, answer: &SubmittedAnswer) -> QuestionGrade {
    match question.kind() {
        QuestionKind::TextAnswer => grade_text(question, answer),
        QuestionKind::SingleChoice => grade_single_choice(question, answer),
        QuestionKind::MultipleChoice => grade_multiple_choice(question, answer),
    }
}

fn unanswered(question_id: QuestionId) -> QuestionGrade {
    QuestionGrade {
        question_id,
        correct: false,
        earned_points: 0,
        partial_ratio: None,
    }
}

fn all_or_nothing(question: &Question, correct: bool) -> QuestionGrade {
    QuestionGrade {
        question_id: question.id(),
        correct,
        earned_points: if correct { question.points() } else { 0 },
        partial_ratio: None,
    }
}

fn grade_text(question: &Question, answer: &SubmittedAnswer) -> QuestionGrade {
    // The first option of a text question holds the reference answer.
    let reference = question.options().first().map(AnswerOption::text);
    let provided = answer.text_answer.as_deref().unwrap_or("");

    let correct = reference.is_some_and(|reference| {
        reference.trim().to_lowercase() == provided.trim().to_lowercase()
    });
    all_or_nothing(question, correct)
}

fn grade_single_choice(question: &Question, answer: &SubmittedAnswer) -> QuestionGrade {
    let selected = known_selected(question, answer);
    let correct = match selected.as_slice() {
        [only] => only.is_correct(),
        _ => false,
    };
    all_or_nothing(question, correct)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn grade_multiple_choice(question: &Question, answer: &SubmittedAnswer) -> QuestionGrade {
    let selected = known_selected(question, answer);
    let total_correct = question
        .options()
        .iter()
        .filter(|option| option.is_correct())
        .count();

    // A question with no correct options rewards leaving it blank.
    if total_correct == 0 {
        return all_or_nothing(question, selected.is_empty());
    }
    if selected.is_empty() {
        return unanswered(question.id());
    }

    let correct_selected = selected.iter().filter(|option| option.is_correct()).count();
    let incorrect_selected = selected.len() - correct_selected;
    let total_incorrect = question.options().len() - total_correct;

    let correct_ratio = correct_selected as f64 / total_correct as f64;
    let incorrect_ratio = if total_incorrect > 0 {
        incorrect_selected as f64 / total_incorrect as f64
    } else {
        0.0
    };

    let ratio = (correct_ratio - incorrect_ratio * WRONG_SELECTION_PENALTY).max(0.0);
    let earned = (f64::from(question.points()) * ratio).round() as u32;

    QuestionGrade {
        question_id: question.id(),
        correct: (ratio - 1.0).abs() < f64::EPSILON,
        earned_points: earned,
        partial_ratio: Some(ratio),
    }
}

/// Selected options resolved against the question; unknown ids are dropped.
fn known_selected<'a>(question: &'a Question, answer: &SubmittedAnswer) -> Vec<&'a AnswerOption> {
    question
        .options()
        .iter()
        .filter(|option| answer.selected_answer_ids.contains(&option.id()))
        .collect()
}
