//! Wire shapes of the portal REST API.
//!
//! Every response is decoded exactly once, here, into a typed DTO and then
//! converted into the domain model; nothing downstream ever branches on
//! transport shape. Error bodies carry a structured `code` that maps onto
//! [`GatewayError`] variants; the deadline race in particular is detected
//! from `DEADLINE_EXCEEDED`, never from the human-readable message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use exam_core::model::{
    AnswerId, Attempt, AttemptId, GradedAttempt, QuestionGrade, QuestionId, QuestionKind,
    SanitizedOption, SanitizedQuestion, StudentId, SubmittedAnswer, TestId,
};

use crate::error::GatewayError;

//
// ─── ERROR CODES ───────────────────────────────────────────────────────────────
//

pub const CODE_ATTEMPT_LIMIT_EXCEEDED: &str = "ATTEMPT_LIMIT_EXCEEDED";
pub const CODE_TEST_INACTIVE: &str = "TEST_INACTIVE";
pub const CODE_TEST_NOT_FOUND: &str = "TEST_NOT_FOUND";
pub const CODE_ATTEMPT_NOT_FOUND: &str = "ATTEMPT_NOT_FOUND";
pub const CODE_DEADLINE_EXCEEDED: &str = "DEADLINE_EXCEEDED";
pub const CODE_FORBIDDEN: &str = "FORBIDDEN";

/// Structured error body returned by the portal API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl ApiErrorBody {
    /// Maps the structured code onto the gateway error taxonomy. Unknown
    /// codes are preserved verbatim in `GatewayError::Server`.
    #[must_use]
    pub fn into_gateway_error(self) -> GatewayError {
        match self.code.as_str() {
            CODE_ATTEMPT_LIMIT_EXCEEDED => GatewayError::AttemptLimitExceeded {
                max_attempts: self.max_attempts.unwrap_or(0),
            },
            CODE_TEST_INACTIVE => GatewayError::TestInactive,
            CODE_TEST_NOT_FOUND => GatewayError::TestNotFound,
            CODE_ATTEMPT_NOT_FOUND => GatewayError::AttemptNotFound,
            CODE_DEADLINE_EXCEEDED => GatewayError::DeadlineExceeded,
            CODE_FORBIDDEN => GatewayError::Forbidden,
            _ => GatewayError::Server {
                code: self.code,
                message: self.message,
            },
        }
    }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatusDto {
    InProgress,
    Submitted,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptDto {
    pub id: AttemptId,
    pub test_id: TestId,
    pub student_id: StudentId,
    pub status: AttemptStatusDto,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    pub attempt_number: u32,
}

impl AttemptDto {
    /// Converts into the domain attempt.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Decode` if the fields violate attempt
    /// invariants (deadline before start, zero attempt number).
    pub fn into_attempt(self) -> Result<Attempt, GatewayError> {
        let mut attempt = Attempt::new(
            self.id,
            self.test_id,
            self.student_id,
            self.started_at,
            self.deadline,
            self.attempt_number,
        )
        .map_err(|err| GatewayError::Decode(err.to_string()))?;

        if self.status == AttemptStatusDto::Submitted {
            attempt
                .mark_submitted()
                .map_err(|err| GatewayError::Decode(err.to_string()))?;
        }
        Ok(attempt)
    }
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOptionDto {
    pub id: AnswerId,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDto {
    pub id: QuestionId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub points: u32,
    #[serde(default)]
    pub answers: Vec<AnswerOptionDto>,
}

impl QuestionDto {
    /// The wire shape already carries no correctness flags, so this mapping
    /// is total.
    #[must_use]
    pub fn into_sanitized(self) -> SanitizedQuestion {
        SanitizedQuestion {
            id: self.id,
            text: self.text,
            kind: self.kind,
            points: self.points,
            options: self
                .answers
                .into_iter()
                .map(|option| SanitizedOption {
                    id: option.id,
                    text: option.text,
                })
                .collect(),
        }
    }
}

//
// ─── SUBMISSION ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest<'a> {
    pub answers: &'a [SubmittedAnswer],
    pub forced: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionGradeDto {
    pub question_id: QuestionId,
    pub correct: bool,
    pub earned_points: u32,
    #[serde(default)]
    pub partial_ratio: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedAttemptDto {
    pub attempt_id: AttemptId,
    pub score: u32,
    pub max_score: u32,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub breakdown: Vec<QuestionGradeDto>,
}

impl GradedAttemptDto {
    /// Converts into the domain result.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Decode` if the score does not match the
    /// breakdown or exceeds the maximum.
    pub fn into_graded(self) -> Result<GradedAttempt, GatewayError> {
        let breakdown = self
            .breakdown
            .into_iter()
            .map(|grade| QuestionGrade {
                question_id: grade.question_id,
                correct: grade.correct,
                earned_points: grade.earned_points,
                partial_ratio: grade.partial_ratio,
            })
            .collect();

        GradedAttempt::from_persisted(
            self.attempt_id,
            self.score,
            self.max_score,
            self.completed_at,
            breakdown,
        )
        .map_err(|err| GatewayError::Decode(err.to_string()))
    }
}
