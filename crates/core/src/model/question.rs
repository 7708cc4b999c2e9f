use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AnswerId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("question points must be > 0")]
    InvalidPoints,

    #[error("choice questions need at least two options")]
    NotEnoughOptions,

    #[error("answer option text cannot be empty")]
    EmptyOptionText,
}

//
// ─── QUESTION KIND ─────────────────────────────────────────────────────────────
//

/// The three supported question shapes.
///
/// Wire names follow the portal API (`SINGLE_CHOICE`, `MULTIPLE_CHOICE`,
/// `TEXT_ANSWER`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    /// Exactly one option may be selected.
    SingleChoice,
    /// Any subset of options may be selected; scored with partial credit.
    MultipleChoice,
    /// Free text, compared against a reference answer.
    TextAnswer,
}

impl QuestionKind {
    /// Returns true for the two option-based kinds.
    #[must_use]
    pub fn is_choice(self) -> bool {
        matches!(self, Self::SingleChoice | Self::MultipleChoice)
    }
}

//
// ─── ANSWER OPTION ─────────────────────────────────────────────────────────────
//

/// One selectable option of a choice question, including its correctness flag.
///
/// This is the server-side shape. Option correctness must never reach a client
/// with a live attempt; see [`Question::sanitize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    id: AnswerId,
    text: String,
    correct: bool,
}

impl AnswerOption {
    /// Creates an option.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyOptionText` if the text is blank.
    pub fn new(
        id: AnswerId,
        text: impl Into<String>,
        correct: bool,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyOptionText);
        }
        Ok(Self { id, text, correct })
    }

    #[must_use]
    pub fn id(&self) -> AnswerId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.correct
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A question as authored: text, kind, point value, and its ordered options.
///
/// For `TextAnswer` questions the first option (if any) holds the reference
/// answer used for grading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    kind: QuestionKind,
    points: u32,
    options: Vec<AnswerOption>,
}

impl Question {
    /// Creates a question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyText` if the text is blank,
    /// `QuestionError::InvalidPoints` if `points` is zero, or
    /// `QuestionError::NotEnoughOptions` if a choice question has fewer than
    /// two options.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        kind: QuestionKind,
        points: u32,
        options: Vec<AnswerOption>,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if points == 0 {
            return Err(QuestionError::InvalidPoints);
        }
        if kind.is_choice() && options.len() < 2 {
            return Err(QuestionError::NotEnoughOptions);
        }
        Ok(Self {
            id,
            text,
            kind,
            points,
            options,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn points(&self) -> u32 {
        self.points
    }

    #[must_use]
    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    /// IDs of the options flagged correct, in option order.
    #[must_use]
    pub fn correct_option_ids(&self) -> Vec<AnswerId> {
        self.options
            .iter()
            .filter(|option| option.correct)
            .map(AnswerOption::id)
            .collect()
    }

    /// Strips correctness flags, producing the shape served to a live attempt.
    #[must_use]
    pub fn sanitize(&self) -> SanitizedQuestion {
        SanitizedQuestion {
            id: self.id,
            text: self.text.clone(),
            kind: self.kind,
            points: self.points,
            options: self
                .options
                .iter()
                .map(|option| SanitizedOption {
                    id: option.id,
                    text: option.text.clone(),
                })
                .collect(),
        }
    }
}

//
// ─── SANITIZED SHAPES ──────────────────────────────────────────────────────────
//

/// An answer option with the correctness flag removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedOption {
    pub id: AnswerId,
    pub text: String,
}

/// A question as served to a live attempt: no correctness information exists
/// on this type, so a client holding it cannot leak answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedQuestion {
    pub id: QuestionId,
    pub text: String,
    pub kind: QuestionKind,
    pub points: u32,
    pub options: Vec<SanitizedOption>,
}
