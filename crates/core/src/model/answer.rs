use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::ids::{AnswerId, QuestionId};
use crate::model::question::QuestionKind;

//
// ─── RESPONSE ──────────────────────────────────────────────────────────────────
//

/// The test-taker's current answer to one question, shaped by the question
/// kind. Lives only for the duration of the attempt; superseded by the graded
/// result after submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// At most one selected option.
    Single(Option<AnswerId>),
    /// Any subset of selected options.
    Multiple(BTreeSet<AnswerId>),
    /// Free text.
    Text(String),
}

impl Response {
    /// The typed empty response for a question kind: no selection, empty set,
    /// or empty string.
    #[must_use]
    pub fn empty_for(kind: QuestionKind) -> Self {
        match kind {
            QuestionKind::SingleChoice => Self::Single(None),
            QuestionKind::MultipleChoice => Self::Multiple(BTreeSet::new()),
            QuestionKind::TextAnswer => Self::Text(String::new()),
        }
    }

    /// The question kind this response shape belongs to.
    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        match self {
            Self::Single(_) => QuestionKind::SingleChoice,
            Self::Multiple(_) => QuestionKind::MultipleChoice,
            Self::Text(_) => QuestionKind::TextAnswer,
        }
    }

    /// Non-null and non-empty, for all three shapes.
    #[must_use]
    pub fn is_answered(&self) -> bool {
        match self {
            Self::Single(selected) => selected.is_some(),
            Self::Multiple(selected) => !selected.is_empty(),
            Self::Text(text) => !text.trim().is_empty(),
        }
    }

    /// Normalizes into the submission entry for `question_id`: choice shapes
    /// carry selected option ids and no text, text answers always carry the
    /// text and an empty id list.
    #[must_use]
    pub fn to_submitted(&self, question_id: QuestionId) -> SubmittedAnswer {
        match self {
            Self::Single(selected) => SubmittedAnswer {
                question_id,
                selected_answer_ids: selected.iter().copied().collect(),
                text_answer: None,
            },
            Self::Multiple(selected) => SubmittedAnswer {
                question_id,
                selected_answer_ids: selected.iter().copied().collect(),
                text_answer: None,
            },
            Self::Text(text) => SubmittedAnswer {
                question_id,
                selected_answer_ids: Vec::new(),
                text_answer: Some(text.clone()),
            },
        }
    }
}

//
// ─── SUBMITTED ANSWER ──────────────────────────────────────────────────────────
//

/// One normalized entry of a submission payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: QuestionId,
    pub selected_answer_ids: Vec<AnswerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_answer: Option<String>,
}
