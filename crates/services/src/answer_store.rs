use std::collections::HashMap;

use exam_core::model::{QuestionId, Response, SanitizedQuestion, SubmittedAnswer};

/// Local answer state for one attempt: question id → current [`Response`],
/// in the order the questions were served.
///
/// Entries are created empty and typed when the question set arrives, and a
/// recorded response must match its entry's shape, so a text response can
/// never land on a choice question. Nothing here survives the process; a resumed
/// attempt starts from empty responses again.
#[derive(Debug, Clone, Default)]
pub struct AnswerStore {
    order: Vec<QuestionId>,
    entries: HashMap<QuestionId, Response>,
}

impl AnswerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the store with one typed empty entry per served question.
    #[must_use]
    pub fn for_questions(questions: &[SanitizedQuestion]) -> Self {
        let order: Vec<QuestionId> = questions.iter().map(|question| question.id).collect();
        let entries = questions
            .iter()
            .map(|question| (question.id, Response::empty_for(question.kind)))
            .collect();
        Self { order, entries }
    }

    /// Replaces the response for `question_id`.
    ///
    /// Returns false, leaving the store untouched, for an unknown question
    /// or a response whose shape does not match the question kind.
    pub fn record(&mut self, question_id: QuestionId, response: Response) -> bool {
        match self.entries.get_mut(&question_id) {
            Some(entry) if entry.kind() == response.kind() => {
                *entry = response;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn get(&self, question_id: QuestionId) -> Option<&Response> {
        self.entries.get(&question_id)
    }

    /// Non-null and non-empty, per the response shape. Unknown questions are
    /// unanswered.
    #[must_use]
    pub fn is_answered(&self, question_id: QuestionId) -> bool {
        self.entries
            .get(&question_id)
            .is_some_and(Response::is_answered)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.order
            .iter()
            .filter(|id| self.is_answered(**id))
            .count()
    }

    /// Question ids without an answer yet, in served order.
    #[must_use]
    pub fn unanswered(&self) -> Vec<QuestionId> {
        self.order
            .iter()
            .copied()
            .filter(|id| !self.is_answered(*id))
            .collect()
    }

    /// The normalized submission payload, one entry per question in served
    /// order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SubmittedAnswer> {
        self.order
            .iter()
            .filter_map(|id| {
                self.entries
                    .get(id)
                    .map(|response| response.to_submitted(*id))
            })
            .collect()
    }
}
