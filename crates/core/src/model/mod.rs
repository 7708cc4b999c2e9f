mod answer;
mod attempt;
mod ids;
mod outcome;
mod question;

pub use ids::{AnswerId, AttemptId, ParseIdError, QuestionId, StudentId, TestId};

pub use answer::{Response, SubmittedAnswer};
pub use attempt::{Attempt, AttemptError, AttemptStatus};
pub use outcome::{GradedAttempt, GradedAttemptError, QuestionGrade};
pub use question::{
    AnswerOption, Question, QuestionError, QuestionKind, SanitizedOption, SanitizedQuestion,
};
pub use test::{TestDefinition, TestError};
