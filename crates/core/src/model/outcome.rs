use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{AttemptId, QuestionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GradedAttemptError {
    #[error("score ({score}) exceeds max score ({max_score})")]
    ScoreExceedsMax { score: u32, max_score: u32 },

    #[error("score ({score}) does not match breakdown total ({sum})")]
    BreakdownMismatch { score: u32, sum: u32 },
}

/// How one question was graded.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionGrade {
    pub question_id: QuestionId,
    pub correct: bool,
    pub earned_points: u32,
    /// Partial-credit ratio for multiple-choice questions; `None` for kinds
    /// graded all-or-nothing.
    pub partial_ratio: Option<f64>,
}

/// The server-computed result of a submitted attempt. Created exactly once
/// per attempt and immutable thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedAttempt {
    attempt_id: AttemptId,
    score: u32,
    max_score: u32,
    completed_at: DateTime<Utc>,
    breakdown: Vec<QuestionGrade>,
}

impl GradedAttempt {
    /// Builds a result from a per-question breakdown, summing the score.
    ///
    /// # Errors
    ///
    /// Returns `GradedAttemptError::ScoreExceedsMax` if the summed score is
    /// larger than `max_score`.
    pub fn from_breakdown(
        attempt_id: AttemptId,
        max_score: u32,
        completed_at: DateTime<Utc>,
        breakdown: Vec<QuestionGrade>,
    ) -> Result<Self, GradedAttemptError> {
        let score = breakdown
            .iter()
            .map(|grade| grade.earned_points)
            .fold(0_u32, u32::saturating_add);
        Self::from_persisted(attempt_id, score, max_score, completed_at, breakdown)
    }

    /// Rehydrates a result from persisted or transferred fields.
    ///
    /// # Errors
    ///
    /// Returns `GradedAttemptError::BreakdownMismatch` if the breakdown does
    /// not sum to `score` (a non-empty breakdown is the source of truth), or
    /// `GradedAttemptError::ScoreExceedsMax` if `score` exceeds `max_score`.
    pub fn from_persisted(
        attempt_id: AttemptId,
        score: u32,
        max_score: u32,
        completed_at: DateTime<Utc>,
        breakdown: Vec<QuestionGrade>,
    ) -> Result<Self, GradedAttemptError> {
        if !breakdown.is_empty() {
            let sum = breakdown
                .iter()
                .map(|grade| grade.earned_points)
                .fold(0_u32, u32::saturating_add);
            if sum != score {
                return Err(GradedAttemptError::BreakdownMismatch { score, sum });
            }
        }
        if score > max_score {
            return Err(GradedAttemptError::ScoreExceedsMax { score, max_score });
        }

        Ok(Self {
            attempt_id,
            score,
            max_score,
            completed_at,
            breakdown,
        })
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn max_score(&self) -> u32 {
        self.max_score
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn breakdown(&self) -> &[QuestionGrade] {
        &self.breakdown
    }

    #[must_use]
    pub fn is_perfect(&self) -> bool {
        self.score == self.max_score
    }

    /// Score as a percentage of the maximum; zero when the maximum is zero.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.max_score == 0 {
            return 0.0;
        }
        f64::from(self.score) * 100.0 / f64::from(self.max_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn grade(question: u64, earned: u32, correct: bool) -> QuestionGrade {
        QuestionGrade {
            question_id: QuestionId::new(question),
            correct,
            earned_points: earned,
            partial_ratio: None,
        }
    }

    #[test]
    fn sums_breakdown() {
        let graded = GradedAttempt::from_breakdown(
            AttemptId::new(1),
            5,
            fixed_now(),
            vec![grade(1, 2, true), grade(2, 0, false), grade(3, 3, true)],
        )
        .unwrap();

        assert_eq!(graded.score(), 5);
        assert!(graded.is_perfect());
        assert_eq!(graded.percentage(), 100.0);
    }

    #[test]
    fn rejects_score_above_max() {
        let err = GradedAttempt::from_breakdown(
            AttemptId::new(1),
            1,
            fixed_now(),
            vec![grade(1, 2, true)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            GradedAttemptError::ScoreExceedsMax {
                score: 2,
                max_score: 1
            }
        );
    }

    #[test]
    fn rejects_mismatched_persisted_score() {
        let err = GradedAttempt::from_persisted(
            AttemptId::new(1),
            3,
            10,
            fixed_now(),
            vec![grade(1, 2, true)],
        )
        .unwrap_err();
        assert_eq!(err, GradedAttemptError::BreakdownMismatch { score: 3, sum: 2 });
    }

    #[test]
    fn empty_breakdown_is_allowed_for_forfeited_attempts() {
        let graded =
            GradedAttempt::from_persisted(AttemptId::new(1), 0, 10, fixed_now(), Vec::new())
                .unwrap();
        assert_eq!(graded.score(), 0);
        assert_eq!(graded.percentage(), 0.0);
    }
}
