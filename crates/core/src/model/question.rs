use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::curriculum::Difficulty;
use crate::model::ids::{QuestionId, QuizId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("correct answer cannot be empty")]
    EmptyCorrectAnswer,

    #[error("multiple choice questions need at least 2 options, got {0}")]
    TooFewOptions(usize),

    #[error("question points must be > 0")]
    ZeroPoints,
}

//
// ─── QUESTION KIND ─────────────────────────────────────────────────────────────
//

/// One selectable option of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub key: String,
    pub text: String,
}

impl AnswerOption {
    #[must_use]
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

/// Closed set of question forms; the evaluator matches exhaustively on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionKind {
    MultipleChoice { options: Vec<AnswerOption> },
    TrueFalse,
    FillInBlank,
    ShortAnswer,
}

impl QuestionKind {
    /// Storage discriminant for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice { .. } => "multiple_choice",
            QuestionKind::TrueFalse => "true_false",
            QuestionKind::FillInBlank => "fill_in_blank",
            QuestionKind::ShortAnswer => "short_answer",
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single quiz question with its scoring weight and position.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    id: QuestionId,
    quiz_id: QuizId,
    text: String,
    kind: QuestionKind,
    correct_answer: String,
    points: u32,
    order_index: u32,
    difficulty: Difficulty,
}

impl Question {
    /// Rehydrate a question from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` for empty text/answer, too few options on a
    /// multiple-choice question, or zero points.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: QuestionId,
        quiz_id: QuizId,
        text: impl Into<String>,
        kind: QuestionKind,
        correct_answer: impl Into<String>,
        points: u32,
        order_index: u32,
        difficulty: Difficulty,
    ) -> Result<Self, QuestionError> {
        let text = text.into().trim().to_owned();
        if text.is_empty() {
            return Err(QuestionError::EmptyText);
        }
        let correct_answer = correct_answer.into().trim().to_owned();
        if correct_answer.is_empty() {
            return Err(QuestionError::EmptyCorrectAnswer);
        }
        if let QuestionKind::MultipleChoice { options } = &kind {
            if options.len() < 2 {
                return Err(QuestionError::TooFewOptions(options.len()));
            }
        }
        if points == 0 {
            return Err(QuestionError::ZeroPoints);
        }

        Ok(Self {
            id,
            quiz_id,
            text,
            kind,
            correct_answer,
            points,
            order_index,
            difficulty,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn kind(&self) -> &QuestionKind {
        &self.kind
    }

    #[must_use]
    pub fn correct_answer(&self) -> &str {
        &self.correct_answer
    }

    #[must_use]
    pub fn points(&self) -> u32 {
        self.points
    }

    #[must_use]
    pub fn order_index(&self) -> u32 {
        self.order_index
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
