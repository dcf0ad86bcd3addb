//! Answer evaluation for all question kinds.
//!
//! Submitted answers are compared against the stored correct answer after
//! trimming and lowercasing. True/false questions accept a bilingual set of
//! synonyms, and free-text questions match on token overlap against the
//! correct answer's tokens.

use std::collections::HashSet;

use crate::model::{Question, QuestionKind};

/// Minimum share of the correct answer's tokens a free-text submission must
/// cover to count as correct.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.8;

const TRUE_SYNONYMS: &[&str] = &["true", "صح", "صحيح", "1", "yes", "نعم"];
const FALSE_SYNONYMS: &[&str] = &["false", "خطأ", "خاطئ", "0", "no", "لا"];

/// Outcome of grading one submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub is_correct: bool,
    pub points_earned: u32,
}

impl Evaluation {
    fn graded(question: &Question, is_correct: bool) -> Self {
        Self {
            is_correct,
            points_earned: if is_correct { question.points() } else { 0 },
        }
    }
}

/// Grades `submitted` against `question` with the default match threshold.
#[must_use]
pub fn evaluate_answer(question: &Question, submitted: &str) -> Evaluation {
    evaluate_answer_with_threshold(question, submitted, DEFAULT_MATCH_THRESHOLD)
}

/// Grades `submitted` against `question`, using `threshold` for the
/// token-overlap match on fill-in-blank and short-answer questions.
#[must_use]
pub fn evaluate_answer_with_threshold(
    question: &Question,
    submitted: &str,
    threshold: f64,
) -> Evaluation {
    let submitted = normalize(submitted);
    let correct = normalize(question.correct_answer());

    let is_correct = match question.kind() {
        QuestionKind::MultipleChoice { .. } => submitted == correct,
        QuestionKind::TrueFalse => match (truthiness(&submitted), truthiness(&correct)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        QuestionKind::FillInBlank | QuestionKind::ShortAnswer => {
            submitted == correct || token_overlap(&submitted, &correct) >= threshold
        }
    };

    Evaluation::graded(question, is_correct)
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Maps a normalized token onto a boolean if it is a known true/false
/// synonym in either language.
fn truthiness(token: &str) -> Option<bool> {
    if TRUE_SYNONYMS.contains(&token) {
        Some(true)
    } else if FALSE_SYNONYMS.contains(&token) {
        Some(false)
    } else {
        None
    }
}

/// Share of `correct`'s whitespace tokens that also appear in `submitted`.
/// An empty correct answer yields 0.
fn token_overlap(submitted: &str, correct: &str) -> f64 {
    let correct_tokens: HashSet<&str> = correct.split_whitespace().collect();
    if correct_tokens.is_empty() {
        return 0.0;
    }
    let submitted_tokens: HashSet<&str> = submitted.split_whitespace().collect();
    let shared = correct_tokens.intersection(&submitted_tokens).count();
    shared as f64 / correct_tokens.len() as f64
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
