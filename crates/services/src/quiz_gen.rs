//! Idempotent quiz materialization.
//!
//! A quiz exists at most once per (section, scope). The shell row is
//! inserted inactive, questions are persisted one by one, and only then are
//! the totals written and the quiz activated, so a half-built quiz is never
//! offered to a learner. Re-running the generator returns the existing quiz;
//! an inactive leftover from an interrupted build is rebuilt from scratch.

use std::sync::Arc;

use rand::Rng;

use pacer_core::curriculum::{CurriculumConfig, Difficulty};
use pacer_core::model::{AnswerOption, Question, QuestionKind, Quiz, QuizScope};
use pacer_core::time::Clock;
use storage::repository::{NewQuestionRecord, NewQuizRecord, QuizRepository, StorageError};
use tracing::info;

use crate::error::QuizGenError;

const OPTION_KEYS: [&str; 4] = ["A", "B", "C", "D"];

/// A quiz together with its questions in presentation order.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuiz {
    pub quiz: Quiz,
    pub questions: Vec<Question>,
}

struct QuestionBlueprint {
    text: String,
    kind: QuestionKind,
    correct_answer: String,
    points: u32,
}

/// Materializes weekly and cumulative quizzes from the curriculum pacing
/// rules.
pub struct QuizGenService {
    clock: Clock,
    config: CurriculumConfig,
    quizzes: Arc<dyn QuizRepository>,
}

impl QuizGenService {
    #[must_use]
    pub fn new(clock: Clock, config: CurriculumConfig, quizzes: Arc<dyn QuizRepository>) -> Self {
        Self {
            clock,
            config,
            quizzes,
        }
    }

    /// The one-question quiz for a single week, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns `QuizGenError` for a zero week or on storage failure.
    pub async fn weekly_quiz(
        &self,
        section: &str,
        week: u32,
    ) -> Result<GeneratedQuiz, QuizGenError> {
        let scope = QuizScope::Weekly { week };
        scope.validate()?;

        let blueprint = vec![weekly_question(section, week)];
        self.ensure_quiz(
            section,
            scope,
            self.config.difficulty_for_week(week),
            self.config.weekly_time_limit_minutes(),
            blueprint,
        )
        .await
    }

    /// The cumulative quiz closing the cycle that ends at `end_week`.
    ///
    /// Question count scales with progress within the configured bounds;
    /// the time limit scales with the question count.
    ///
    /// # Errors
    ///
    /// Returns `QuizGenError::NotCycleBoundary` when `end_week` does not
    /// close a cycle, or a storage error.
    pub async fn cumulative_quiz(
        &self,
        section: &str,
        end_week: u32,
    ) -> Result<GeneratedQuiz, QuizGenError> {
        if !self.config.is_cycle_end(end_week) {
            return Err(QuizGenError::NotCycleBoundary { week: end_week });
        }
        let start_week = self.config.cycle_start(end_week);
        let scope = QuizScope::Cumulative {
            start_week,
            end_week,
        };

        let count = self.config.cumulative_question_count(end_week);
        let blueprint = cumulative_questions(section, start_week, end_week, count);
        self.ensure_quiz(
            section,
            scope,
            self.config.difficulty_for_week(end_week),
            self.config.cumulative_time_limit_minutes(count),
            blueprint,
        )
        .await
    }

    async fn ensure_quiz(
        &self,
        section: &str,
        scope: QuizScope,
        difficulty: Difficulty,
        time_limit_minutes: u32,
        blueprint: Vec<QuestionBlueprint>,
    ) -> Result<GeneratedQuiz, QuizGenError> {
        let quiz = match self.quizzes.find_quiz(section, &scope).await? {
            Some(existing) if existing.is_active() => {
                let questions = self.quizzes.questions_for_quiz(existing.id()).await?;
                return Ok(GeneratedQuiz {
                    quiz: existing,
                    questions,
                });
            }
            Some(half_built) => {
                // Interrupted build: throw the partial questions away and
                // rebuild against the same shell.
                self.quizzes.delete_questions(half_built.id()).await?;
                half_built
            }
            None => {
                let record = NewQuizRecord {
                    section: section.to_owned(),
                    scope,
                    difficulty,
                    time_limit_minutes,
                    max_attempts: self.config.quiz_max_attempts(),
                    passing_score_percent: self.config.passing_score_percent(),
                    created_at: self.clock.now(),
                };
                match self.quizzes.insert_quiz(&record).await {
                    Ok(id) => self.quizzes.get_quiz(id).await?,
                    // Another writer created the shell first; use theirs.
                    Err(StorageError::Conflict) => {
                        let existing = self
                            .quizzes
                            .find_quiz(section, &scope)
                            .await?
                            .ok_or(StorageError::NotFound)?;
                        if existing.is_active() {
                            let questions =
                                self.quizzes.questions_for_quiz(existing.id()).await?;
                            return Ok(GeneratedQuiz {
                                quiz: existing,
                                questions,
                            });
                        }
                        self.quizzes.delete_questions(existing.id()).await?;
                        existing
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let total_questions = u32::try_from(blueprint.len()).unwrap_or(u32::MAX);
        let mut total_points = 0;
        for (index, question) in blueprint.into_iter().enumerate() {
            total_points += question.points;
            self.quizzes
                .insert_question(&NewQuestionRecord {
                    quiz_id: quiz.id(),
                    text: question.text,
                    kind: question.kind,
                    correct_answer: question.correct_answer,
                    points: question.points,
                    order_index: u32::try_from(index).unwrap_or(u32::MAX),
                    difficulty,
                })
                .await?;
        }

        // Totals and activation land together, after the last question.
        let quiz = self
            .quizzes
            .finalize_quiz(quiz.id(), total_questions, total_points)
            .await?;
        let questions = self.quizzes.questions_for_quiz(quiz.id()).await?;
        info!(
            quiz = %quiz.id(),
            section,
            scope = quiz.scope().storage_key(),
            questions = questions.len(),
            "materialized quiz"
        );
        Ok(GeneratedQuiz { quiz, questions })
    }
}

/// Shuffle-free option layout: texts keep their authored order and the
/// correct key is drawn at random, so the correct option's position does
/// not leak through ordering.
fn multiple_choice(option_texts: [String; 4]) -> (QuestionKind, String) {
    let correct = rand::rng().random_range(0..OPTION_KEYS.len());
    let mut texts = option_texts;
    texts.swap(0, correct);
    let options = OPTION_KEYS
        .iter()
        .zip(texts)
        .map(|(key, text)| AnswerOption::new(*key, text))
        .collect();
    (
        QuestionKind::MultipleChoice { options },
        OPTION_KEYS[correct].to_owned(),
    )
}

fn weekly_question(section: &str, week: u32) -> QuestionBlueprint {
    let text = format!("Which statement best summarizes the week {week} material in {section}?");
    let (kind, correct_answer) = multiple_choice(
        [
            format!("Key idea of week {week}, stated accurately"),
            format!("A claim week {week} explicitly refutes"),
            "A detail from a later week".to_owned(),
            "An unrelated statement".to_owned(),
        ],
    );
    QuestionBlueprint {
        text,
        kind,
        correct_answer,
        points: 1,
    }
}

/// One question per slot, cycling through the covered weeks and the four
/// question forms. Points grow by one for every five questions.
fn cumulative_questions(
    section: &str,
    start_week: u32,
    end_week: u32,
    count: u32,
) -> Vec<QuestionBlueprint> {
    let span = end_week - start_week + 1;
    (0..count)
        .map(|i| {
            let week = start_week + i % span;
            let points = 1 + i / 5;
            match i % 4 {
                0 => {
                    let text = format!(
                        "Which statement best reviews the week {week} material in {section}?"
                    );
                    let (kind, correct_answer) = multiple_choice(
                        [
                            format!("Key idea of week {week}, stated accurately"),
                            format!("A claim week {week} explicitly refutes"),
                            format!("A detail from outside weeks {start_week}-{end_week}"),
                            "An unrelated statement".to_owned(),
                        ],
                    );
                    QuestionBlueprint {
                        text,
                        kind,
                        correct_answer,
                        points,
                    }
                }
                1 => QuestionBlueprint {
                    text: format!(
                        "True or false: week {week} is part of the material covered by this review"
                    ),
                    kind: QuestionKind::TrueFalse,
                    correct_answer: "true".to_owned(),
                    points,
                },
                2 => QuestionBlueprint {
                    text: format!(
                        "Fill in the blank: the week {week} material in {section} belongs to cycle week ___"
                    ),
                    kind: QuestionKind::FillInBlank,
                    correct_answer: format!("week {week}"),
                    points,
                },
                _ => QuestionBlueprint {
                    text: format!("Briefly restate the main idea of week {week} in {section}"),
                    kind: QuestionKind::ShortAnswer,
                    correct_answer: format!("the main idea of week {week}"),
                    points,
                },
            }
        })
        .collect()
}
