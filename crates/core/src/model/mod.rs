mod activity;
mod attempt;
mod ids;
mod learner;
mod material;
mod question;
mod quiz;

pub use activity::{ActivityKind, ActivityRecord, ParseActivityError};
pub use attempt::{
    AnswerRecord, AttemptStatus, AttemptTransitionError, ParseStatusError, QuizAttempt,
};
pub use ids::{AttemptId, LearnerId, ParseIdError, QuestionId, QuizId};
pub use learner::{Learner, LearnerError};
pub use material::Material;
pub use question::{AnswerOption, Question, QuestionError, QuestionKind};
pub use quiz::{Quiz, QuizError, QuizScope};
