#![forbid(unsafe_code)]

pub mod curriculum;
pub mod evaluate;
pub mod model;
pub mod time;

pub use curriculum::{CurriculumConfig, CurriculumError, Difficulty, Milestone};
pub use evaluate::{Evaluation, evaluate_answer, evaluate_answer_with_threshold};
pub use time::Clock;
