#![forbid(unsafe_code)]

pub mod memory;
pub mod repository;
pub mod sqlite;

pub use memory::InMemoryRepository;
pub use repository::{
    AttemptRepository, ContentRepository, LearnerRepository, NewAttemptRecord, NewLearnerRecord,
    NewQuestionRecord, NewQuizRecord, QuizRepository, Storage, StorageError,
};
pub use sqlite::{SqliteInitError, SqliteRepository};
