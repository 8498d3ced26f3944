pub mod classifier;
pub mod mode;

pub use classifier::{RelevanceClassifier, MAX_SEMANTIC_INPUT_CHARS};
pub use mode::MatchMode;
