pub mod catalog;
pub mod column_selector;
pub mod config;
pub mod db;
pub mod decomposer;
pub mod error;
pub mod filters;
pub mod fuzzy_matcher;
pub mod llm;
pub mod normalizer;
pub mod parallel;
pub mod pipeline;
pub mod prompts;
pub mod resolver;
pub mod router;
pub mod sql;

pub use error::{NlqError, Result};
pub use pipeline::{Pipeline, RunOutcome};
