//! SQL stages: synthesis, validation/repair and the well-formedness gate

pub mod synthesizer;
pub mod validator;
pub mod well_formed;

pub use synthesizer::{RetryFeedback, SqlSynthesizer};
pub use validator::SqlValidator;
pub use well_formed::{check_well_formed, ValidationStatus};

use crate::column_selector::{render_rows, ColumnSelectionRow};
use crate::filters::FilterList;

/// Inputs shared by the synthesizer and the validator.
#[derive(Debug, Clone, Copy)]
pub struct SqlContext<'a> {
    pub question: &'a str,
    pub columns: &'a [ColumnSelectionRow],
    pub filters: &'a FilterList,
}

impl<'a> SqlContext<'a> {
    pub fn new(question: &'a str, columns: &'a [ColumnSelectionRow], filters: &'a FilterList) -> Self {
        Self {
            question,
            columns,
            filters,
        }
    }

    /// Human turn common to both SQL stages.
    pub(crate) fn render(&self) -> String {
        format!(
            "User question:\n{}\n\nRelevant tables and columns:\n{}\n\nApplicable filters:\n{}",
            self.question,
            render_rows(self.columns),
            self.filters
        )
    }
}
