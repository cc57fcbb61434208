//! Structural gate on the validated statement.
//!
//! Only checks that the text parses as exactly one MySQL query. Whether the
//! query answers the question stays with the validator stage.

use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed { reason: String },
}

impl ValidationStatus {
    pub fn is_passed(&self) -> bool {
        matches!(self, ValidationStatus::Passed)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ValidationStatus::Passed => None,
            ValidationStatus::Failed { reason } => Some(reason),
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        ValidationStatus::Failed { reason: reason.into() }
    }
}

pub fn check_well_formed(sql: &str) -> ValidationStatus {
    let sql = sql.trim();
    if sql.is_empty() {
        return ValidationStatus::failed("empty statement");
    }

    let dialect = MySqlDialect {};
    match Parser::parse_sql(&dialect, sql) {
        Ok(statements) => match statements.as_slice() {
            [Statement::Query(_)] => ValidationStatus::Passed,
            [] => ValidationStatus::failed("empty statement"),
            [_] => ValidationStatus::failed("statement is not a query"),
            many => ValidationStatus::failed(format!("expected one statement, found {}", many.len())),
        },
        Err(e) => ValidationStatus::failed(format!("SQL parse error: {}", e)),
    }
}
