//! Parsing error types for table page markup
//!
//! A missing table is fatal for the whole fetch: the page either never
//! rendered or the portal changed its layout.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Table root '{selector}' not found in page markup")]
    TableNotFound { selector: String },

    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Page count indicator '{selector}' not found")]
    PageCountMissing { selector: String },

    #[error("Page count indicator text '{text}' is not a number")]
    PageCountUnparseable { text: String },
}

impl ParsingError {
    pub fn invalid_selector(selector: &str, reason: impl ToString) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
