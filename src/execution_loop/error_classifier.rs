//! Error Classifier
//!
//! Classifies attempt failures into a taxonomy for repair hints.

use crate::error::FailureKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL error classification taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlErrorClass {
    ColumnNotFound,
    TableNotFound,
    Syntax,
    AmbiguousColumn,
    Timeout,
    EmptyResult,
    MalformedResult,
    NoStatement,
    Other,
}

impl fmt::Display for SqlErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlErrorClass::ColumnNotFound => write!(f, "ColumnNotFound"),
            SqlErrorClass::TableNotFound => write!(f, "TableNotFound"),
            SqlErrorClass::Syntax => write!(f, "Syntax"),
            SqlErrorClass::AmbiguousColumn => write!(f, "AmbiguousColumn"),
            SqlErrorClass::Timeout => write!(f, "Timeout"),
            SqlErrorClass::EmptyResult => write!(f, "EmptyResult"),
            SqlErrorClass::MalformedResult => write!(f, "MalformedResult"),
            SqlErrorClass::NoStatement => write!(f, "NoStatement"),
            SqlErrorClass::Other => write!(f, "Other"),
        }
    }
}

/// Error classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a failed attempt by its kind and message
    pub fn classify(&self, kind: FailureKind, message: &str) -> SqlErrorClass {
        match kind {
            FailureKind::Timeout => return SqlErrorClass::Timeout,
            FailureKind::SqlExtraction => return SqlErrorClass::NoStatement,
            _ => {}
        }

        let msg = message.to_lowercase();

        if msg.contains("ambiguous column") {
            return SqlErrorClass::AmbiguousColumn;
        }

        // SQL Server: "Invalid column name 'x'"
        if msg.contains("invalid column")
            || (msg.contains("column") && (msg.contains("not found") || msg.contains("does not exist")))
        {
            return SqlErrorClass::ColumnNotFound;
        }

        // SQL Server: "Invalid object name 'x'"
        if msg.contains("invalid object name")
            || (msg.contains("table") && (msg.contains("not found") || msg.contains("does not exist")))
        {
            return SqlErrorClass::TableNotFound;
        }

        if msg.contains("syntax") || msg.contains("error near") {
            return SqlErrorClass::Syntax;
        }

        if msg.contains("timed out") || msg.contains("timeout") {
            return SqlErrorClass::Timeout;
        }

        if kind == FailureKind::Verification {
            if msg.contains("no rows") || msg.contains("empty result") {
                return SqlErrorClass::EmptyResult;
            }
            if msg.contains("structural") {
                return SqlErrorClass::MalformedResult;
            }
        }

        SqlErrorClass::Other
    }
}
