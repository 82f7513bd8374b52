//! Error Recovery
//!
//! Builds class-specific repair guidance for the next attempt's prompt.

use crate::execution_loop::error_classifier::SqlErrorClass;

/// Repair hint builder
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorRecovery;

impl ErrorRecovery {
    pub fn new() -> Self {
        Self
    }

    /// Guidance appended after the verbatim failure text.
    pub fn build_hint(&self, error_class: SqlErrorClass, attempt: u32, tables: &[&str]) -> String {
        let mut prompt_parts = Vec::new();

        prompt_parts.push(format!(
            "RETRY ATTEMPT {}: the previous query failed ({}).",
            attempt, error_class
        ));

        match error_class {
            SqlErrorClass::ColumnNotFound => {
                prompt_parts.push("A column referenced in the query does not exist.".to_string());
                prompt_parts.push(
                    "Use only field names listed in the schema context, spelled exactly as shown.".to_string(),
                );
            }
            SqlErrorClass::TableNotFound => {
                prompt_parts.push("A table referenced in the query does not exist.".to_string());
                if !tables.is_empty() {
                    prompt_parts.push(format!("Available tables: {}", tables.join(", ")));
                }
            }
            SqlErrorClass::Syntax => {
                prompt_parts.push(
                    "The query is not valid SQL Server (Transact-SQL) syntax. Use `SELECT TOP n` instead of LIMIT and check keywords, commas and parentheses.".to_string(),
                );
            }
            SqlErrorClass::AmbiguousColumn => {
                prompt_parts.push("A column reference is ambiguous (exists in multiple tables).".to_string());
                prompt_parts.push("Qualify the column with its table name or alias.".to_string());
            }
            SqlErrorClass::Timeout => {
                prompt_parts.push("The query took too long to run.".to_string());
                prompt_parts.push(
                    "Make it cheaper: add selective WHERE conditions on indexed fields and avoid unnecessary joins.".to_string(),
                );
            }
            SqlErrorClass::EmptyResult => {
                prompt_parts.push("The query returned no rows although the question expects matches.".to_string());
                prompt_parts.push("Check filter values, units and comparison directions.".to_string());
            }
            SqlErrorClass::MalformedResult => {
                prompt_parts.push(
                    "The data returned was not well-structured, seemed empty, or looked like a single long string instead of tabular data.".to_string(),
                );
            }
            SqlErrorClass::NoStatement => {
                prompt_parts.push("No SQL statement could be found in the previous response.".to_string());
                prompt_parts.push("Reply with exactly one SQL query and nothing else.".to_string());
            }
            SqlErrorClass::Other => {
                prompt_parts.push("Review the failure above and fix the query accordingly.".to_string());
            }
        }

        prompt_parts.join("\n")
    }
}
