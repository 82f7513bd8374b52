//! Agent Prompts - system prompts and request construction for every generator call
//!
//! Everything here is pure: identical inputs always render identical requests.

use crate::execution::result::QueryResult;
use crate::llm::ChatMessage;
use crate::schema_rag::retriever::RetrievedContext;
use serde::{Deserialize, Serialize};

/// Fields per table rendered into the prompt context.
pub const MAX_FIELDS_PER_TABLE_IN_PROMPT: usize = 20;

/// Result rows shown to the judge and in repair prompts.
pub const RESULT_SAMPLE_ROWS: usize = 10;

pub const NO_SCHEMA_CONTEXT: &str = "No specific table schema context available. \
Please use general SDSS knowledge, focusing on common tables like PhotoObjAll or SpecObjAll if appropriate.";

pub const SQL_GENERATION_SYSTEM_PROMPT: &str = r#"You are an expert SDSS SQL query writer. Your task is to generate a single, valid, executable SQL query for the SDSS SkyServer (Transact-SQL dialect) based on the provided table schema(s) and the user's request.

Strictly follow these rules:
1. Analyze the user's request and the provided table schema(s) carefully.
2. Prioritize the table(s) and field(s) from the provided context that are most relevant to the request.
3. Only use table names and field names explicitly listed in the provided schema context. Do not invent tables or fields.
4. Construct a single, executable SQL query.
5. Include `TOP {top_n}` in the SELECT clause, for example: `SELECT TOP {top_n} ra, dec FROM PhotoObjAll`.
6. If the user asks for specific columns, SELECT those. Otherwise `SELECT TOP {top_n} *` is acceptable.
7. Pay close attention to field types in WHERE conditions (strings quoted, numbers unquoted).
8. Return ONLY the SQL query. No explanations, comments, or markdown."#;

pub const SQL_REPAIR_SYSTEM_PROMPT: &str = r#"You are an expert SDSS SQL query writer. Your task is to REPAIR a previously generated SQL query using the database error or verification problem reported below. Do not start over: keep the parts of the query that were correct and change only what the failure points at.

The corrected query must use the SDSS SkyServer (Transact-SQL dialect) syntax, must include `TOP {top_n}` in the SELECT clause, and must only use tables and fields from the provided schema context.
Return ONLY the corrected SQL query, with no additional text, comments, or markdown."#;

pub const VERIFICATION_SYSTEM_PROMPT: &str = r#"You review SQL queries written for the SDSS SkyServer astronomical database. Decide whether the SQL query and the sample of its result actually answer the user's question.

Respond with a single JSON object and nothing else:
{"verdict": "pass" | "fail", "confidence": <number between 0 and 1>, "reasoning": "<one or two sentences>"}

Use "fail" when the query filters on the wrong quantity, uses the wrong table or units, ignores part of the question, or when an empty result is clearly wrong for the question. An empty result is acceptable when the question may legitimately have no matches."#;

pub const EXPLANATION_SYSTEM_PROMPT: &str = "You are a helpful assistant. Your task is to explain SQL queries related to the SDSS (Sloan Digital Sky Survey) astronomical database in simple, clear terms. Focus on what data the query retrieves and why it might be useful for an astronomer or student. Avoid jargon where possible, or explain it if necessary.";

/// Why a generator call is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPurpose {
    Generate,
    Repair,
    Judge,
    Explain,
}

/// What the previous attempt produced and why it was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorAttempt {
    pub sql: String,
    /// Execution error text or verification failure reason, verbatim.
    pub failure: String,
    /// Class-specific repair guidance.
    pub hint: Option<String>,
    /// Rendered sample of a result that failed verification.
    pub data_sample: Option<String>,
}

/// Immutable request handed to the generator client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub purpose: RequestPurpose,
    pub system: String,
    pub schema_context: String,
    pub question: String,
    pub prior: Option<PriorAttempt>,
    /// Extra user turns (SQL under review, result samples).
    pub attachments: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    /// Render as chat messages for an OpenAI-compatible endpoint.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(&self.system)];

        match self.purpose {
            RequestPurpose::Generate => {
                messages.push(ChatMessage::user(format!(
                    "Provided Table Schema Context:\n{}\n\nUser's Request: \"{}\"\n\nSQL Query:",
                    self.schema_context, self.question
                )));
            }
            RequestPurpose::Repair => {
                messages.push(ChatMessage::user(format!(
                    "Provided Table Schema Context:\n{}",
                    self.schema_context
                )));
                messages.push(ChatMessage::user(format!(
                    "Original user request to inform the correction: \"{}\"",
                    self.question
                )));
                if let Some(prior) = &self.prior {
                    messages.push(ChatMessage::user(format!(
                        "The following SQL query needs correction:\n```sql\n{}\n```",
                        prior.sql
                    )));
                    messages.push(ChatMessage::user(format!(
                        "The previous attempt failed with:\n{}",
                        prior.failure
                    )));
                    if let Some(sample) = &prior.data_sample {
                        messages.push(ChatMessage::user(format!(
                            "Here's a sample of the problematic data:\n{}",
                            sample
                        )));
                    }
                    if let Some(hint) = &prior.hint {
                        messages.push(ChatMessage::user(hint.clone()));
                    }
                }
                messages.push(ChatMessage::user(
                    "Please provide a corrected SQL query that addresses these issues.",
                ));
            }
            RequestPurpose::Judge | RequestPurpose::Explain => {
                messages.push(ChatMessage::user(format!("User's question: \"{}\"", self.question)));
                for attachment in &self.attachments {
                    messages.push(ChatMessage::user(attachment.clone()));
                }
            }
        }

        messages
    }
}

/// Builds every generator request of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBuilder {
    top_n_results: u32,
    max_fields_per_table: usize,
}

impl PromptBuilder {
    pub fn new(top_n_results: u32) -> Self {
        Self {
            top_n_results,
            max_fields_per_table: MAX_FIELDS_PER_TABLE_IN_PROMPT,
        }
    }

    pub fn top_n_results(&self) -> u32 {
        self.top_n_results
    }

    /// First attempt when `prior` is `None`, repair request otherwise.
    pub fn build(
        &self,
        question: &str,
        context: &RetrievedContext,
        prior: Option<&PriorAttempt>,
    ) -> GenerationRequest {
        let schema_context = self.render_context(context);
        let top_n = self.top_n_results.to_string();

        match prior {
            None => GenerationRequest {
                purpose: RequestPurpose::Generate,
                system: SQL_GENERATION_SYSTEM_PROMPT.replace("{top_n}", &top_n),
                schema_context,
                question: question.to_string(),
                prior: None,
                attachments: Vec::new(),
                temperature: 0.1,
                max_tokens: 400,
            },
            Some(prior) => GenerationRequest {
                purpose: RequestPurpose::Repair,
                system: SQL_REPAIR_SYSTEM_PROMPT.replace("{top_n}", &top_n),
                schema_context,
                question: question.to_string(),
                prior: Some(prior.clone()),
                attachments: Vec::new(),
                temperature: 0.1,
                max_tokens: 400,
            },
        }
    }

    pub fn judge(&self, question: &str, sql: &str, result: &QueryResult) -> GenerationRequest {
        let result_text = if result.is_empty() {
            format!(
                "The query executed successfully and returned 0 rows (columns: {}).",
                if result.columns.is_empty() {
                    "none reported".to_string()
                } else {
                    result.columns.join(", ")
                }
            )
        } else {
            format!(
                "The query returned {} row(s). First rows:\n{}",
                result.row_count(),
                result.preview(RESULT_SAMPLE_ROWS)
            )
        };

        GenerationRequest {
            purpose: RequestPurpose::Judge,
            system: VERIFICATION_SYSTEM_PROMPT.to_string(),
            schema_context: String::new(),
            question: question.to_string(),
            prior: None,
            attachments: vec![format!("SQL query:\n```sql\n{}\n```", sql), result_text],
            temperature: 0.0,
            max_tokens: 200,
        }
    }

    pub fn explain(&self, question: &str, sql: &str) -> GenerationRequest {
        GenerationRequest {
            purpose: RequestPurpose::Explain,
            system: EXPLANATION_SYSTEM_PROMPT.to_string(),
            schema_context: String::new(),
            question: question.to_string(),
            prior: None,
            attachments: vec![format!(
                "Please explain this SDSS SQL query in a way that's easy to understand:\n```sql\n{}\n```",
                sql
            )],
            temperature: 0.3,
            max_tokens: 300,
        }
    }

    /// Group retrieved elements by table, in rank order.
    pub fn render_context(&self, context: &RetrievedContext) -> String {
        if context.is_empty() {
            return NO_SCHEMA_CONTEXT.to_string();
        }

        let mut blocks = Vec::new();
        for table in context.tables() {
            let members: Vec<_> = context
                .entries()
                .iter()
                .filter(|e| e.element.table == table)
                .collect();
            let best_score = members.iter().map(|e| e.score).fold(f32::MIN, f32::max);

            let mut lines = vec![format!("Table Name: {}", table)];
            if let Some(table_entry) = members.iter().find(|e| e.element.is_table()) {
                lines.push(format!("Table Description: {}", table_entry.element.description));
            }

            let fields: Vec<_> = members.iter().filter(|e| !e.element.is_table()).collect();
            if fields.is_empty() {
                lines.push("Fields: (no field-level matches retrieved)".to_string());
            } else {
                lines.push("Fields:".to_string());
                for entry in fields.iter().take(self.max_fields_per_table) {
                    let element = &entry.element;
                    lines.push(format!(
                        "- {} (Type: {}, Unit: {}, Description: {})",
                        element.field.as_deref().unwrap_or_default(),
                        element.data_type.as_deref().unwrap_or("N/A"),
                        element.unit.as_deref().unwrap_or("-"),
                        element.description
                    ));
                }
                if fields.len() > self.max_fields_per_table {
                    lines.push(format!(
                        "- ... (and {} more fields)",
                        fields.len() - self.max_fields_per_table
                    ));
                }
            }
            lines.push(format!(
                "(Semantic Relevance Score to user query: {:.2})",
                best_score
            ));
            blocks.push(lines.join("\n"));
        }

        blocks.join("\n\n---\n\n")
    }
}
