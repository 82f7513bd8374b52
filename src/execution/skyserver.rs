//! SkyServer Executor - runs SQL against the SDSS SkyServer `x_sql` endpoint

use crate::error::{AstroError, Result};
use crate::execution::engine::QueryExecutor;
use crate::execution::result::QueryResult;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Characters of the server response kept in error messages.
const ERROR_PREVIEW_CHARS: usize = 500;

pub struct SkyServerExecutor {
    client: reqwest::Client,
    url: String,
}

impl SkyServerExecutor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AstroError::Config(format!("cannot build SkyServer HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl QueryExecutor for SkyServerExecutor {
    fn name(&self) -> &str {
        "skyserver"
    }

    async fn execute(&self, sql: &str, _row_limit: Option<u64>) -> Result<QueryResult> {
        info!(sql = %crate::sql_extract::truncate(sql, 250), "Executing SQL against SDSS SkyServer");
        let started = Instant::now();

        let response = self
            .client
            .get(&self.url)
            .query(&[("cmd", sql), ("format", "csv")])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AstroError::Execution(format!("SDSS query timed out: {}", e))
                } else {
                    AstroError::Execution(format!("SDSS request failed: {}", e))
                }
            })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| AstroError::Execution(format!("cannot read SDSS response: {}", e)))?;

        let result = parse_skyserver_response(status, content_type.as_deref(), &body)?
            .with_engine(self.name(), started.elapsed().as_millis() as u64);
        info!(rows = result.row_count(), "Successfully queried SDSS");
        Ok(result)
    }
}

/// Turn a raw SkyServer reply into a result or an `Execution` error.
pub fn parse_skyserver_response(
    status: u16,
    content_type: Option<&str>,
    body: &str,
) -> Result<QueryResult> {
    let lower = body.to_lowercase();
    let preview = error_preview(body);

    if !(200..300).contains(&status) {
        if lower.contains("error near") {
            return Err(AstroError::Execution(format!(
                "SDSS SQL Syntax Error (from HTTP response): {}",
                preview
            )));
        }
        return Err(AstroError::Execution(format!(
            "SDSS returned HTTP {}: {}",
            status, preview
        )));
    }

    let content_type = content_type.unwrap_or_default().to_lowercase();
    if content_type.contains("text/html") {
        if lower.contains("error near") {
            return Err(AstroError::Execution(format!(
                "SDSS SQL Error (detected in HTML response): {}",
                preview
            )));
        }
        return Err(AstroError::Execution(format!(
            "SDSS returned an HTML page (Content-Type: {}), not CSV. Preview: {}",
            content_type, preview
        )));
    }

    if body.contains("error report") || lower.contains("error near") {
        return Err(AstroError::Execution(format!(
            "SDSS Error (detected in non-HTML response text): {}",
            preview
        )));
    }

    if body.trim().is_empty() {
        warn!("SDSS returned an empty response");
        return Ok(QueryResult::empty());
    }

    parse_csv(body)
}

fn parse_csv(body: &str) -> Result<QueryResult> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if columns.iter().all(|c| c.is_empty()) {
        return Ok(QueryResult::empty());
    }
    let id_columns: Vec<bool> = columns.iter().map(|c| c.to_lowercase().contains("id")).collect();

    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != columns.len() {
            warn!(line = line + 2, fields = record.len(), expected = columns.len(), "Skipping malformed CSV row");
            warnings.push(format!(
                "skipped row {}: {} fields, expected {}",
                line + 2,
                record.len(),
                columns.len()
            ));
            continue;
        }
        let row = record
            .iter()
            .zip(&id_columns)
            .map(|(cell, is_id)| typed_cell(cell, *is_id))
            .collect();
        rows.push(row);
    }

    let mut result = QueryResult::new(columns, rows);
    result.warnings = warnings;
    Ok(result)
}

/// Empty → null; ids stay text so 64-bit object IDs keep full precision.
fn typed_cell(cell: &str, is_id: bool) -> serde_json::Value {
    if cell.is_empty() {
        return serde_json::Value::Null;
    }
    if is_id {
        return serde_json::Value::String(cell.to_string());
    }
    if let Ok(i) = cell.parse::<i64>() {
        return serde_json::Value::from(i);
    }
    if let Ok(f) = cell.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return serde_json::Value::Number(n);
        }
    }
    serde_json::Value::String(cell.to_string())
}

fn error_preview(body: &str) -> String {
    let flat: String = body
        .chars()
        .take(ERROR_PREVIEW_CHARS)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    flat.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csv_with_comments_and_ids() {
        let body = "#Table1\nobjID,ra,dec,type,r\n1237648720693755918,180.5,-0.25,STAR,14.2\n1237648720693755919,181.0,0.5,GALAXY,\n";
        let result = parse_skyserver_response(200, Some("text/plain"), body).unwrap();
        assert_eq!(result.columns, vec!["objID", "ra", "dec", "type", "r"]);
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.rows[0][0], json!("1237648720693755918"));
        assert_eq!(result.rows[0][1], json!(180.5));
        assert_eq!(result.rows[0][3], json!("STAR"));
        assert_eq!(result.rows[1][4], serde_json::Value::Null);
    }

    #[test]
    fn test_header_only_is_empty_success() {
        let result = parse_skyserver_response(200, Some("text/plain"), "#Table1\nobjID,ra\n").unwrap();
        assert!(result.is_empty());
        assert_eq!(result.columns, vec!["objID", "ra"]);
    }

    #[test]
    fn test_empty_body_is_empty_result() {
        assert!(parse_skyserver_response(200, None, "  \n").unwrap().is_empty());
    }

    #[test]
    fn test_html_error_page() {
        let body = "<!DOCTYPE html><html><body>Error report: error near 'SELECTX'</body></html>";
        let err = parse_skyserver_response(200, Some("text/html; charset=utf-8"), body).unwrap_err();
        match err {
            AstroError::Execution(msg) => {
                assert!(msg.contains("SDSS SQL Error (detected in HTML response)"));
                assert!(msg.contains("error near 'SELECTX'"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_plain_text_error() {
        let body = "Error: Query failed due to error near keyword BLAH.";
        let err = parse_skyserver_response(200, Some("text/plain"), body).unwrap_err();
        assert!(matches!(err, AstroError::Execution(ref m) if m.contains("non-HTML")));
    }

    #[test]
    fn test_http_error_preview_is_bounded() {
        let body = "x".repeat(2000);
        let err = parse_skyserver_response(500, None, &body).unwrap_err();
        let AstroError::Execution(msg) = err else {
            panic!("expected execution error");
        };
        assert!(msg.starts_with("SDSS returned HTTP 500"));
        assert!(msg.len() < 600);
    }

    #[test]
    fn test_ragged_rows_are_skipped() {
        let body = "ra,dec\n1.0,2.0\n3.0\n4.0,5.0\n";
        let result = parse_skyserver_response(200, None, body).unwrap();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.warnings.len(), 1);
    }
}
