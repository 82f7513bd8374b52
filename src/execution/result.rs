//! Query Result - ordered columns and rows returned by an executor

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names, in result order
    pub columns: Vec<String>,

    /// Row cells; `null` for empty cells
    pub rows: Vec<Vec<serde_json::Value>>,

    /// Execution time in milliseconds
    #[serde(default)]
    pub execution_time_ms: u64,

    /// Engine that executed the query
    #[serde(default)]
    pub engine_name: String,

    /// Non-fatal issues noticed while reading the result
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self {
            columns,
            rows,
            ..Default::default()
        }
    }

    /// Zero rows, no columns.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, engine_name: impl Into<String>, execution_time_ms: u64) -> Self {
        self.engine_name = engine_name.into();
        self.execution_time_ms = execution_time_ms;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Markdown table of the first `n` rows.
    pub fn preview(&self, n: usize) -> String {
        if self.columns.is_empty() {
            return "(no columns)".to_string();
        }

        let mut lines = Vec::with_capacity(n.min(self.rows.len()) + 3);
        lines.push(format!("| {} |", self.columns.join(" | ")));
        lines.push(format!(
            "|{}|",
            self.columns.iter().map(|_| "---").collect::<Vec<_>>().join("|")
        ));
        for row in self.rows.iter().take(n) {
            let cells: Vec<String> = row.iter().map(render_cell).collect();
            lines.push(format!("| {} |", cells.join(" | ")));
        }
        if self.rows.len() > n {
            lines.push(format!("... ({} more rows)", self.rows.len() - n));
        }
        lines.join("\n")
    }
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.replace('|', "\\|"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preview_markdown() {
        let result = QueryResult::new(
            vec!["objID".to_string(), "r".to_string()],
            vec![
                vec![json!("1237648720693755918"), json!(14.2)],
                vec![json!("1237648720693755919"), serde_json::Value::Null],
                vec![json!("1237648720693755920"), json!(13.9)],
            ],
        );
        let preview = result.preview(2);
        let lines: Vec<&str> = preview.lines().collect();
        assert_eq!(lines[0], "| objID | r |");
        assert_eq!(lines[1], "|---|---|");
        assert_eq!(lines[2], "| 1237648720693755918 | 14.2 |");
        assert_eq!(lines[3], "| 1237648720693755919 |  |");
        assert_eq!(lines[4], "... (1 more rows)");
    }

    #[test]
    fn test_empty_result() {
        let result = QueryResult::empty();
        assert!(result.is_empty());
        assert_eq!(result.column_count(), 0);
        assert_eq!(result.preview(5), "(no columns)");
    }
}
