//! Isolates the executable statement in a generator response and pins its row limit.

use crate::error::{AstroError, Result};
use regex::Regex;

pub struct SqlExtractor {
    fenced_sql: Regex,
    fenced_any: Regex,
    select_line: Regex,
    select_keyword: Regex,
    cte: Regex,
    prose_end: Regex,
    prose_opener: Regex,
    sentence: Regex,
    select_clause: Regex,
}

/// Words that may begin a continuation line of a statement.
const SQL_LINE_STARTERS: &[&str] = &[
    "select", "from", "where", "and", "or", "not", "join", "inner", "left", "right", "outer",
    "full", "cross", "on", "group", "order", "by", "having", "union", "all", "except",
    "intersect", "as", "with", "case", "when", "then", "else", "end", "in", "between", "like",
    "is", "null", "top", "distinct", "asc", "desc", "exists", "into",
];

impl SqlExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            fenced_sql: Regex::new(r"(?is)```[ \t]*sql[ \t]*\r?\n?(.*?)```")?,
            fenced_any: Regex::new(r"(?s)```[ \t]*\w*[ \t]*\r?\n?(.*?)```")?,
            select_line: Regex::new(r"(?im)^[ \t]*select\b")?,
            select_keyword: Regex::new(r"(?i)\bselect\b")?,
            cte: Regex::new(r"(?i)\bwith\s+\w+(?:\s*\([^)]*\))?\s+as\s*\(")?,
            prose_end: Regex::new(r";|\n[ \t]*\r?\n|```")?,
            prose_opener: Regex::new(
                r"^[ \t]*(?:This|The|It|Note|These|That|Here|Explanation)(?:\b|:)",
            )?,
            sentence: Regex::new(r"^[ \t]*[A-Z][a-z']*[,:]?(?:[ \t]+[a-z][a-z']*[,.]?){3,}")?,
            select_clause: Regex::new(
                r"(?i)\b(select)\b(\s+distinct\b)?(?:\s+top\s*(?:\(\s*\d+\s*\)|\d+))?",
            )?,
        })
    }

    /// Fenced ```sql block first, then any fenced block, then the first
    /// SELECT/WITH statement in the prose. A prose statement ends at `;`, a
    /// blank line, a fence, or the first line that reads as a sentence.
    pub fn extract(&self, text: &str) -> Result<String> {
        if let Some(block) = self.fenced_sql.captures(text).and_then(|c| c.get(1)) {
            if let Some(statement) = self.statement_in(block.as_str(), false) {
                return Ok(statement);
            }
        }
        for caps in self.fenced_any.captures_iter(text) {
            if let Some(statement) = caps.get(1).and_then(|b| self.statement_in(b.as_str(), false)) {
                return Ok(statement);
            }
        }
        self.statement_in(text, true).ok_or_else(|| {
            AstroError::SqlExtraction(format!(
                "no SELECT or WITH statement found in generator response: {}",
                truncate(text.trim(), 200)
            ))
        })
    }

    /// Rewrite the outer SELECT (the final one of a WITH query) to carry
    /// exactly `TOP n`.
    pub fn enforce_top_n(&self, sql: &str, n: u32) -> String {
        let top_level: Vec<_> = self
            .select_clause
            .captures_iter(sql)
            .filter(|c| c.get(0).map_or(false, |m| paren_depth(&sql[..m.start()]) == 0))
            .collect();

        let is_cte = self
            .cte
            .find(sql)
            .map_or(false, |m| sql[..m.start()].trim().is_empty());
        let target = if is_cte { top_level.last() } else { top_level.first() };

        let Some(caps) = target else {
            return sql.to_string();
        };
        let Some(whole) = caps.get(0) else {
            return sql.to_string();
        };
        let distinct = caps.get(2).map_or("", |m| m.as_str());
        format!(
            "{}{}{} TOP {}{}",
            &sql[..whole.start()],
            &caps[1],
            distinct,
            n,
            &sql[whole.end()..]
        )
    }

    fn statement_in(&self, text: &str, prose: bool) -> Option<String> {
        let anchored = [self.cte.find(text), self.select_line.find(text)]
            .into_iter()
            .flatten()
            .map(|m| m.start())
            .min();
        let start = anchored.or_else(|| self.select_keyword.find(text).map(|m| m.start()))?;

        let rest = &text[start..];
        let end = if prose {
            let end = self.prose_end.find(rest).map_or(rest.len(), |m| m.start());
            self.first_prose_line(&rest[..end]).unwrap_or(end)
        } else {
            rest.find(';').unwrap_or(rest.len())
        };

        let statement = rest[..end].trim();
        if statement.split_whitespace().count() < 2 {
            return None;
        }
        Some(statement.to_string())
    }

    /// Byte offset of the first line after the opening one that reads as
    /// sentence text rather than a statement continuation.
    fn first_prose_line(&self, statement: &str) -> Option<usize> {
        let first_break = statement.find('\n')?;
        let mut offset = first_break + 1;
        for line in statement[offset..].split_inclusive('\n') {
            if self.is_prose_line(line) {
                return Some(offset);
            }
            offset += line.len();
        }
        None
    }

    fn is_prose_line(&self, line: &str) -> bool {
        let first_word = line
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .find(|w| !w.is_empty())
            .unwrap_or("");
        if SQL_LINE_STARTERS.contains(&first_word.to_ascii_lowercase().as_str()) {
            return false;
        }
        self.prose_opener.is_match(line) || self.sentence.is_match(line)
    }
}

pub fn extract_sql(text: &str) -> Result<String> {
    SqlExtractor::new()?.extract(text)
}

pub fn enforce_top_n(sql: &str, n: u32) -> Result<String> {
    Ok(SqlExtractor::new()?.enforce_top_n(sql, n))
}

/// Parenthesis depth at the end of `prefix`, ignoring quoted text.
fn paren_depth(prefix: &str) -> i32 {
    let mut depth = 0;
    let mut in_quote = false;
    for c in prefix.chars() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth -= 1,
            _ => {}
        }
    }
    depth
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_block_with_prose() {
        let text = "Sure! Here is the query:\n```sql\nSELECT TOP 10 objID, psfMag_r\nFROM Star\nWHERE psfMag_r < 15;\n```\nThis selects bright stars.";
        assert_eq!(
            extract_sql(text).unwrap(),
            "SELECT TOP 10 objID, psfMag_r\nFROM Star\nWHERE psfMag_r < 15"
        );
    }

    #[test]
    fn test_unfenced_statement_in_prose() {
        let text = "The query you need is\nSELECT ra, dec FROM PhotoObjAll WHERE r < 15\n\nIt returns coordinates.";
        assert_eq!(
            extract_sql(text).unwrap(),
            "SELECT ra, dec FROM PhotoObjAll WHERE r < 15"
        );
    }

    #[test]
    fn test_bare_lowercase_statement() {
        assert_eq!(
            extract_sql("select top 5 z from SpecObj;").unwrap(),
            "select top 5 z from SpecObj"
        );
    }

    #[test]
    fn test_no_statement_is_extraction_error() {
        let err = extract_sql("I'm sorry, I can't help with that.").unwrap_err();
        assert!(matches!(err, AstroError::SqlExtraction(_)));
    }

    #[test]
    fn test_cte_statement() {
        let text = "```sql\nWITH bright AS (SELECT objID FROM Star WHERE r < 15) SELECT * FROM bright\n```";
        let sql = extract_sql(text).unwrap();
        assert!(sql.starts_with("WITH bright AS"));
        assert_eq!(
            enforce_top_n(&sql, 10).unwrap(),
            "WITH bright AS (SELECT objID FROM Star WHERE r < 15) SELECT TOP 10 * FROM bright"
        );
    }

    #[test]
    fn test_top_n_added_or_replaced() {
        assert_eq!(
            enforce_top_n("SELECT ra FROM Star", 10).unwrap(),
            "SELECT TOP 10 ra FROM Star"
        );
        assert_eq!(
            enforce_top_n("SELECT TOP 500 ra FROM Star", 10).unwrap(),
            "SELECT TOP 10 ra FROM Star"
        );
        assert_eq!(
            enforce_top_n("SELECT DISTINCT class FROM SpecObj", 3).unwrap(),
            "SELECT DISTINCT TOP 3 class FROM SpecObj"
        );
    }

    #[test]
    fn test_subquery_select_untouched() {
        assert_eq!(
            enforce_top_n("SELECT ra FROM Star WHERE objID IN (SELECT bestObjID FROM SpecObj)", 10).unwrap(),
            "SELECT TOP 10 ra FROM Star WHERE objID IN (SELECT bestObjID FROM SpecObj)"
        );
    }

    #[test]
    fn test_inline_lowercase_statement_in_prose() {
        assert_eq!(
            extract_sql("Here is the query: select top 10 ra from Star where r < 15").unwrap(),
            "select top 10 ra from Star where r < 15"
        );
    }

    #[test]
    fn test_trailing_explanation_line_is_dropped() {
        assert_eq!(
            extract_sql("SELECT TOP 10 ra FROM Star WHERE r < 15\nThis query returns bright stars.")
                .unwrap(),
            "SELECT TOP 10 ra FROM Star WHERE r < 15"
        );
        assert_eq!(
            extract_sql("SELECT ra FROM Star\nReturns coordinates of bright stars.").unwrap(),
            "SELECT ra FROM Star"
        );
    }

    #[test]
    fn test_multiline_statement_keeps_continuation_lines() {
        let text = "Here you go:\nSELECT ra, dec\nFROM Star\nWHERE r < 15\n  AND g < 16\nThe results are limited to bright stars.";
        assert_eq!(
            extract_sql(text).unwrap(),
            "SELECT ra, dec\nFROM Star\nWHERE r < 15\n  AND g < 16"
        );
    }

    #[test]
    fn test_cte_named_like_select_keeps_outer_top() {
        assert_eq!(
            enforce_top_n(
                "WITH selected AS (SELECT objID FROM Star WHERE psfMag_r < 15) SELECT * FROM selected",
                10
            )
            .unwrap(),
            "WITH selected AS (SELECT objID FROM Star WHERE psfMag_r < 15) SELECT TOP 10 * FROM selected"
        );
    }

    #[test]
    fn test_select_prefixed_column_is_not_a_keyword() {
        assert_eq!(
            enforce_top_n("WITH b AS (SELECT objID, r FROM Star) SELECT objID, selectionFlag FROM b", 10)
                .unwrap(),
            "WITH b AS (SELECT objID, r FROM Star) SELECT TOP 10 objID, selectionFlag FROM b"
        );
        assert_eq!(
            enforce_top_n("SELECT selectionFlag FROM Star", 5).unwrap(),
            "SELECT TOP 5 selectionFlag FROM Star"
        );
    }
}
