//! Configuration types for database tools

use sqlagent_core::AgentConfig;
use std::collections::HashSet;

/// SQL operations a statement can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlOperation {
    Select,
    Insert,
    Update,
    Delete,
    CreateTable,
    DropTable,
    AlterTable,
    CreateIndex,
    DropIndex,
    Other,
}

impl SqlOperation {
    /// Classify a statement by its leading keyword(s)
    ///
    /// Reads are `SELECT`, `WITH`, `VALUES`, `EXPLAIN` and `PRAGMA` without an
    /// assignment.
    pub fn classify(sql: &str) -> Self {
        let words = leading_words(sql, 2);
        let first = words.first().map(String::as_str).unwrap_or("");
        let second = words.get(1).map(String::as_str).unwrap_or("");

        match first {
            "SELECT" | "WITH" | "VALUES" | "EXPLAIN" => SqlOperation::Select,
            "PRAGMA" if !sql.contains('=') => SqlOperation::Select,
            "INSERT" | "REPLACE" => SqlOperation::Insert,
            "UPDATE" => SqlOperation::Update,
            "DELETE" => SqlOperation::Delete,
            "CREATE" if second == "INDEX" || second == "UNIQUE" => SqlOperation::CreateIndex,
            "CREATE" => SqlOperation::CreateTable,
            "DROP" if second == "INDEX" => SqlOperation::DropIndex,
            "DROP" => SqlOperation::DropTable,
            "ALTER" => SqlOperation::AlterTable,
            _ => SqlOperation::Other,
        }
    }
}

/// Upper-cased leading keywords, skipping comments and opening parentheses
fn leading_words(sql: &str, count: usize) -> Vec<String> {
    let mut words = Vec::new();
    let mut rest = sql;

    while words.len() < count {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.find('\n').map(|i| &after[i + 1..]).unwrap_or("");
            continue;
        }
        if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map(|i| &after[i + 2..]).unwrap_or("");
            continue;
        }

        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if end == 0 {
            break;
        }
        words.push(rest[..end].to_uppercase());
        rest = &rest[end..];
    }

    words
}

/// Number of non-empty statements in `sql`
///
/// Semicolons inside string literals, quoted identifiers and comments do not
/// separate statements.
pub fn statement_count(sql: &str) -> usize {
    let mut count = 0;
    let mut has_content = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                has_content = true;
                for next in chars.by_ref() {
                    if next == c {
                        break;
                    }
                }
            }
            '[' => {
                has_content = true;
                for next in chars.by_ref() {
                    if next == ']' {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            ';' => {
                if has_content {
                    count += 1;
                }
                has_content = false;
            }
            c if c.is_whitespace() => {}
            _ => has_content = true,
        }
    }

    if has_content {
        count += 1;
    }
    count
}

/// Configuration for database tools
#[derive(Debug, Clone)]
pub struct DatabaseToolConfig {
    /// Whether the tools are read-only (default: true)
    pub read_only: bool,
    /// Maximum number of rows to return (default: 1000)
    pub max_rows: usize,
    /// Query timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Allowed SQL operations
    pub allowed_operations: HashSet<SqlOperation>,
}

impl Default for DatabaseToolConfig {
    fn default() -> Self {
        let mut allowed_operations = HashSet::new();
        allowed_operations.insert(SqlOperation::Select);

        Self {
            read_only: true,
            max_rows: 1000,
            timeout_secs: 30,
            allowed_operations,
        }
    }
}

impl From<&AgentConfig> for DatabaseToolConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_rows: config.max_rows,
            timeout_secs: config.query_timeout_secs,
            ..Default::default()
        }
    }
}

impl DatabaseToolConfig {
    pub fn is_allowed(&self, operation: SqlOperation) -> bool {
        if self.read_only && operation != SqlOperation::Select {
            return false;
        }
        self.allowed_operations.contains(&operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_reads() {
        assert_eq!(SqlOperation::classify("select * from albums"), SqlOperation::Select);
        assert_eq!(
            SqlOperation::classify("  -- top artists\nWITH t AS (SELECT 1) SELECT * FROM t"),
            SqlOperation::Select
        );
        assert_eq!(SqlOperation::classify("(SELECT 1)"), SqlOperation::Select);
        assert_eq!(SqlOperation::classify("PRAGMA table_info(albums)"), SqlOperation::Select);
        assert_eq!(SqlOperation::classify("EXPLAIN QUERY PLAN SELECT 1"), SqlOperation::Select);
    }

    #[test]
    fn test_classify_writes() {
        assert_eq!(SqlOperation::classify("INSERT INTO t VALUES (1)"), SqlOperation::Insert);
        assert_eq!(SqlOperation::classify("/* x */ delete from t"), SqlOperation::Delete);
        assert_eq!(SqlOperation::classify("DROP TABLE albums"), SqlOperation::DropTable);
        assert_eq!(SqlOperation::classify("CREATE UNIQUE INDEX i ON t(a)"), SqlOperation::CreateIndex);
        assert_eq!(SqlOperation::classify("PRAGMA journal_mode = WAL"), SqlOperation::Other);
        assert_eq!(SqlOperation::classify("ATTACH 'x.db' AS x"), SqlOperation::Other);
        assert_eq!(SqlOperation::classify(""), SqlOperation::Other);
    }

    #[test]
    fn test_statement_count() {
        assert_eq!(statement_count("SELECT 1"), 1);
        assert_eq!(statement_count("SELECT 1;"), 1);
        assert_eq!(statement_count("SELECT 1; -- trailing"), 1);
        assert_eq!(statement_count("SELECT ';' AS semi"), 1);
        assert_eq!(statement_count("SELECT 1; DROP TABLE albums"), 2);
        assert_eq!(statement_count("  ;; "), 0);
    }

    #[test]
    fn test_default_config_is_read_only() {
        let config = DatabaseToolConfig::default();
        assert!(config.is_allowed(SqlOperation::Select));
        assert!(!config.is_allowed(SqlOperation::Delete));
    }

    #[test]
    fn test_from_agent_config() {
        let agent = AgentConfig {
            max_rows: 50,
            query_timeout_secs: 5,
            ..AgentConfig::default()
        };
        let config = DatabaseToolConfig::from(&agent);
        assert_eq!(config.max_rows, 50);
        assert_eq!(config.timeout_secs, 5);
        assert!(config.read_only);
    }
}
