//! SQL statement helpers.
//!
//! Lightweight lexical checks used when isolating a statement from model output.
//! This is not a parser: it only understands quotes and comments well enough to
//! find statement boundaries and leading keywords.

/// Keywords that can open a SQL statement.
const STATEMENT_KEYWORDS: [&str; 15] = [
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "MERGE", "CREATE", "ALTER", "DROP",
    "TRUNCATE", "EXPLAIN", "SHOW", "VALUES", "TABLE", "DESCRIBE",
];

/// Keywords that open a read-only statement.
const READ_ONLY_KEYWORDS: [&str; 7] = ["SELECT", "WITH", "EXPLAIN", "SHOW", "VALUES", "TABLE", "DESCRIBE"];

/// Keywords that make a statement modify data or structure.
const FORBIDDEN_KEYWORDS: [&str; 10] = [
    "DROP", "TRUNCATE", "DELETE", "ALTER", "INSERT", "UPDATE", "MERGE", "CREATE", "GRANT", "REVOKE",
];

/// Lexical SQL checks.
pub struct SqlValidator;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lex {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

impl SqlValidator {
    /// Returns the first statement of `sql`, including its `;` terminator when present.
    ///
    /// Semicolons inside quotes or comments do not end a statement. Returns `None`
    /// when nothing but whitespace, comments or terminators is found.
    pub fn first_statement(sql: &str) -> Option<&str> {
        let bytes = sql.as_bytes();
        let mut state = Lex::Normal;
        let mut end = sql.len();
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            let next = bytes.get(i + 1).copied();
            match state {
                Lex::Normal => match b {
                    b'\'' => state = Lex::SingleQuoted,
                    b'"' => state = Lex::DoubleQuoted,
                    b'-' if next == Some(b'-') => {
                        state = Lex::LineComment;
                        i += 1;
                    }
                    b'/' if next == Some(b'*') => {
                        state = Lex::BlockComment;
                        i += 1;
                    }
                    b';' => {
                        end = i + 1;
                        break;
                    }
                    _ => {}
                },
                Lex::SingleQuoted if b == b'\'' => state = Lex::Normal,
                Lex::DoubleQuoted if b == b'"' => state = Lex::Normal,
                Lex::LineComment if b == b'\n' => state = Lex::Normal,
                Lex::BlockComment if b == b'*' && next == Some(b'/') => {
                    state = Lex::Normal;
                    i += 1;
                }
                _ => {}
            }
            i += 1;
        }

        let statement = sql[..end].trim();
        let body = Self::strip_leading_comments(statement).trim_end_matches(';').trim();
        if body.is_empty() {
            None
        } else {
            Some(statement)
        }
    }

    /// Checks whether the text opens with a SQL statement keyword (after comments).
    pub fn starts_with_statement(sql: &str) -> bool {
        Self::leading_keyword(sql)
            .map(|kw| STATEMENT_KEYWORDS.contains(&kw.as_str()))
            .unwrap_or(false)
    }

    /// Checks whether the statement reads data only.
    pub fn is_read_only(sql: &str) -> bool {
        let opens_read_only = Self::leading_keyword(sql)
            .map(|kw| READ_ONLY_KEYWORDS.contains(&kw.as_str()))
            .unwrap_or(false);
        opens_read_only && !Self::contains_forbidden_keyword(sql)
    }

    fn contains_forbidden_keyword(sql: &str) -> bool {
        sql.to_uppercase()
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .any(|token| FORBIDDEN_KEYWORDS.contains(&token))
    }

    fn leading_keyword(sql: &str) -> Option<String> {
        let rest = Self::strip_leading_comments(sql)
            .trim_start_matches(|c: char| c == '(' || c.is_whitespace());
        let word: String = rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        if word.is_empty() {
            None
        } else {
            Some(word.to_uppercase())
        }
    }

    fn strip_leading_comments(sql: &str) -> &str {
        let mut rest = sql.trim_start();
        loop {
            if let Some(after) = rest.strip_prefix("--") {
                rest = after.split_once('\n').map(|(_, tail)| tail).unwrap_or("").trim_start();
            } else if let Some(after) = rest.strip_prefix("/*") {
                rest = after.split_once("*/").map(|(_, tail)| tail).unwrap_or("").trim_start();
            } else {
                return rest;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_statement_keeps_terminator() {
        assert_eq!(
            SqlValidator::first_statement("SELECT COUNT(*) FROM users;"),
            Some("SELECT COUNT(*) FROM users;")
        );
        assert_eq!(
            SqlValidator::first_statement("SELECT 1; DROP TABLE users;"),
            Some("SELECT 1;")
        );
        assert_eq!(SqlValidator::first_statement("  SELECT 1  "), Some("SELECT 1"));
    }

    #[test]
    fn test_first_statement_ignores_quoted_semicolons() {
        let sql = "SELECT ';' AS sep, \"a;b\" FROM t -- trailing; comment\nWHERE x = 1; SELECT 2";
        assert_eq!(
            SqlValidator::first_statement(sql),
            Some("SELECT ';' AS sep, \"a;b\" FROM t -- trailing; comment\nWHERE x = 1;")
        );
        assert_eq!(
            SqlValidator::first_statement("/* a; b */ SELECT 1;"),
            Some("/* a; b */ SELECT 1;")
        );
    }

    #[test]
    fn test_first_statement_rejects_empty() {
        assert_eq!(SqlValidator::first_statement(""), None);
        assert_eq!(SqlValidator::first_statement(" ; "), None);
        assert_eq!(SqlValidator::first_statement("-- only a comment"), None);
    }

    #[test]
    fn test_starts_with_statement() {
        assert!(SqlValidator::starts_with_statement("select * from t"));
        assert!(SqlValidator::starts_with_statement("-- NOTE: guess\nWITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(SqlValidator::starts_with_statement("(SELECT 1) UNION (SELECT 2)"));
        assert!(!SqlValidator::starts_with_statement("Here is your query"));
        assert!(!SqlValidator::starts_with_statement(""));
    }

    #[test]
    fn test_is_read_only() {
        assert!(SqlValidator::is_read_only("SELECT created_at FROM users"));
        assert!(SqlValidator::is_read_only("WITH a AS (SELECT 1) SELECT * FROM a"));
        assert!(!SqlValidator::is_read_only("DELETE FROM users"));
        assert!(!SqlValidator::is_read_only(
            "WITH gone AS (DELETE FROM users RETURNING id) SELECT * FROM gone"
        ));
        assert!(!SqlValidator::is_read_only("INSERT INTO users VALUES (1)"));
    }
}
