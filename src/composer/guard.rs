use super::lexer::{tokenize, Token, TokenKind};
use super::ComposeError;

const READ_STATEMENTS: &[&str] = &["SELECT", "WITH", "VALUES", "PRAGMA", "EXPLAIN"];

const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "REPLACE", "DROP", "CREATE", "ALTER", "ATTACH", "DETACH",
    "VACUUM", "REINDEX",
];

/// Rejects anything other than a single read-only statement.
///
/// Keywords inside literals, quoted identifiers and comments are ignored.
/// `REPLACE` followed by `(` is the string function and is allowed.
pub fn ensure_read_only(sql: &str) -> Result<(), ComposeError> {
    let tokens = tokenize(sql).map_err(|e| denied(&e.to_string()))?;
    let sig: Vec<Token> = tokens.into_iter().filter(|t| !t.is_trivia()).collect();

    let Some(first) = sig.first() else {
        return Err(denied("empty statement"));
    };
    if !READ_STATEMENTS.iter().any(|kw| first.is_keyword(sql, kw)) {
        return Err(denied(&format!(
            "{} statements are not allowed",
            first.text(sql).to_uppercase()
        )));
    }

    for (i, token) in sig.iter().enumerate() {
        match token.kind {
            TokenKind::Semicolon if i + 1 < sig.len() => {
                return Err(denied("multiple statements"));
            }
            TokenKind::Word => {
                let Some(keyword) = WRITE_KEYWORDS.iter().find(|kw| token.is_keyword(sql, kw))
                else {
                    continue;
                };
                let is_function = sig.get(i + 1).is_some_and(|t| t.kind == TokenKind::LParen);
                if *keyword == "REPLACE" && is_function {
                    continue;
                }
                return Err(denied(&format!("{} is not allowed", keyword)));
            }
            _ => {}
        }
    }

    if first.is_keyword(sql, "PRAGMA")
        && sig
            .iter()
            .any(|t| t.kind == TokenKind::Operator && t.text(sql) == "=")
    {
        return Err(denied("PRAGMA assignments are not allowed"));
    }

    Ok(())
}

fn denied(reason: &str) -> ComposeError {
    ComposeError::PermissionDenied(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::select("SELECT COUNT(*) FROM sales;")]
    #[case::lowercase("select * from sales limit 5")]
    #[case::with("WITH m AS (SELECT 1) SELECT * FROM m")]
    #[case::pragma_read("PRAGMA table_info(sales);")]
    #[case::explain("EXPLAIN QUERY PLAN SELECT * FROM sales")]
    #[case::values("VALUES (1), (2)")]
    #[case::keyword_in_literal("SELECT * FROM sales WHERE product_name = 'DELETE me'")]
    #[case::keyword_in_comment("-- drop table sales\nSELECT 1")]
    #[case::keyword_as_quoted_column("SELECT \"update\" FROM t")]
    #[case::replace_function("SELECT replace(product_name, 'a', 'b') FROM sales")]
    #[case::column_named_like_keyword("SELECT updated_at FROM t")]
    fn test_read_only_statements_pass(#[case] sql: &str) {
        assert!(ensure_read_only(sql).is_ok(), "{sql}");
    }

    #[rstest]
    #[case::delete("DELETE FROM sales")]
    #[case::insert("INSERT INTO sales VALUES (1)")]
    #[case::update("UPDATE sales SET profit = 0")]
    #[case::drop("DROP TABLE sales")]
    #[case::attach("ATTACH DATABASE 'x.db' AS x")]
    #[case::vacuum("VACUUM")]
    #[case::replace_statement("REPLACE INTO sales VALUES (1)")]
    #[case::cte_with_delete("WITH x AS (SELECT 1) DELETE FROM sales")]
    #[case::stacked("SELECT 1; DROP TABLE sales")]
    #[case::pragma_write("PRAGMA journal_mode = WAL")]
    #[case::empty("   ")]
    #[case::only_comment("-- nothing")]
    #[case::unterminated("SELECT 'abc")]
    fn test_writes_are_denied(#[case] sql: &str) {
        assert!(
            matches!(ensure_read_only(sql), Err(ComposeError::PermissionDenied(_))),
            "{sql}"
        );
    }

    #[test]
    fn test_trailing_semicolon_is_one_statement() {
        assert!(ensure_read_only("SELECT 1;  -- done\n").is_ok());
    }
}
