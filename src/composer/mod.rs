//! Composes filter-scoped variants of fixed SQL templates.
//!
//! The template itself is never parsed into an AST. The composer lexes it,
//! classifies every mention of the base relation by the tokens around it,
//! and splices in a `filtered_<relation>` chaining member. Anything it
//! cannot classify with confidence is reported as ambiguous instead of
//! being rewritten.

mod guard;
pub mod lexer;

pub use guard::ensure_read_only;

use crate::predicate::{Bindings, PredicateFragment};
use lexer::{tokenize, Token, TokenKind};
use log::debug;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Composition ambiguous: {0}")]
    Ambiguous(String),

    #[error("Placeholder :{0} has no binding")]
    UnboundPlaceholder(String),

    #[error("Binding :{0} is not used by the query")]
    UnusedBinding(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// SQL plus the named parameter values it must be executed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedQuery {
    sql: String,
    bindings: Bindings,
    filtered: bool,
}

impl ComposedQuery {
    /// Checks that every placeholder in `sql` is bound and every binding is
    /// used.
    pub fn new(sql: impl Into<String>, bindings: Bindings) -> Result<Self, ComposeError> {
        let sql = sql.into();
        let tokens = tokenize(&sql).map_err(|e| ComposeError::Ambiguous(e.to_string()))?;
        let used: BTreeSet<&str> = tokens
            .iter()
            .filter_map(|t| t.placeholder_name(&sql))
            .collect();
        if let Some(name) = used.iter().find(|name| !bindings.contains_key(**name)) {
            return Err(ComposeError::UnboundPlaceholder(name.to_string()));
        }
        if let Some(name) = bindings.keys().find(|name| !used.contains(name.as_str())) {
            return Err(ComposeError::UnusedBinding(name.clone()));
        }
        Ok(Self {
            sql,
            bindings,
            filtered: false,
        })
    }

    /// The statement exactly as given, without bindings.
    pub fn passthrough(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: Bindings::new(),
            filtered: false,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Whether the statement reads the filtered alias instead of the base
    /// relation.
    pub fn is_filtered(&self) -> bool {
        self.filtered
    }
}

/// How a mention of the relation name is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mention {
    /// Queried source: `FROM sales`, `JOIN sales`, `FROM x, sales`.
    Source,
    /// Column qualifier: `sales.region`.
    Qualifier,
}

#[derive(Debug, Default)]
struct Analysis {
    /// Token spans to replace with the filtered alias.
    mentions: Vec<(usize, usize, Mention)>,
    /// Byte offset right after a leading `WITH` (or `WITH RECURSIVE`).
    chain_end: Option<usize>,
    /// Byte offset of the statement a chaining clause is attached to, after
    /// any leading `EXPLAIN [QUERY PLAN]`.
    body_start: usize,
    /// Whether that statement can take a leading chaining clause.
    chainable: bool,
}

impl Analysis {
    fn has_source(&self) -> bool {
        self.mentions.iter().any(|(_, _, m)| *m == Mention::Source)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Frame {
    in_from: bool,
}

/// Keywords that end a FROM clause at the current nesting level.
const FROM_TERMINATORS: &[&str] = &[
    "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "WINDOW", "UNION", "INTERSECT", "EXCEPT",
    "SELECT", "ON", "USING", "VALUES", "RETURNING",
];

#[derive(Debug, Clone)]
pub struct Composer {
    relation: String,
    alias: String,
}

impl Composer {
    /// `relation` must be a plain identifier; it is written into SQL as is.
    pub fn new(relation: impl Into<String>) -> Self {
        let relation = relation.into();
        let alias = format!("filtered_{}", relation);
        Self { relation, alias }
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn filtered_alias(&self) -> &str {
        &self.alias
    }

    /// Applies `predicate` to every read of the base relation in `template`.
    ///
    /// Templates that never read the relation come back unchanged and
    /// unbound, whatever the predicate.
    pub fn compose(
        &self,
        template: &str,
        predicate: &PredicateFragment,
    ) -> Result<ComposedQuery, ComposeError> {
        let analysis = self.analyze(template)?;
        if !analysis.has_source() {
            debug!("Template does not read {}, leaving it unchanged", self.relation);
            return Ok(ComposedQuery::passthrough(template));
        }
        if !analysis.chainable {
            return Err(ambiguous("statement cannot take a chaining clause"));
        }

        self.verify(template, &self.render(template, &analysis, ""))?;

        let sql = self.render(template, &analysis, &predicate.where_clause());
        let mut composed = ComposedQuery::new(sql, predicate.bindings.clone())?;
        composed.filtered = true;
        debug!(
            "Composed query: {} (bindings: {:?})",
            composed.sql,
            composed.bindings.keys().collect::<Vec<_>>()
        );
        Ok(composed)
    }

    /// Whether `template` reads the base relation as a source.
    pub fn references_relation(&self, template: &str) -> Result<bool, ComposeError> {
        Ok(self.analyze(template)?.has_source())
    }

    fn analyze(&self, sql: &str) -> Result<Analysis, ComposeError> {
        let tokens = tokenize(sql).map_err(|e| ComposeError::Ambiguous(e.to_string()))?;
        let sig: Vec<Token> = tokens.into_iter().filter(|t| !t.is_trivia()).collect();

        let mut lead = 0;
        if sig.first().is_some_and(|t| t.is_keyword(sql, "EXPLAIN")) {
            lead = 1;
            if sig.get(1).is_some_and(|t| t.is_keyword(sql, "QUERY"))
                && sig.get(2).is_some_and(|t| t.is_keyword(sql, "PLAN"))
            {
                lead = 3;
            }
        }
        let body = sig.get(lead);
        let mut analysis = Analysis {
            body_start: body.map_or(0, |t| t.start),
            chainable: body
                .is_some_and(|t| t.is_keyword(sql, "SELECT") || t.is_keyword(sql, "WITH")),
            ..Default::default()
        };
        if let Some(with) = body.filter(|t| t.is_keyword(sql, "WITH")) {
            analysis.chain_end = Some(match sig.get(lead + 1) {
                Some(next) if next.is_keyword(sql, "RECURSIVE") => next.end,
                _ => with.end,
            });
        }

        let mut frames = vec![Frame::default()];
        for (i, token) in sig.iter().enumerate() {
            let prev = i.checked_sub(1).map(|j| &sig[j]);
            match token.kind {
                TokenKind::LParen => {
                    // `FROM (sales)` and `JOIN ((sales))` keep source position.
                    let in_from = frames.last().is_some_and(|f| f.in_from)
                        && prev.is_some_and(|p| {
                            matches!(p.kind, TokenKind::Comma | TokenKind::LParen)
                                || p.is_keyword(sql, "FROM")
                                || p.is_keyword(sql, "JOIN")
                        });
                    frames.push(Frame { in_from });
                }
                TokenKind::RParen => {
                    frames.pop();
                    if frames.is_empty() {
                        return Err(ambiguous("unbalanced parentheses"));
                    }
                }
                TokenKind::Semicolon => {
                    if frames.len() > 1 {
                        return Err(ambiguous("statement terminator inside parentheses"));
                    }
                    if sig.len() > i + 1 {
                        return Err(ambiguous("multiple statements"));
                    }
                }
                TokenKind::Placeholder => {
                    return Err(ambiguous("template carries its own placeholders"));
                }
                TokenKind::Word | TokenKind::QuotedIdent => {
                    let in_from = frames.last().is_some_and(|f| f.in_from);
                    if let Some(mention) = self.classify(sql, &sig, i, in_from)? {
                        analysis.mentions.push((token.start, token.end, mention));
                    }
                    if token.kind == TokenKind::Word {
                        let frame = frames.last_mut().ok_or_else(|| ambiguous("unbalanced parentheses"))?;
                        if token.is_keyword(sql, "JOIN")
                            || (token.is_keyword(sql, "FROM")
                                && !prev.is_some_and(|p| p.is_keyword(sql, "DISTINCT")))
                        {
                            frame.in_from = true;
                        } else if FROM_TERMINATORS.iter().any(|kw| token.is_keyword(sql, kw)) {
                            frame.in_from = false;
                        }
                    }
                }
                _ => {}
            }
        }
        if frames.len() != 1 {
            return Err(ambiguous("unbalanced parentheses"));
        }

        Ok(analysis)
    }

    /// Classifies the identifier at `sig[i]`.
    ///
    /// Returns `Ok(None)` when the token is not the relation or is the
    /// relation name used as a column or column alias.
    fn classify(
        &self,
        sql: &str,
        sig: &[Token],
        i: usize,
        in_from: bool,
    ) -> Result<Option<Mention>, ComposeError> {
        let Some(name) = sig[i].identifier(sql) else {
            return Ok(None);
        };
        if name.eq_ignore_ascii_case(&self.alias) {
            return Err(ambiguous(&format!("template already mentions {}", self.alias)));
        }
        if !name.eq_ignore_ascii_case(&self.relation) {
            return Ok(None);
        }

        let at = |offset: isize| {
            let j = i as isize + offset;
            if j < 0 {
                None
            } else {
                sig.get(j as usize)
            }
        };
        let keyword = |t: Option<&Token>, kw: &str| t.is_some_and(|t| t.is_keyword(sql, kw));
        let kind = |t: Option<&Token>, k: TokenKind| t.is_some_and(|t| t.kind == k);
        let introduces_source = |offset: isize| {
            let t = at(offset);
            keyword(t, "JOIN")
                || (keyword(t, "FROM") && !keyword(at(offset - 1), "DISTINCT"))
                || ((kind(t, TokenKind::Comma) || kind(t, TokenKind::LParen)) && in_from)
        };

        if kind(at(-1), TokenKind::Dot) {
            // `x.sales` is a member of something else, unless `x` is itself
            // in source position, which makes this a schema-qualified table.
            if introduces_source(-3) && at(-2).is_some_and(|t| t.identifier(sql).is_some()) {
                return Err(ambiguous(&format!("schema-qualified source {}", self.relation)));
            }
            return Ok(None);
        }
        if keyword(at(1), "AS") && kind(at(2), TokenKind::LParen) {
            return Err(ambiguous(&format!(
                "chaining member shadows {}",
                self.relation
            )));
        }
        if keyword(at(-1), "AS") {
            return if in_from {
                Err(ambiguous(&format!("table alias shadows {}", self.relation)))
            } else {
                Ok(None)
            };
        }
        if introduces_source(-1) {
            if kind(at(1), TokenKind::Dot) {
                return Err(ambiguous(&format!("{} used as a schema name", self.relation)));
            }
            return Ok(Some(Mention::Source));
        }
        if kind(at(1), TokenKind::Dot) {
            return Ok(Some(Mention::Qualifier));
        }
        if in_from
            && at(-1).is_some_and(|t| {
                matches!(t.kind, TokenKind::QuotedIdent | TokenKind::RParen)
                    || (t.kind == TokenKind::Word
                        && !FROM_TERMINATORS.iter().any(|kw| t.is_keyword(sql, kw)))
            })
        {
            return Err(ambiguous(&format!("table alias shadows {}", self.relation)));
        }
        Ok(None)
    }

    fn render(&self, template: &str, analysis: &Analysis, where_clause: &str) -> String {
        let mut member = format!("{} AS (SELECT * FROM {}", self.alias, self.relation);
        if !where_clause.is_empty() {
            member.push(' ');
            member.push_str(where_clause);
        }
        member.push(')');

        let mut splices: Vec<(usize, usize, String)> = analysis
            .mentions
            .iter()
            .map(|(start, end, _)| (*start, *end, self.alias.clone()))
            .collect();
        match analysis.chain_end {
            Some(end) => splices.push((end, end, format!(" {},", member))),
            None => splices.push((
                analysis.body_start,
                analysis.body_start,
                format!("WITH {} ", member),
            )),
        }
        splices.sort_by_key(|(start, end, _)| (*start, *end));

        let mut out = String::with_capacity(template.len() + member.len() + 16);
        let mut cursor = 0;
        for (start, end, replacement) in splices {
            out.push_str(&template[cursor..start]);
            out.push_str(&replacement);
            cursor = end;
        }
        out.push_str(&template[cursor..]);
        out
    }

    /// If the template is valid SQLite as far as sqlparser can tell, the
    /// rewritten statement has to be as well.
    fn verify(&self, template: &str, rewritten: &str) -> Result<(), ComposeError> {
        let dialect = SQLiteDialect {};
        if Parser::parse_sql(&dialect, template).is_err() {
            return Ok(());
        }
        Parser::parse_sql(&dialect, rewritten).map(|_| ()).map_err(|e| {
            ComposeError::Ambiguous(format!("rewritten statement does not parse: {}", e))
        })
    }
}

fn ambiguous(reason: &str) -> ComposeError {
    ComposeError::Ambiguous(reason.to_string())
}
