//! Keyword query parser.
//!
//! Supports the following syntax:
//! ```text
//! graph neural network       → implicit AND of bare terms
//! "protein folding"          → phrase
//! title:transformer          → field-qualified term
//! author:"de la Cruz"        → field-qualified phrase
//! a AND b   a && b           → conjunction
//! a OR b    a || b           → disjunction
//! NOT a     !a               → negation
//! (a OR b) c                 → grouping
//! ```
//!
//! Precedence is NOT > AND > OR. Unbalanced parentheses and dangling
//! operators are dropped rather than rejected. Upstream APIs only take plain
//! keywords, so [`SearchQuery::to_source_query`] forwards the positive terms
//! and phrases and loses the boolean structure.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryExpr {
    Term(String),
    Phrase(String),
    Field {
        name: String,
        value: String,
        quoted: bool,
    },
    Not(Box<QueryExpr>),
    And(Vec<QueryExpr>),
    Or(Vec<QueryExpr>),
}

/// A positive keyword pulled out of the query tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    Word(String),
    Phrase(String),
}

impl SearchTerm {
    pub fn text(&self) -> &str {
        match self {
            Self::Word(s) | Self::Phrase(s) => s,
        }
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(word) => f.write_str(word),
            Self::Phrase(phrase) => write!(f, "\"{phrase}\""),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub expr: Option<QueryExpr>,
}

impl SearchQuery {
    pub fn parse(input: &str) -> Self {
        let tokens = tokenize(input);
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        Self {
            expr: parser.parse_query(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.expr.is_none()
    }

    /// Terms and phrases not under a NOT, in query order, without duplicates.
    pub fn terms(&self) -> Vec<SearchTerm> {
        let mut out = Vec::new();
        if let Some(expr) = &self.expr {
            collect_terms(expr, &mut out);
        }
        out
    }

    /// Keyword string for upstream search endpoints; phrases stay quoted.
    pub fn to_source_query(&self) -> String {
        self.terms()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Unquoted term bag for substring matching against the local store.
    pub fn plain_text(&self) -> String {
        self.terms()
            .iter()
            .map(SearchTerm::text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn collect_terms(expr: &QueryExpr, out: &mut Vec<SearchTerm>) {
    let term = match expr {
        QueryExpr::Term(word) => SearchTerm::Word(word.clone()),
        QueryExpr::Phrase(phrase) => SearchTerm::Phrase(phrase.clone()),
        QueryExpr::Field { value, quoted, .. } => {
            if *quoted {
                SearchTerm::Phrase(value.clone())
            } else {
                SearchTerm::Word(value.clone())
            }
        }
        QueryExpr::Not(_) => return,
        QueryExpr::And(items) | QueryExpr::Or(items) => {
            for item in items {
                collect_terms(item, out);
            }
            return;
        }
    };
    if !out.contains(&term) {
        out.push(term);
    }
}

// ─── Tokenizer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Phrase(String),
    Field { name: String, value: String, quoted: bool },
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let (phrase, next) = read_quoted(&chars, i + 1);
                if !phrase.is_empty() {
                    tokens.push(Token::Phrase(phrase));
                }
                i = next;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            _ => {
                let start = i;
                while i < chars.len() && !is_word_boundary(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();

                match word.as_str() {
                    "AND" => tokens.push(Token::And),
                    "OR" => tokens.push(Token::Or),
                    "NOT" => tokens.push(Token::Not),
                    _ => match word.split_once(':') {
                        Some((name, value)) if is_field_name(name) => {
                            if value.is_empty() && chars.get(i) == Some(&'"') {
                                let (phrase, next) = read_quoted(&chars, i + 1);
                                i = next;
                                if !phrase.is_empty() {
                                    tokens.push(Token::Field {
                                        name: name.to_lowercase(),
                                        value: phrase,
                                        quoted: true,
                                    });
                                }
                            } else if !value.is_empty() {
                                tokens.push(Token::Field {
                                    name: name.to_lowercase(),
                                    value: value.to_string(),
                                    quoted: false,
                                });
                            }
                        }
                        _ => tokens.push(Token::Word(word)),
                    },
                }
            }
        }
    }

    tokens
}

fn is_word_boundary(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '(' | ')' | '"')
}

fn is_field_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Read up to the closing quote (or end of input). Returns the trimmed text
/// and the index after the closing quote.
fn read_quoted(chars: &[char], start: usize) -> (String, usize) {
    let end = chars[start.min(chars.len())..]
        .iter()
        .position(|&c| c == '"')
        .map_or(chars.len(), |offset| start + offset);
    let text: String = chars[start.min(end)..end].iter().collect();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (text, (end + 1).min(chars.len()))
}

// ─── Parser ───────────────────────────────────────────────────────────────────

/// Groups nested deeper than this are flattened into their parent.
const MAX_GROUP_DEPTH: usize = 32;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    /// Top level: a stray `)` ends the current group but not the query.
    fn parse_query(&mut self) -> Option<QueryExpr> {
        let mut parts = Vec::new();
        while self.peek().is_some() {
            if let Some(expr) = self.parse_or() {
                parts.push(expr);
            }
            if self.peek() == Some(&Token::RParen) {
                self.bump();
            }
        }
        combine(parts, QueryExpr::And)
    }

    fn parse_or(&mut self) -> Option<QueryExpr> {
        let mut parts: Vec<QueryExpr> = self.parse_and().into_iter().collect();
        while self.peek() == Some(&Token::Or) {
            self.bump();
            if let Some(expr) = self.parse_and() {
                parts.push(expr);
            }
        }
        combine(parts, QueryExpr::Or)
    }

    fn parse_and(&mut self) -> Option<QueryExpr> {
        let mut parts = Vec::new();
        loop {
            match self.peek() {
                None | Some(Token::Or) | Some(Token::RParen) => break,
                Some(Token::And) => {
                    self.bump();
                }
                Some(_) => {
                    if let Some(expr) = self.parse_not() {
                        parts.push(expr);
                    }
                }
            }
        }
        combine(parts, QueryExpr::And)
    }

    /// Runs of NOT fold by parity: `!!a` is `a`.
    fn parse_not(&mut self) -> Option<QueryExpr> {
        let mut nots = 0usize;
        loop {
            match self.peek() {
                Some(Token::Not) => nots += 1,
                Some(Token::LParen) if self.depth >= MAX_GROUP_DEPTH => {}
                _ => break,
            }
            self.bump();
        }
        if nots > 0
            && matches!(
                self.peek(),
                None | Some(Token::Or) | Some(Token::And) | Some(Token::RParen)
            )
        {
            return None;
        }
        let inner = self.parse_primary()?;
        if nots % 2 == 1 {
            Some(QueryExpr::Not(Box::new(inner)))
        } else {
            Some(inner)
        }
    }

    fn parse_primary(&mut self) -> Option<QueryExpr> {
        match self.bump()? {
            Token::Word(word) => Some(QueryExpr::Term(word)),
            Token::Phrase(phrase) => Some(QueryExpr::Phrase(phrase)),
            Token::Field {
                name,
                value,
                quoted,
            } => Some(QueryExpr::Field {
                name,
                value,
                quoted,
            }),
            Token::LParen => {
                self.depth += 1;
                let inner = self.parse_or();
                self.depth -= 1;
                if self.peek() == Some(&Token::RParen) {
                    self.bump();
                }
                inner
            }
            Token::And | Token::Or | Token::Not | Token::RParen => None,
        }
    }
}

fn combine(mut parts: Vec<QueryExpr>, wrap: fn(Vec<QueryExpr>) -> QueryExpr) -> Option<QueryExpr> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(wrap(parts)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(s: &str) -> QueryExpr {
        QueryExpr::Term(s.to_string())
    }

    fn parse(s: &str) -> QueryExpr {
        SearchQuery::parse(s).expr.unwrap()
    }

    #[test]
    fn test_bare_terms_are_implicit_and() {
        assert_eq!(
            parse("graph neural network"),
            QueryExpr::And(vec![term("graph"), term("neural"), term("network")])
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(
            parse("a OR b c"),
            QueryExpr::Or(vec![term("a"), QueryExpr::And(vec![term("b"), term("c")])])
        );
        assert_eq!(
            parse("a && b || c"),
            QueryExpr::Or(vec![QueryExpr::And(vec![term("a"), term("b")]), term("c")])
        );
    }

    #[test]
    fn test_not_binds_tightest() {
        assert_eq!(
            parse("NOT a b"),
            QueryExpr::And(vec![QueryExpr::Not(Box::new(term("a"))), term("b")])
        );
        assert_eq!(parse("!a"), QueryExpr::Not(Box::new(term("a"))));
    }

    #[test]
    fn test_parentheses_group() {
        assert_eq!(
            parse("(a OR b) AND c"),
            QueryExpr::And(vec![QueryExpr::Or(vec![term("a"), term("b")]), term("c")])
        );
    }

    #[test]
    fn test_fields_and_phrases() {
        assert_eq!(
            parse(r#"title:transformer author:"de la  Cruz" "protein folding""#),
            QueryExpr::And(vec![
                QueryExpr::Field {
                    name: "title".to_string(),
                    value: "transformer".to_string(),
                    quoted: false,
                },
                QueryExpr::Field {
                    name: "author".to_string(),
                    value: "de la Cruz".to_string(),
                    quoted: true,
                },
                QueryExpr::Phrase("protein folding".to_string()),
            ])
        );
    }

    #[test]
    fn test_lowercase_operators_are_terms() {
        assert_eq!(
            parse("war and peace"),
            QueryExpr::And(vec![term("war"), term("and"), term("peace")])
        );
    }

    #[test]
    fn test_malformed_input_is_tolerated() {
        assert_eq!(parse("(a OR b"), QueryExpr::Or(vec![term("a"), term("b")]));
        assert_eq!(parse("a OR"), term("a"));
        assert_eq!(parse("a ) b"), QueryExpr::And(vec![term("a"), term("b")]));
        assert_eq!(parse("AND a NOT"), term("a"));
        assert_eq!(parse(r#""unterminated phrase"#), QueryExpr::Phrase("unterminated phrase".to_string()));
        assert!(SearchQuery::parse("  ( ) && || ").is_empty());
    }

    #[test]
    fn test_double_negation_cancels() {
        assert_eq!(parse("NOT !a"), term("a"));
        assert_eq!(parse("!!!a b"), QueryExpr::And(vec![QueryExpr::Not(Box::new(term("a"))), term("b")]));
    }

    #[test]
    fn test_pathological_nesting_does_not_overflow() {
        let q = SearchQuery::parse(&("(".repeat(100_000) + "a"));
        assert_eq!(q.terms(), vec![SearchTerm::Word("a".to_string())]);

        assert_eq!(parse(&("!".repeat(100_000) + "a")), term("a"));
        assert_eq!(parse(&("NOT ".repeat(50_001) + "a")), QueryExpr::Not(Box::new(term("a"))));

        let q = SearchQuery::parse(&("(!".repeat(100_000) + "a" + &")".repeat(100_000)));
        assert!(q.expr.is_some());
    }

    #[test]
    fn test_source_query_drops_boolean_structure() {
        let q = SearchQuery::parse(r#"("neural nets" OR deep) AND NOT survey title:vision deep"#);
        assert_eq!(q.to_source_query(), r#""neural nets" deep vision"#);
        assert_eq!(q.plain_text(), "neural nets deep vision");
    }
}
