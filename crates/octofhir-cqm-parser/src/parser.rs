//! Token cursor shared by the statement and expression parsers

use crate::lexer::{LexError, LexErrorKind, Symbol, Token, TokenKind, tokenize};
use crate::{ParseError, ParseResult};
use octofhir_cqm_ast::{Comparison, Library};
use octofhir_cqm_diagnostics::{SourceLocation, Span};

/// Words that start a top-level declaration
pub(crate) const STATEMENT_KEYWORDS: &[&str] = &[
    "library",
    "using",
    "include",
    "codesystem",
    "valueset",
    "code",
    "concept",
    "parameter",
    "context",
    "define",
    "public",
    "private",
];

/// Words that can never be an alias or a bare define reference
const EXPRESSION_KEYWORDS: &[&str] = &[
    "and",
    "or",
    "xor",
    "implies",
    "union",
    "intersect",
    "except",
    "not",
    "exists",
    "with",
    "without",
    "where",
    "such",
    "that",
    "return",
    "sort",
    "aggregate",
    "let",
    "from",
    "during",
    "in",
    "included",
    "includes",
    "is",
    "as",
    "div",
    "mod",
    "of",
    "then",
    "else",
    "end",
    "when",
];

pub(crate) fn is_reserved(word: &str) -> bool {
    EXPRESSION_KEYWORDS.contains(&word) || STATEMENT_KEYWORDS.contains(&word)
}

pub(crate) struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    /// Declarations seen so far; names are resolved against them
    pub(crate) library: Library,
}

impl<'s> Parser<'s> {
    pub(crate) fn new(source: &'s str) -> ParseResult<Self> {
        let tokens = tokenize(source).map_err(|err| lex_error(source, err))?;
        Ok(Self {
            source,
            tokens,
            pos: 0,
            library: Library::new(),
        })
    }

    pub(crate) fn source(&self) -> &'s str {
        self.source
    }

    pub(crate) fn into_library(self) -> Library {
        self.library
    }

    // === Lookahead ===

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub(crate) fn at_keyword(&self, keyword: &str) -> bool {
        self.nth_is_keyword(0, keyword)
    }

    pub(crate) fn nth_is_keyword(&self, n: usize, keyword: &str) -> bool {
        matches!(
            self.tokens.get(self.pos + n).map(|t| &t.kind),
            Some(TokenKind::Ident(word)) if word == keyword
        )
    }

    pub(crate) fn at_symbol(&self, symbol: Symbol) -> bool {
        self.nth_is_symbol(0, symbol)
    }

    pub(crate) fn nth_is_symbol(&self, n: usize, symbol: Symbol) -> bool {
        matches!(
            self.tokens.get(self.pos + n).map(|t| &t.kind),
            Some(TokenKind::Symbol(s)) if *s == symbol
        )
    }

    /// Plain or quoted identifier with exactly this text
    pub(crate) fn at_name(&self, name: &str) -> bool {
        matches!(
            self.peek_kind(),
            Some(TokenKind::Ident(word) | TokenKind::QuotedIdent(word)) if word == name
        )
    }

    pub(crate) fn at_statement_start(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Ident(word)) if STATEMENT_KEYWORDS.contains(&word.as_str()))
    }

    pub(crate) fn at_comparison(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Symbol(symbol)) if comparison(*symbol).is_some())
    }

    /// Span of the next token, or an empty span at the end of the source
    pub(crate) fn current_span(&self) -> Span {
        self.peek()
            .map(|t| t.span)
            .unwrap_or_else(|| Span::new(self.source.len(), self.source.len()))
    }

    /// End offset of the last consumed token
    pub(crate) fn previous_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end)
    }

    // === Consumption ===

    pub(crate) fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume the first of `keywords` that is next, returning it
    pub(crate) fn eat_any_keyword(&mut self, keywords: &[&'static str]) -> Option<&'static str> {
        let found = keywords.iter().copied().find(|kw| self.at_keyword(kw))?;
        self.pos += 1;
        Some(found)
    }

    pub(crate) fn expect_keyword(&mut self, keyword: &str) -> ParseResult<Span> {
        let span = self.current_span();
        if self.eat_keyword(keyword) {
            Ok(span)
        } else {
            Err(self.unexpected(&format!("'{keyword}'")))
        }
    }

    pub(crate) fn eat_symbol(&mut self, symbol: Symbol) -> bool {
        if self.at_symbol(symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_symbol(&mut self, symbol: Symbol) -> ParseResult<Span> {
        let span = self.current_span();
        if self.eat_symbol(symbol) {
            Ok(span)
        } else {
            Err(self.unexpected(&format!("'{}'", symbol.text())))
        }
    }

    pub(crate) fn eat_comparison(&mut self) -> Option<Comparison> {
        let op = match self.peek_kind() {
            Some(TokenKind::Symbol(symbol)) => comparison(*symbol)?,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    /// Plain or quoted identifier
    pub(crate) fn expect_name(&mut self, expected: &str) -> ParseResult<(String, Span)> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Ident(name) | TokenKind::QuotedIdent(name),
                span,
            }) => {
                let found = (name.clone(), *span);
                self.pos += 1;
                Ok(found)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    pub(crate) fn expect_string(&mut self, expected: &str) -> ParseResult<String> {
        match self.peek_kind() {
            Some(TokenKind::Str(text)) => {
                let text = text.clone();
                self.pos += 1;
                Ok(text)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    /// `version '<v>'` if present
    pub(crate) fn optional_version(&mut self) -> ParseResult<Option<String>> {
        if self.eat_keyword("version") {
            self.expect_string("a version string").map(Some)
        } else {
            Ok(None)
        }
    }

    // === Skipping unsupported input ===

    /// Skip tokens until `stop` matches at bracket depth zero, an unmatched
    /// closing bracket, a declaration keyword, or the end of input.
    ///
    /// Returns the quoted names in the skipped input that can only be define
    /// references.
    pub(crate) fn skip_until(&mut self, stop: impl Fn(&TokenKind) -> bool) -> Vec<String> {
        let mut names = Vec::new();
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::Ident(word) if STATEMENT_KEYWORDS.contains(&word.as_str()) => break,
                TokenKind::Symbol(Symbol::LParen | Symbol::LBracket | Symbol::LBrace) => depth += 1,
                TokenKind::Symbol(Symbol::RParen | Symbol::RBracket | Symbol::RBrace) => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                kind if depth == 0 && stop(kind) => break,
                TokenKind::QuotedIdent(name) => self.note_skipped_name(name, &mut names),
                _ => {}
            }
            self.pos += 1;
        }
        names
    }

    /// Skip one bracketed group starting at the next token, returning the
    /// define names inside it
    pub(crate) fn skip_balanced(&mut self) -> ParseResult<Vec<String>> {
        let open = self.current_span();
        let mut names = Vec::new();
        let mut depth = 0usize;
        while let Some(token) = self.advance() {
            match token.kind {
                TokenKind::Symbol(Symbol::LParen | Symbol::LBracket | Symbol::LBrace) => depth += 1,
                TokenKind::Symbol(Symbol::RParen | Symbol::RBracket | Symbol::RBrace) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(names);
                    }
                }
                TokenKind::QuotedIdent(name) => self.note_skipped_name(&name, &mut names),
                _ => {}
            }
        }
        Err(ParseError::unexpected_end(
            "a closing bracket",
            self.location(open),
        ))
    }

    fn note_skipped_name(&self, name: &str, names: &mut Vec<String>) {
        let declared = self.library.is_parameter(name)
            || self.library.valueset(name).is_some()
            || self.library.code(name).is_some()
            || self.library.codesystem(name).is_some();
        if !declared && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    // === Errors ===

    pub(crate) fn location(&self, span: Span) -> SourceLocation {
        SourceLocation::from_span(span, self.source)
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::unexpected_token(
                format!("Unexpected {}, expected {expected}", token.describe()),
                self.location(token.span),
            ),
            None => ParseError::unexpected_end(expected, self.location(self.current_span())),
        }
    }
}

fn comparison(symbol: Symbol) -> Option<Comparison> {
    match symbol {
        Symbol::Equal => Some(Comparison::Equal),
        Symbol::NotEqual => Some(Comparison::NotEqual),
        Symbol::Less => Some(Comparison::Less),
        Symbol::LessOrEqual => Some(Comparison::LessOrEqual),
        Symbol::Greater => Some(Comparison::Greater),
        Symbol::GreaterOrEqual => Some(Comparison::GreaterOrEqual),
        _ => None,
    }
}

fn lex_error(source: &str, err: LexError) -> ParseError {
    let location = SourceLocation::from_span(Span::new(err.offset, err.offset + 1), source);
    match err.kind {
        LexErrorKind::UnterminatedString => ParseError::unterminated("string literal", location),
        LexErrorKind::UnterminatedIdentifier => {
            ParseError::unterminated("quoted identifier", location)
        }
        LexErrorKind::UnterminatedComment => ParseError::unterminated("block comment", location),
        LexErrorKind::UnexpectedCharacter(c) => {
            ParseError::unexpected_token(format!("Unexpected character '{c}'"), location)
        }
    }
}
