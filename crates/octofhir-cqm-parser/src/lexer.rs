//! Tokenizer using Winnow
//!
//! Produces spanned tokens and skips whitespace, `//` line comments and
//! `/* */` block comments. Keywords are ordinary identifiers; the parser
//! decides what is reserved where.

use octofhir_cqm_diagnostics::Span;
use winnow::ascii::{digit1, multispace1, till_line_ending};
use winnow::combinator::{alt, opt, preceded, repeat};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_till, take_until, take_while};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Plain identifier or keyword
    Ident(String),
    /// `"Quoted Identifier"`
    QuotedIdent(String),
    /// `'string'`
    Str(String),
    /// Integer or decimal digits, unsigned
    Number(String),
    /// `@2024-01-01T00:00:00`, without the `@`
    DateTime(String),
    Symbol(Symbol),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Tilde,
    Pipe,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Ampersand,
}

impl Symbol {
    pub const fn text(&self) -> &'static str {
        match self {
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Colon => ":",
            Self::Dot => ".",
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Tilde => "~",
            Self::Pipe => "|",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Caret => "^",
            Self::Ampersand => "&",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// Source-like rendering for error messages
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Ident(name) => format!("'{name}'"),
            TokenKind::QuotedIdent(name) => format!("\"{name}\""),
            TokenKind::Str(text) => format!("string '{text}'"),
            TokenKind::Number(digits) => format!("number {digits}"),
            TokenKind::DateTime(text) => format!("@{text}"),
            TokenKind::Symbol(symbol) => format!("'{}'", symbol.text()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedString,
    UnterminatedIdentifier,
    UnterminatedComment,
    UnexpectedCharacter(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub offset: usize,
}

/// Split library text into tokens
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut input = source;
    let mut tokens = Vec::new();

    loop {
        // Trivia cannot fail: an unmatched `/*` is left in place
        let _ = trivia(&mut input);
        let offset = source.len() - input.len();
        if input.is_empty() {
            break;
        }
        if input.starts_with("/*") {
            return Err(LexError {
                kind: LexErrorKind::UnterminatedComment,
                offset,
            });
        }

        let rest = input;
        let kind = token(&mut input).map_err(|_| LexError {
            kind: classify_failure(rest),
            offset,
        })?;
        let end = source.len() - input.len();
        tokens.push(Token {
            kind,
            span: Span::new(offset, end),
        });
    }

    Ok(tokens)
}

fn classify_failure(rest: &str) -> LexErrorKind {
    match rest.chars().next() {
        Some('\'') => LexErrorKind::UnterminatedString,
        Some('"') => LexErrorKind::UnterminatedIdentifier,
        Some(other) => LexErrorKind::UnexpectedCharacter(other),
        None => LexErrorKind::UnexpectedCharacter('\0'),
    }
}

fn trivia(input: &mut &str) -> ModalResult<()> {
    repeat(0.., alt((multispace1.void(), line_comment, block_comment))).parse_next(input)
}

fn line_comment(input: &mut &str) -> ModalResult<()> {
    ("//", till_line_ending).void().parse_next(input)
}

fn block_comment(input: &mut &str) -> ModalResult<()> {
    ("/*", take_until(0.., "*/"), "*/").void().parse_next(input)
}

fn token(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        quoted_identifier,
        string_literal,
        datetime,
        number,
        identifier,
        symbol,
    ))
    .parse_next(input)
}

fn quoted_identifier(input: &mut &str) -> ModalResult<TokenKind> {
    delimited_text(input, '"').map(TokenKind::QuotedIdent)
}

fn string_literal(input: &mut &str) -> ModalResult<TokenKind> {
    delimited_text(input, '\'').map(TokenKind::Str)
}

/// Text between `quote` characters, with backslash escapes resolved
fn delimited_text(input: &mut &str, quote: char) -> ModalResult<String> {
    opening(input, quote)?;
    let mut text = String::new();
    loop {
        text.push_str(text_until(input, quote)?);
        if next_char(input)? == '\\' {
            text.push(unescape(next_char(input)?));
        } else {
            return Ok(text);
        }
    }
}

fn opening(input: &mut &str, quote: char) -> ModalResult<char> {
    one_of(quote).parse_next(input)
}

fn text_until<'s>(input: &mut &'s str, quote: char) -> ModalResult<&'s str> {
    take_till(0.., [quote, '\\']).parse_next(input)
}

fn next_char(input: &mut &str) -> ModalResult<char> {
    any.parse_next(input)
}

fn unescape(escaped: char) -> char {
    match escaped {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'f' => '\u{c}',
        other => other,
    }
}

fn datetime(input: &mut &str) -> ModalResult<TokenKind> {
    preceded(
        '@',
        take_while(1.., |c: char| {
            c.is_ascii_digit() || matches!(c, '-' | ':' | '.' | 'T' | 'Z' | '+')
        }),
    )
    .map(|text: &str| TokenKind::DateTime(text.to_string()))
    .parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<TokenKind> {
    (digit1, opt(('.', digit1)))
        .take()
        .map(|digits: &str| TokenKind::Number(digits.to_string()))
        .parse_next(input)
}

fn identifier(input: &mut &str) -> ModalResult<TokenKind> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .map(|name: &str| TokenKind::Ident(name.to_string()))
        .parse_next(input)
}

fn symbol(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        "<=".value(Symbol::LessOrEqual),
        ">=".value(Symbol::GreaterOrEqual),
        "!=".value(Symbol::NotEqual),
        one_of([
            '[', ']', '(', ')', '{', '}', ',', ':', '.', '=', '<', '>', '~', '|', '+', '-', '*', '/',
            '^', '&',
        ])
        .map(single_symbol),
    ))
    .map(TokenKind::Symbol)
    .parse_next(input)
}

fn single_symbol(c: char) -> Symbol {
    match c {
        '[' => Symbol::LBracket,
        ']' => Symbol::RBracket,
        '(' => Symbol::LParen,
        ')' => Symbol::RParen,
        '{' => Symbol::LBrace,
        '}' => Symbol::RBrace,
        ',' => Symbol::Comma,
        ':' => Symbol::Colon,
        '.' => Symbol::Dot,
        '=' => Symbol::Equal,
        '<' => Symbol::Less,
        '>' => Symbol::Greater,
        '~' => Symbol::Tilde,
        '|' => Symbol::Pipe,
        '+' => Symbol::Plus,
        '-' => Symbol::Minus,
        '*' => Symbol::Star,
        '/' => Symbol::Slash,
        '^' => Symbol::Caret,
        _ => Symbol::Ampersand,
    }
}
