//! Library statements: declarations and defines

use crate::lexer::{Symbol, TokenKind};
use crate::parser::Parser;
use crate::{ParseError, ParseResult};
use octofhir_cqm_ast::{
    AccessModifier, CodeDefinition, CodesystemDefinition, Define, Library, LibraryIdentifier,
    ParameterDefinition, UsingDefinition, ValuesetDefinition,
};
use octofhir_cqm_diagnostics::{CQM0012, Diagnostic, Span};

/// Parse library text into a [`Library`]
///
/// Declarations (code systems, value sets, codes, parameters) must precede
/// the defines that use them. A later define with an already used name
/// replaces the earlier one in place and leaves a warning diagnostic.
pub fn parse(source: &str) -> ParseResult<Library> {
    let mut parser = Parser::new(source)?;
    while !parser.is_eof() {
        parser.statement()?;
    }
    let library = parser.into_library();
    log::debug!(
        "Parsed library {} with {} defines and {} value sets",
        library.measure_identifier(),
        library.defines.len(),
        library.valuesets.len()
    );
    Ok(library)
}

impl Parser<'_> {
    fn statement(&mut self) -> ParseResult<()> {
        let keyword = match self.peek_kind() {
            Some(TokenKind::Ident(word)) => word.clone(),
            _ => return Err(self.unexpected("a declaration")),
        };
        match keyword.as_str() {
            "library" => self.library_declaration(),
            "using" => self.using_declaration(),
            "codesystem" => self.codesystem_declaration(),
            "valueset" => self.valueset_declaration(),
            "code" => self.code_declaration(),
            "parameter" => self.parameter_declaration(),
            "context" => self.context_declaration(),
            "define" => self.define_statement(AccessModifier::Public),
            "public" | "private" => {
                self.advance();
                if self.at_keyword("define") {
                    let access = if keyword == "private" {
                        AccessModifier::Private
                    } else {
                        AccessModifier::Public
                    };
                    self.define_statement(access)
                } else {
                    // Access modifiers on other declarations carry no meaning here
                    Ok(())
                }
            }
            "include" | "concept" => Err(ParseError::unexpected_token(
                format!("'{keyword}' declarations are not supported"),
                self.location(self.current_span()),
            )),
            _ => Err(self.unexpected("a declaration")),
        }
    }

    fn library_declaration(&mut self) -> ParseResult<()> {
        self.expect_keyword("library")?;
        let (name, _) = self.expect_name("a library name")?;
        let version = self.optional_version()?;
        self.library.identifier = Some(LibraryIdentifier { name, version });
        Ok(())
    }

    fn using_declaration(&mut self) -> ParseResult<()> {
        self.expect_keyword("using")?;
        let (model, _) = self.expect_name("a model name")?;
        let version = self.optional_version()?;
        self.library.usings.push(UsingDefinition { model, version });
        Ok(())
    }

    fn codesystem_declaration(&mut self) -> ParseResult<()> {
        self.expect_keyword("codesystem")?;
        let (name, _) = self.expect_name("a code system name")?;
        self.expect_symbol(Symbol::Colon)?;
        let uri = self.expect_string("a code system URI")?;
        let version = self.optional_version()?;
        self.library
            .codesystems
            .push(CodesystemDefinition { name, uri, version });
        Ok(())
    }

    fn valueset_declaration(&mut self) -> ParseResult<()> {
        let start = self.expect_keyword("valueset")?;
        let (name, _) = self.expect_name("a value set name")?;
        self.expect_symbol(Symbol::Colon)?;
        let url = self.expect_string("a value set URL")?;
        let version = self.optional_version()?;
        if self.eat_keyword("codesystems") {
            self.skip_balanced()?;
        }
        let span = Span::new(start.start, self.previous_end());
        self.library.valuesets.push(ValuesetDefinition {
            name,
            url,
            version,
            span,
        });
        Ok(())
    }

    fn code_declaration(&mut self) -> ParseResult<()> {
        self.expect_keyword("code")?;
        let (name, _) = self.expect_name("a code name")?;
        self.expect_symbol(Symbol::Colon)?;
        let code = self.expect_string("a code")?;
        self.expect_keyword("from")?;
        let (codesystem, codesystem_span) = self.expect_name("a code system name")?;
        let system = match self.library.codesystem(&codesystem) {
            Some(declared) => declared.uri.clone(),
            None => {
                return Err(ParseError::UndefinedTerminology {
                    name: codesystem,
                    location: self.location(codesystem_span),
                });
            }
        };
        let display = if self.eat_keyword("display") {
            Some(self.expect_string("a display string")?)
        } else {
            None
        };
        self.library.codes.push(CodeDefinition {
            name,
            code,
            codesystem,
            system,
            display,
        });
        Ok(())
    }

    fn parameter_declaration(&mut self) -> ParseResult<()> {
        self.expect_keyword("parameter")?;
        let (name, _) = self.expect_name("a parameter name")?;
        let type_name = self.type_specifier();
        let default = if self.eat_keyword("default") {
            Some(self.scalar_literal()?)
        } else {
            None
        };
        self.library.parameters.push(ParameterDefinition {
            name,
            type_name,
            default,
        });
        Ok(())
    }

    /// `Interval<DateTime>`, `Quantity`, ... kept as written
    fn type_specifier(&mut self) -> Option<String> {
        match self.peek_kind() {
            Some(TokenKind::Ident(word)) if word != "default" && !self.at_statement_start() => {}
            _ => return None,
        }
        let mut text = String::new();
        let mut depth = 0usize;
        while let Some(kind) = self.peek_kind() {
            let piece = match kind {
                TokenKind::Ident(word) if depth > 0 || text.is_empty() => word.clone(),
                TokenKind::Symbol(Symbol::Less) => {
                    depth += 1;
                    "<".to_string()
                }
                TokenKind::Symbol(Symbol::Greater) if depth > 0 => {
                    depth -= 1;
                    ">".to_string()
                }
                TokenKind::Symbol(Symbol::Comma) if depth > 0 => ", ".to_string(),
                _ => break,
            };
            text.push_str(&piece);
            self.advance();
        }
        Some(text)
    }

    fn context_declaration(&mut self) -> ParseResult<()> {
        self.expect_keyword("context")?;
        let (context, _) = self.expect_name("a context name")?;
        self.library.context = Some(context);
        Ok(())
    }

    fn define_statement(&mut self, access: AccessModifier) -> ParseResult<()> {
        let start = self.expect_keyword("define")?;
        if self.at_keyword("function") || self.at_keyword("fluent") {
            return Err(ParseError::unexpected_token(
                "Function definitions are not supported",
                self.location(self.current_span()),
            ));
        }
        let (name, name_span) = self.expect_name("a define name")?;

        let has_colon = self.eat_symbol(Symbol::Colon);
        if self.is_eof() || self.at_statement_start() {
            return Err(ParseError::MalformedDefine {
                name,
                location: self.location(name_span),
            });
        }
        if !has_colon {
            return Err(self.unexpected("':'"));
        }

        let expression = self.expression()?;
        if !(self.is_eof() || self.at_statement_start()) {
            return Err(self.unexpected("the end of the define"));
        }

        let span = Span::new(start.start, self.previous_end());
        self.add_define(Define::new(name, expression, span).with_access(access));
        Ok(())
    }

    fn add_define(&mut self, define: Define) {
        let source = self.source();
        let library = &mut self.library;
        match library.defines.iter_mut().find(|d| d.name == define.name) {
            Some(existing) => {
                log::warn!(
                    "Define \"{}\" is declared more than once; the later declaration replaces the earlier one",
                    define.name
                );
                library.diagnostics.push(
                    Diagnostic::warning(
                        CQM0012,
                        format!("Duplicate definition of \"{}\" replaces the earlier one", define.name),
                    )
                    .with_span(define.span, source),
                );
                *existing = define;
            }
            None => library.defines.push(define),
        }
    }
}
