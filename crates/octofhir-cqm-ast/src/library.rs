//! Library structure

use crate::{DefineKind, Expression, Literal, ValueSetRef};
use octofhir_cqm_diagnostics::{Diagnostic, Span};
use octofhir_cqm_model::MEASUREMENT_PERIOD;
use smallvec::SmallVec;

/// A parsed measure library. Immutable once the parser returns it.
#[derive(Debug, Clone, Default)]
pub struct Library {
    /// `library <Name> version '<v>'`
    pub identifier: Option<LibraryIdentifier>,
    /// `using` declarations (data models)
    pub usings: Vec<UsingDefinition>,
    pub codesystems: Vec<CodesystemDefinition>,
    pub valuesets: Vec<ValuesetDefinition>,
    pub codes: Vec<CodeDefinition>,
    pub parameters: Vec<ParameterDefinition>,
    /// `context Patient`
    pub context: Option<String>,
    /// Defines in declaration order, names unique
    pub defines: Vec<Define>,
    /// Parse-time warnings
    pub diagnostics: Vec<Diagnostic>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> Option<&str> {
        self.identifier.as_ref().map(|id| id.name.as_str())
    }

    pub fn version(&self) -> Option<&str> {
        self.identifier.as_ref().and_then(|id| id.version.as_deref())
    }

    /// `Name|version`, `Name`, or `Unnamed` for libraries without a declaration
    pub fn measure_identifier(&self) -> String {
        match (self.name(), self.version()) {
            (Some(name), Some(version)) => format!("{name}|{version}"),
            (Some(name), None) => name.to_string(),
            _ => "Unnamed".to_string(),
        }
    }

    pub fn define(&self, name: &str) -> Option<&Define> {
        self.defines.iter().find(|d| d.name == name)
    }

    pub fn define_names(&self) -> impl Iterator<Item = &str> {
        self.defines.iter().map(|d| d.name.as_str())
    }

    pub fn valueset(&self, name: &str) -> Option<&ValuesetDefinition> {
        self.valuesets.iter().find(|vs| vs.name == name)
    }

    pub fn code(&self, name: &str) -> Option<&CodeDefinition> {
        self.codes.iter().find(|c| c.name == name)
    }

    pub fn codesystem(&self, name: &str) -> Option<&CodesystemDefinition> {
        self.codesystems.iter().find(|cs| cs.name == name)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Declared parameter, or the implicit `"Measurement Period"`
    pub fn is_parameter(&self, name: &str) -> bool {
        name == MEASUREMENT_PERIOD || self.parameter(name).is_some()
    }

    /// Every declared value set; these are resolved before a run
    pub fn required_valuesets(&self) -> Vec<ValueSetRef> {
        self.valuesets
            .iter()
            .map(|vs| ValueSetRef {
                name: vs.name.clone(),
                url: vs.url.clone(),
                version: vs.version.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryIdentifier {
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsingDefinition {
    pub model: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodesystemDefinition {
    pub name: String,
    pub uri: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesetDefinition {
    pub name: String,
    /// Canonical URL
    pub url: String,
    pub version: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeDefinition {
    pub name: String,
    pub code: String,
    /// Declared code system name (`from "LOINC"`)
    pub codesystem: String,
    /// Code system URI the name resolved to
    pub system: String,
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDefinition {
    pub name: String,
    /// Declared type as written, e.g. `Interval<DateTime>`
    pub type_name: Option<String>,
    pub default: Option<Literal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessModifier {
    #[default]
    Public,
    Private,
}

/// A named expression
#[derive(Debug, Clone, PartialEq)]
pub struct Define {
    pub name: String,
    pub access: AccessModifier,
    pub expression: Expression,
    /// Define names the body references, in order of first occurrence.
    /// May include names that are not declared.
    pub references: SmallVec<[String; 4]>,
    pub kind: Option<DefineKind>,
    /// Span of the whole `define` statement
    pub span: Span,
}

impl Define {
    pub fn new(name: impl Into<String>, expression: Expression, span: Span) -> Self {
        let references = expression.references().into_iter().collect();
        let kind = expression.kind();
        Self {
            name: name.into(),
            access: AccessModifier::Public,
            expression,
            references,
            kind,
            span,
        }
    }

    pub fn with_access(mut self, access: AccessModifier) -> Self {
        self.access = access;
        self
    }
}
