//! Lowering of a library to a single SQL statement
//!
//! Every population define becomes a CTE named after the define whose rows
//! are the `subject_id`s it selects; scalar defines are folded into the
//! literals of the predicates that read them. The final select counts the
//! distinct subjects of every population CTE.
//!
//! Resource tables hold one row per resource coding, so coded filters are
//! checked with an `EXISTS` over the rows sharing the resource id.

use crate::{CompileError, CompileResult, SqlDialect, SqlStatement};
use chrono::{Datelike, NaiveDateTime};
use octofhir_cqm_ast::{
    CodeFilter, Comparison, Edge, Expression, InstantSource, IntervalSource, Library, Predicate,
    QuantitySource, RelationshipKind, ResourceQuery, SetOperation,
};
use octofhir_cqm_graph::EvaluationOrder;
use octofhir_cqm_model::{
    INSTANT_FORMAT, Interval, Parameters, PatientTable, Quantity, ResourceTable, ScalarValue,
    SchemaDescriptor,
};
use octofhir_cqm_terminology::{ResolvedTerminology, TerminologyResolver, ValueSetKey};
use std::collections::{HashMap, HashSet};

/// Compiles libraries against one schema in one dialect
#[derive(Debug, Clone)]
pub struct SqlCompiler<'s> {
    schema: &'s SchemaDescriptor,
    dialect: SqlDialect,
}

impl<'s> SqlCompiler<'s> {
    pub fn new(schema: &'s SchemaDescriptor) -> Self {
        Self {
            schema,
            dialect: SqlDialect::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Resolve the library's value sets, then compile
    pub async fn compile(
        &self,
        library: &Library,
        order: &EvaluationOrder,
        resolver: &TerminologyResolver,
        parameters: &Parameters,
    ) -> CompileResult<SqlStatement> {
        self.schema.validate()?;
        let terminology = resolver.resolve_library(library).await?;
        self.compile_resolved(library, order, &terminology, parameters)
    }

    /// Compile with value sets already resolved
    pub fn compile_resolved(
        &self,
        library: &Library,
        order: &EvaluationOrder,
        terminology: &ResolvedTerminology,
        parameters: &Parameters,
    ) -> CompileResult<SqlStatement> {
        self.schema.validate()?;
        let mut lowering = Lowering {
            schema: self.schema,
            dialect: self.dialect,
            library,
            terminology,
            parameters,
            define: String::new(),
            scalars: HashMap::new(),
            populations: HashSet::new(),
            aliases: 0,
        };

        let mut ctes = Vec::new();
        let mut populations = Vec::new();
        for name in order.iter() {
            let define = library
                .define(name)
                .ok_or_else(|| CompileError::unsupported(name, "define is not part of the library"))?;
            lowering.define = define.name.clone();

            match lowering.expression(&define.expression)? {
                Lowered::Population(sql) => {
                    log::debug!("Compiled define \"{name}\" to a CTE");
                    ctes.push(format!("{} AS (\n  {sql}\n)", self.dialect.quote_identifier(name)));
                    lowering.populations.insert(define.name.clone());
                    populations.push(define.name.clone());
                }
                Lowered::Scalar(value) => {
                    log::debug!("Folded scalar define \"{name}\" = {value}");
                    lowering.scalars.insert(define.name.clone(), value);
                }
            }
        }

        let sql = if populations.is_empty() {
            "SELECT NULL AS population, 0 AS subject_count WHERE 1 = 0".to_string()
        } else {
            let counts: Vec<String> = populations
                .iter()
                .map(|name| {
                    format!(
                        "SELECT {} AS population, COUNT(DISTINCT subject_id) AS subject_count FROM {}",
                        self.dialect.string_literal(name),
                        self.dialect.quote_identifier(name)
                    )
                })
                .collect();
            format!("WITH {}\n{}", ctes.join(",\n"), counts.join("\nUNION ALL\n"))
        };

        log::info!(
            "Compiled {} population defines of {} to {} SQL",
            populations.len(),
            library.measure_identifier(),
            self.dialect
        );
        Ok(SqlStatement {
            sql,
            dialect: self.dialect,
            populations,
        })
    }
}

/// Compile with the ANSI dialect
pub async fn compile(
    library: &Library,
    order: &EvaluationOrder,
    schema: &SchemaDescriptor,
    resolver: &TerminologyResolver,
    parameters: &Parameters,
) -> CompileResult<SqlStatement> {
    SqlCompiler::new(schema)
        .compile(library, order, resolver, parameters)
        .await
}

/// Compile with the ANSI dialect and value sets already resolved
pub fn compile_resolved(
    library: &Library,
    order: &EvaluationOrder,
    schema: &SchemaDescriptor,
    terminology: &ResolvedTerminology,
    parameters: &Parameters,
) -> CompileResult<SqlStatement> {
    SqlCompiler::new(schema).compile_resolved(library, order, terminology, parameters)
}

enum Lowered {
    /// `SELECT` yielding a `subject_id` column
    Population(String),
    Scalar(ScalarValue),
}

/// Table a query reads, with the column holding its subject id
#[derive(Clone, Copy)]
enum Source<'a> {
    Patient(&'a PatientTable),
    Resource(&'a ResourceTable),
}

impl Source<'_> {
    fn table(&self) -> &str {
        match self {
            Source::Patient(table) => &table.table,
            Source::Resource(table) => &table.table,
        }
    }

    fn subject(&self) -> &str {
        match self {
            Source::Patient(table) => &table.id,
            Source::Resource(table) => &table.subject,
        }
    }
}

struct Lowering<'a> {
    schema: &'a SchemaDescriptor,
    dialect: SqlDialect,
    library: &'a Library,
    terminology: &'a ResolvedTerminology,
    parameters: &'a Parameters,
    define: String,
    scalars: HashMap<String, ScalarValue>,
    populations: HashSet<String>,
    aliases: usize,
}

impl<'a> Lowering<'a> {
    fn unsupported(&self, construct: impl Into<String>) -> CompileError {
        CompileError::unsupported(self.define.clone(), construct)
    }

    fn shape_error(&self, expected: &str, found: &str) -> CompileError {
        self.unsupported(format!("{found} used where {expected} is expected"))
    }

    fn alias(&mut self, prefix: &str) -> String {
        let alias = format!("{prefix}{}", self.aliases);
        self.aliases += 1;
        alias
    }

    fn ident(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    fn column(&self, alias: &str, column: &str) -> String {
        format!("{alias}.{}", self.ident(column))
    }

    fn string(&self, value: &str) -> String {
        self.dialect.string_literal(value)
    }

    fn instant(&self, at: NaiveDateTime) -> String {
        self.string(&at.format(INSTANT_FORMAT).to_string())
    }

    fn source(&self, resource_type: &str) -> CompileResult<Source<'a>> {
        let schema = self.schema;
        if resource_type == octofhir_cqm_ast::PATIENT {
            return Ok(Source::Patient(&schema.patient));
        }
        schema
            .resource_table(resource_type)
            .map(Source::Resource)
            .ok_or_else(|| CompileError::UnknownResourceType {
                define: self.define.clone(),
                resource_type: resource_type.to_string(),
            })
    }

    fn expression(&mut self, expression: &Expression) -> CompileResult<Lowered> {
        match expression {
            Expression::Query(query) => self.query(query).map(Lowered::Population),
            Expression::DefineRef(reference) => self.define_ref(&reference.name),
            Expression::SetOperation(operation) => self.set_operation(operation).map(Lowered::Population),
            Expression::Literal(value) => Ok(Lowered::Scalar(value.clone())),
            Expression::Parameter(name) => self.parameter(name).map(Lowered::Scalar),
            Expression::Boundary(boundary) => {
                let interval = self.interval(&boundary.interval)?;
                Ok(Lowered::Scalar(ScalarValue::DateTime(edge(&interval, boundary.edge))))
            }
            Expression::Unsupported(construct) => Err(self.unsupported(construct.construct.clone())),
        }
    }

    fn define_ref(&self, name: &str) -> CompileResult<Lowered> {
        if self.populations.contains(name) {
            return Ok(Lowered::Population(format!("SELECT subject_id FROM {}", self.ident(name))));
        }
        self.scalars
            .get(name)
            .cloned()
            .map(Lowered::Scalar)
            .ok_or_else(|| self.unsupported(format!("reference to \"{name}\", which has not been compiled")))
    }

    fn operand(&mut self, expression: &Expression) -> CompileResult<String> {
        match self.expression(expression)? {
            Lowered::Population(sql) => Ok(sql),
            Lowered::Scalar(value) => Err(self.shape_error("population", value.type_name())),
        }
    }

    /// `sql` as a derived table, safe to combine with compound operators
    fn derived(&mut self, sql: &str) -> String {
        let alias = self.alias("s");
        format!("SELECT {alias}.subject_id FROM ({sql}) AS {alias}")
    }

    fn set_operation(&mut self, operation: &SetOperation) -> CompileResult<String> {
        let patient = &self.schema.patient;
        let (patient_table, patient_id) = (self.ident(&patient.table), self.ident(&patient.id));
        match operation {
            SetOperation::Binary { op, left, right } => {
                let left = self.operand(left)?;
                let right = self.operand(right)?;
                let left = self.derived(&left);
                let right = self.derived(&right);
                Ok(format!("{left} {} {right}", op.sql_keyword()))
            }
            SetOperation::Exists(operand) => {
                let sql = self.operand(operand)?;
                let alias = self.alias("s");
                Ok(format!(
                    "SELECT {alias}.subject_id FROM ({sql}) AS {alias} \
                     WHERE {alias}.subject_id IN (SELECT {patient_id} FROM {patient_table})"
                ))
            }
            SetOperation::Not(operand) => {
                let sql = self.operand(operand)?;
                let operand = self.derived(&sql);
                Ok(format!(
                    "SELECT {patient_id} AS subject_id FROM {patient_table} EXCEPT {operand}"
                ))
            }
        }
    }

    fn query(&mut self, query: &ResourceQuery) -> CompileResult<String> {
        let source = self.source(&query.resource_type)?;
        let alias = self.alias("_t");
        let select = format!(
            "SELECT DISTINCT {} AS subject_id FROM {} AS {alias}",
            self.column(&alias, source.subject()),
            self.ident(source.table())
        );
        let conditions = self.conditions(query, source, &alias)?;
        Ok(if conditions.is_empty() {
            select
        } else {
            format!("{select} WHERE {}", conditions.join(" AND "))
        })
    }

    /// Conditions on `alias` for the query's filters, predicates and
    /// relationships
    fn conditions(&mut self, query: &ResourceQuery, source: Source<'a>, alias: &str) -> CompileResult<Vec<String>> {
        let mut conditions = Vec::new();

        if let Some(code) = &query.code {
            match source {
                Source::Patient(_) => return Err(self.unsupported("coded filter on a Patient retrieve")),
                Source::Resource(table) => conditions.push(self.code_condition(code, table, alias)?),
            }
        }

        for predicate in &query.predicates {
            let condition = match (predicate, source) {
                (Predicate::Gender(gender), Source::Patient(table)) => {
                    let op = if gender.negated { "<>" } else { "=" };
                    format!(
                        "{} {op} {}",
                        self.column(alias, &table.gender),
                        self.string(&gender.gender)
                    )
                }
                (Predicate::Age(age), Source::Patient(table)) => {
                    let at = self.instant_source(&age.at)?;
                    self.age_condition(at, age.op, age.years, &self.column(alias, &table.birth_date))
                }
                (Predicate::Code(code), Source::Resource(table)) => self.code_condition(code, table, alias)?,
                (Predicate::Temporal(temporal), Source::Resource(table)) => {
                    let interval = self.interval(&temporal.interval)?;
                    self.temporal_condition(&interval, table, alias)
                }
                (Predicate::Value(value), Source::Resource(table)) => {
                    let quantity = self.quantity(&value.quantity)?;
                    self.value_condition(value.op, &quantity, table, alias)
                }
                (predicate, _) => {
                    return Err(self.unsupported(format!(
                        "{} predicate on a {} query",
                        predicate_name(predicate),
                        query.resource_type
                    )));
                }
            };
            conditions.push(condition);
        }

        for relationship in &query.relationships {
            if relationship.query.is_patient() {
                return Err(self.unsupported("Patient as a related query"));
            }
            let left = match (source, relationship.correlation.is_some()) {
                (Source::Patient(_), true) => {
                    return Err(self.unsupported("temporal correlation with a Patient query"));
                }
                (Source::Patient(_), false) => None,
                (Source::Resource(table), _) => Some(table),
            };

            let related_source = self.source(&relationship.query.resource_type)?;
            let Source::Resource(related_table) = related_source else {
                return Err(self.unsupported("Patient as a related query"));
            };
            let related = self.alias("_t");
            let mut related_conditions = vec![format!(
                "{} = {}",
                self.column(&related, &related_table.subject),
                self.column(alias, source.subject())
            )];
            related_conditions.extend(self.conditions(&relationship.query, related_source, &related)?);
            if let (Some(left), Some(_)) = (left, &relationship.correlation) {
                related_conditions.push(format!(
                    "{} >= {} AND {} <= {}",
                    self.column(&related, &related_table.effective_start),
                    self.column(alias, &left.effective_start),
                    self.column(&related, &related_table.effective_end),
                    self.column(alias, &left.effective_end)
                ));
            }

            let keyword = match relationship.kind {
                RelationshipKind::With => "EXISTS",
                RelationshipKind::Without => "NOT EXISTS",
            };
            conditions.push(format!(
                "{keyword} (SELECT 1 FROM {} AS {related} WHERE {})",
                self.ident(&related_table.table),
                related_conditions.join(" AND ")
            ));
        }

        Ok(conditions)
    }

    fn code_condition(&mut self, code: &CodeFilter, table: &ResourceTable, alias: &str) -> CompileResult<String> {
        let coding = self.alias("_c");
        let system = self.column(&coding, &table.code_system);
        let code_column = self.column(&coding, &table.code);
        let membership = match code {
            CodeFilter::ValueSet(vs) => {
                let expansion = self.terminology.expansion(&ValueSetKey::from(vs))?;
                let groups: Vec<String> = expansion
                    .codes_by_system()
                    .iter()
                    .filter(|(_, codes)| !codes.is_empty())
                    .map(|(code_system, codes)| {
                        let codes: Vec<String> = codes.iter().map(|c| self.string(c)).collect();
                        format!(
                            "({system} = {} AND {code_column} IN ({}))",
                            self.string(code_system),
                            codes.join(", ")
                        )
                    })
                    .collect();
                if groups.is_empty() {
                    "1 = 0".to_string()
                } else {
                    groups.join(" OR ")
                }
            }
            CodeFilter::Code(code) => format!(
                "({system} = {} AND {code_column} = {})",
                self.string(&code.system),
                self.string(&code.code)
            ),
        };
        Ok(format!(
            "EXISTS (SELECT 1 FROM {} AS {coding} WHERE {} = {} AND {} = {} AND ({membership}))",
            self.ident(&table.table),
            self.column(&coding, &table.id),
            self.column(alias, &table.id),
            self.column(&coding, &table.subject),
            self.column(alias, &table.subject)
        ))
    }

    fn temporal_condition(&self, interval: &Interval, table: &ResourceTable, alias: &str) -> String {
        let low = if interval.low_closed { ">=" } else { ">" };
        let high = if interval.high_closed { "<=" } else { "<" };
        format!(
            "{} {low} {} AND {} {high} {}",
            self.column(alias, &table.effective_start),
            self.instant(interval.low),
            self.column(alias, &table.effective_end),
            self.instant(interval.high)
        )
    }

    fn value_condition(&self, op: Comparison, quantity: &Quantity, table: &ResourceTable, alias: &str) -> String {
        let comparison = format!(
            "{} {} {}",
            self.column(alias, &table.value),
            op.sql_symbol(),
            quantity.comparable()
        );
        match &quantity.unit {
            Some(unit) => format!(
                "{comparison} AND {} = {}",
                self.column(alias, &table.unit),
                self.string(unit)
            ),
            None => comparison,
        }
    }

    /// Whole years from the ISO `birth_date` text to `at`
    fn age_condition(&self, at: NaiveDateTime, op: Comparison, years: i64, birth_date: &str) -> String {
        let month_day = self.string(&at.format("%m-%d").to_string());
        format!(
            "({} - CAST(substr({birth_date}, 1, 4) AS INTEGER) \
             - CASE WHEN substr({birth_date}, 6, 5) > {month_day} THEN 1 ELSE 0 END) {} {years}",
            at.year(),
            op.sql_symbol()
        )
    }

    // Scalars, folded at compile time

    fn parameter(&self, name: &str) -> CompileResult<ScalarValue> {
        if let Some(value) = self.parameters.get(name) {
            return Ok(value.clone());
        }
        self.library
            .parameter(name)
            .and_then(|p| p.default.clone())
            .ok_or_else(|| CompileError::UndefinedParameter {
                name: name.to_string(),
            })
    }

    fn scalar_define(&self, name: &str) -> CompileResult<ScalarValue> {
        match self.define_ref(name)? {
            Lowered::Scalar(value) => Ok(value),
            Lowered::Population(_) => Err(self.shape_error("scalar", "population")),
        }
    }

    fn interval(&self, source: &IntervalSource) -> CompileResult<Interval> {
        let value = match source {
            IntervalSource::Literal(interval) => return Ok(*interval),
            IntervalSource::Parameter(name) => self.parameter(name)?,
            IntervalSource::Define(name) => self.scalar_define(name)?,
        };
        match value {
            ScalarValue::Interval(interval) => Ok(interval),
            other => Err(self.shape_error("Interval", other.type_name())),
        }
    }

    fn quantity(&self, source: &QuantitySource) -> CompileResult<Quantity> {
        let value = match source {
            QuantitySource::Literal(quantity) => return Ok(quantity.clone()),
            QuantitySource::Parameter(name) => self.parameter(name)?,
            QuantitySource::Define(name) => self.scalar_define(name)?,
        };
        match value {
            ScalarValue::Quantity(quantity) => Ok(quantity),
            other => Err(self.shape_error("Quantity", other.type_name())),
        }
    }

    fn instant_source(&self, source: &InstantSource) -> CompileResult<NaiveDateTime> {
        let value = match source {
            InstantSource::Literal(at) => return Ok(*at),
            InstantSource::Boundary(boundary) => {
                return Ok(edge(&self.interval(&boundary.interval)?, boundary.edge));
            }
            InstantSource::Parameter(name) => self.parameter(name)?,
            InstantSource::Define(name) => self.scalar_define(name)?,
        };
        match value {
            ScalarValue::DateTime(at) => Ok(at),
            other => Err(self.shape_error("DateTime", other.type_name())),
        }
    }
}

fn edge(interval: &Interval, edge: Edge) -> NaiveDateTime {
    match edge {
        Edge::Start => interval.start(),
        Edge::End => interval.end(),
    }
}

fn predicate_name(predicate: &Predicate) -> &'static str {
    match predicate {
        Predicate::Temporal(_) => "temporal",
        Predicate::Value(_) => "value",
        Predicate::Gender(_) => "gender",
        Predicate::Age(_) => "age",
        Predicate::Code(_) => "code",
    }
}
