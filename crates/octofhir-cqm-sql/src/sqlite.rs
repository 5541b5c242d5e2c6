//! SQLite backend
//!
//! Runs statements in-process on a single connection and can load a
//! [`ClinicalDataSnapshot`] into the flattened tables a [`SchemaDescriptor`]
//! describes: one row per patient, one row per resource coding (a resource
//! without codings gets a single row with null code columns), ISO-8601 text
//! timestamps, instants stored with start = end.

use crate::{PopulationCount, SqlDialect, SqlExecutionError, SqlExecutor, SqlStatement};
use async_trait::async_trait;
use octofhir_cqm_model::{
    ClinicalDataSnapshot, INSTANT_FORMAT, PatientTable, Resource, ResourceTable, SchemaDescriptor,
};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use std::collections::HashMap;
use std::path::Path;

pub struct SqliteExecutor {
    conn: Mutex<Connection>,
}

impl SqliteExecutor {
    pub fn open_in_memory() -> Result<Self, SqlExecutionError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqlExecutionError> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Create the schema's tables (if missing) and insert the snapshot.
    ///
    /// Resources whose type the schema does not map are skipped. The schema
    /// must give every resource type its own table, and identifiers must be
    /// unique within the snapshot.
    pub fn load_snapshot(
        &self,
        snapshot: &ClinicalDataSnapshot,
        schema: &SchemaDescriptor,
    ) -> Result<(), SqlExecutionError> {
        schema.validate()?;
        if let Some(duplicate) = snapshot.duplicate_identifier() {
            return Err(SqlExecutionError::InvalidData(duplicate.to_string()));
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute_batch(&create_patient_table(&schema.patient))?;
        for table in schema.resources.values() {
            tx.execute_batch(&create_resource_table(table))?;
        }

        {
            let patient = &schema.patient;
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} ({}, {}, {}) VALUES (?1, ?2, ?3)",
                quote(&patient.table),
                quote(&patient.id),
                quote(&patient.gender),
                quote(&patient.birth_date)
            ))?;
            for p in &snapshot.patients {
                let birth_date = p.birth_date.map(|d| d.format("%Y-%m-%d").to_string());
                insert.execute(params![p.id, p.gender, birth_date])?;
            }
        }

        let mut skipped = 0usize;
        let mut inserts = HashMap::new();
        for resource in &snapshot.resources {
            let Some(table) = schema.resource_table(&resource.resource_type) else {
                skipped += 1;
                continue;
            };
            let sql = inserts
                .entry(table.table.as_str())
                .or_insert_with(|| insert_resource_sql(table));
            let mut insert = tx.prepare_cached(sql)?;
            for row in resource_rows(resource) {
                insert.execute(params![
                    row.id,
                    row.subject,
                    row.system,
                    row.code,
                    row.start,
                    row.end,
                    row.value,
                    row.unit
                ])?;
            }
        }
        tx.commit()?;

        if skipped > 0 {
            log::warn!("Skipped {skipped} resources of types the schema does not map");
        }
        log::debug!(
            "Loaded {} patients and {} resources into SQLite",
            snapshot.patients.len(),
            snapshot.resources.len() - skipped
        );
        Ok(())
    }

    /// Run `statement` on the calling thread
    pub fn execute_blocking(&self, statement: &SqlStatement) -> Result<Vec<PopulationCount>, SqlExecutionError> {
        if statement.dialect != SqlDialect::Ansi {
            return Err(SqlExecutionError::Failed(format!(
                "SQLite runs ansi SQL, not {}",
                statement.dialect
            )));
        }
        if statement.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&statement.sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = HashMap::new();
        for row in rows {
            let (population, count) = row?;
            if let Some(population) = population {
                counts.insert(population, u64::try_from(count).unwrap_or_default());
            }
        }

        statement
            .populations
            .iter()
            .map(|population| {
                counts
                    .get(population)
                    .map(|count| PopulationCount::new(population.clone(), *count))
                    .ok_or_else(|| SqlExecutionError::Failed(format!("No count returned for \"{population}\"")))
            })
            .collect()
    }
}

#[async_trait]
impl SqlExecutor for SqliteExecutor {
    async fn execute(&self, statement: &SqlStatement) -> Result<Vec<PopulationCount>, SqlExecutionError> {
        self.execute_blocking(statement)
    }
}

impl std::fmt::Debug for SqliteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteExecutor").finish_non_exhaustive()
    }
}

fn quote(name: &str) -> String {
    SqlDialect::Ansi.quote_identifier(name)
}

fn create_patient_table(table: &PatientTable) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({} TEXT NOT NULL, {} TEXT, {} TEXT)",
        quote(&table.table),
        quote(&table.id),
        quote(&table.gender),
        quote(&table.birth_date)
    )
}

fn create_resource_table(table: &ResourceTable) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({} TEXT NOT NULL, {} TEXT NOT NULL, {} TEXT, {} TEXT, {} TEXT, {} TEXT, {} REAL, {} TEXT)",
        quote(&table.table),
        quote(&table.id),
        quote(&table.subject),
        quote(&table.code_system),
        quote(&table.code),
        quote(&table.effective_start),
        quote(&table.effective_end),
        quote(&table.value),
        quote(&table.unit)
    )
}

fn insert_resource_sql(table: &ResourceTable) -> String {
    format!(
        "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        quote(&table.table),
        quote(&table.id),
        quote(&table.subject),
        quote(&table.code_system),
        quote(&table.code),
        quote(&table.effective_start),
        quote(&table.effective_end),
        quote(&table.value),
        quote(&table.unit)
    )
}

struct ResourceRow<'a> {
    id: &'a str,
    subject: &'a str,
    system: Option<&'a str>,
    code: Option<&'a str>,
    start: Option<String>,
    end: Option<String>,
    value: Option<String>,
    unit: Option<&'a str>,
}

fn resource_rows(resource: &Resource) -> Vec<ResourceRow<'_>> {
    let (start, end) = resource.effective_bounds();
    let start = start.map(|at| at.format(INSTANT_FORMAT).to_string());
    let end = end.map(|at| at.format(INSTANT_FORMAT).to_string());
    let value = resource.value.as_ref().map(|q| q.comparable().to_string());
    let unit = resource.value.as_ref().and_then(|q| q.unit.as_deref());

    let row = |system, code| ResourceRow {
        id: &resource.id,
        subject: &resource.subject,
        system,
        code,
        start: start.clone(),
        end: end.clone(),
        value: value.clone(),
        unit,
    };
    if resource.codings.is_empty() {
        return vec![row(None, None)];
    }
    resource
        .codings
        .iter()
        .map(|coding| row(Some(coding.system.as_str()), Some(coding.code.as_str())))
        .collect()
}
