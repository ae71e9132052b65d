//! SQLite-backed parameter store.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use super::{ANY_SERIES, ParameterRecord, ParameterStore};
use crate::error::BlindResult;

pub struct SqliteParameterStore {
    conn: Connection,
}

impl SqliteParameterStore {
    pub fn open(path: &Path) -> BlindResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> BlindResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> BlindResult<Self> {
        create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Insert or replace records in one transaction.  Returns how many were
    /// written.
    pub fn import<I>(&mut self, records: I) -> BlindResult<usize>
    where
        I: IntoIterator<Item = ParameterRecord>,
    {
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO parameters
                    (series_name, detector_name, configuration_name, parameter_name, value)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.series_name,
                    record.detector_name,
                    record.configuration_name,
                    record.parameter_name,
                    record.value,
                ])?;
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    pub fn count(&self) -> BlindResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM parameters", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

fn create_schema(conn: &Connection) -> BlindResult<()> {
    // Series-independent rows use an empty series name so the key stays unique.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS parameters (
            series_name TEXT NOT NULL DEFAULT '',
            detector_name TEXT NOT NULL,
            configuration_name TEXT NOT NULL,
            parameter_name TEXT NOT NULL,
            value REAL NOT NULL,
            UNIQUE (series_name, detector_name, configuration_name, parameter_name)
        )",
        [],
    )?;
    Ok(())
}

impl ParameterStore for SqliteParameterStore {
    fn lookup(
        &self,
        series: &str,
        detector: &str,
        configuration: &str,
        parameter: &str,
    ) -> BlindResult<Option<f64>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT value FROM parameters
             WHERE series_name IN (?1, ?2)
               AND detector_name = ?3
               AND configuration_name = ?4
               AND parameter_name = ?5
             ORDER BY series_name = ?2
             LIMIT 1",
        )?;
        let value = stmt
            .query_row(
                params![series, ANY_SERIES, detector, configuration, parameter],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}
