//! DuckDB reflection through the `duckdb_*()` catalog functions.
//!
//! DuckDB runs in-process and its API is blocking, so every call runs on the
//! blocking pool under a mutex. A caller timeout stops waiting on a slow call;
//! the query itself finishes in the background before the connection is dropped.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::models::connection::{Connection, ProbeError};
use duckdb::{params, AccessMode, Config};

use super::{clean_description, IntrospectResult, Introspector, RawColumn, RawTable, IMPLICIT_SCHEMA};

const SCHEMAS_SQL: &str = "SELECT schema_name FROM duckdb_schemas()
     WHERE database_name = current_database()
       AND schema_name NOT IN ('information_schema', 'pg_catalog')
     ORDER BY schema_name";

const TABLES_SQL: &str = "SELECT table_name, comment FROM duckdb_tables()
     WHERE database_name = current_database() AND schema_name = ? AND NOT internal
     UNION ALL
     SELECT view_name, comment FROM duckdb_views()
     WHERE database_name = current_database() AND schema_name = ? AND NOT internal
     ORDER BY 1";

const COLUMNS_SQL: &str = "SELECT column_name, data_type, is_nullable, column_index, comment
     FROM duckdb_columns()
     WHERE database_name = current_database() AND schema_name = ? AND table_name = ?
     ORDER BY column_index";

pub struct DuckDbIntrospector {
    conn: Arc<Mutex<duckdb::Connection>>,
}

impl DuckDbIntrospector {
    /// Opens the database file read-only, or a fresh in-memory database.
    pub fn open(connection: &Connection) -> IntrospectResult<Self> {
        let conn = match connection.duckdb_path() {
            None => duckdb::Connection::open_in_memory().map_err(unreachable)?,
            Some(path) => {
                if !Path::new(path).is_file() {
                    return Err(ProbeError::unreachable(format!(
                        "database file not found: {}",
                        path
                    )));
                }
                let config = Config::default()
                    .access_mode(AccessMode::ReadOnly)
                    .map_err(|e| ProbeError::malformed(e.to_string()))?;
                duckdb::Connection::open_with_flags(path, config).map_err(unreachable)?
            }
        };
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on tokio's blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> IntrospectResult<T>
    where
        F: FnOnce(&duckdb::Connection) -> duckdb::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| ProbeError::unreachable("duckdb connection lock poisoned"))?;
            f(&conn).map_err(unreachable)
        })
        .await
        .map_err(|e| ProbeError::unreachable(format!("duckdb task failed: {}", e)))?
    }
}

#[async_trait]
impl Introspector for DuckDbIntrospector {
    async fn ping(&self) -> IntrospectResult<()> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0)))
            .await?;
        Ok(())
    }

    async fn list_schemas(&self) -> IntrospectResult<Vec<String>> {
        let mut schemas = self.with_conn(|conn| {
            let mut stmt = conn.prepare(SCHEMAS_SQL)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<duckdb::Result<Vec<_>>>()
        })
        .await?;
        if schemas.is_empty() {
            schemas.push(IMPLICIT_SCHEMA.to_string());
        }
        Ok(schemas)
    }

    async fn list_tables(&self, schema: &str) -> IntrospectResult<Vec<RawTable>> {
        let schema = schema.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(TABLES_SQL)?;
            let rows = stmt.query_map(params![schema, schema], |row| {
                Ok(RawTable {
                    name: row.get(0)?,
                    description: clean_description(row.get(1)?),
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn list_columns(&self, schema: &str, table: &str) -> IntrospectResult<Vec<RawColumn>> {
        let (schema, table) = (schema.to_string(), table.to_string());
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(COLUMNS_SQL)?;
            let rows = stmt.query_map(params![schema, table], |row| {
                let index: i64 = row.get(3)?;
                Ok(RawColumn {
                    name: row.get(0)?,
                    native_type: row.get(1)?,
                    nullable: row.get(2)?,
                    ordinal_position: u32::try_from(index).unwrap_or(0),
                    description: clean_description(row.get(4)?),
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn close(&self) {
        // Dropping the connection closes it.
    }
}

fn unreachable(e: duckdb::Error) -> ProbeError {
    ProbeError::unreachable(e.to_string())
}
