//! PostgreSQL / Redshift reflection through `pg_catalog`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use common::models::connection::{Connection, ProbeError, ProbeFailure};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use super::{clean_description, IntrospectResult, Introspector, RawColumn, RawTable};

const SCHEMAS_SQL: &str = "SELECT n.nspname::text AS schema_name
     FROM pg_catalog.pg_namespace n
     WHERE n.nspname <> 'information_schema' AND n.nspname NOT LIKE 'pg\\_%'
     ORDER BY n.nspname";

const TABLES_SQL: &str = "SELECT c.relname::text AS table_name,
            obj_description(c.oid, 'pg_class') AS description
     FROM pg_catalog.pg_class c
     JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
     WHERE n.nspname = $1 AND c.relkind IN ('r', 'p', 'v', 'm', 'f')
     ORDER BY c.relname";

const COLUMNS_SQL: &str = "SELECT a.attname::text AS column_name,
            pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
            NOT a.attnotnull AS nullable,
            a.attnum::int4 AS ordinal_position,
            col_description(a.attrelid, a.attnum) AS description
     FROM pg_catalog.pg_attribute a
     JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
     JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
     WHERE n.nspname = $1 AND c.relname = $2 AND a.attnum > 0 AND NOT a.attisdropped
     ORDER BY a.attnum";

#[derive(sqlx::FromRow)]
struct TableRow {
    table_name: String,
    description: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ColumnRow {
    column_name: String,
    data_type: String,
    nullable: bool,
    ordinal_position: i32,
    description: Option<String>,
}

/// Introspector over a single-connection pool.
pub struct PostgresIntrospector {
    pool: PgPool,
}

impl PostgresIntrospector {
    /// Opens a pool with one connection, establishing it eagerly.
    pub async fn connect(connection: &Connection, timeout: Duration) -> IntrospectResult<Self> {
        let options = PgConnectOptions::from_str(&connection.postgres_url()).map_err(classify)?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await
            .map_err(classify)?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Introspector for PostgresIntrospector {
    async fn ping(&self) -> IntrospectResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn list_schemas(&self) -> IntrospectResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(SCHEMAS_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)
    }

    async fn list_tables(&self, schema: &str) -> IntrospectResult<Vec<RawTable>> {
        let rows = sqlx::query_as::<_, TableRow>(TABLES_SQL)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        Ok(rows
            .into_iter()
            .map(|r| RawTable {
                name: r.table_name,
                description: clean_description(r.description),
            })
            .collect())
    }

    async fn list_columns(&self, schema: &str, table: &str) -> IntrospectResult<Vec<RawColumn>> {
        let rows = sqlx::query_as::<_, ColumnRow>(COLUMNS_SQL)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        Ok(rows
            .into_iter()
            .map(|r| RawColumn {
                name: r.column_name,
                native_type: r.data_type,
                nullable: r.nullable,
                ordinal_position: u32::try_from(r.ordinal_position).unwrap_or(0),
                description: clean_description(r.description),
            })
            .collect())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Maps driver errors onto probe failure kinds.
fn classify(e: sqlx::Error) -> ProbeError {
    match &e {
        sqlx::Error::Configuration(_) => ProbeError::malformed(e.to_string()),
        sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some("28000" | "28P01")) => {
            ProbeError::new(ProbeFailure::AuthFailed, db.message().to_string())
        }
        sqlx::Error::PoolTimedOut => ProbeError::timeout(e.to_string()),
        _ => ProbeError::unreachable(e.to_string()),
    }
}
