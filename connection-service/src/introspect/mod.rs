//! Engine reflection.
//!
//! Each engine kind has one [`Introspector`] implementation; the
//! [`IntrospectorFactory`] picks it from the connection's engine so the registry
//! and the harvester never branch on engine details themselves.

mod duckdb;
mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use common::models::connection::{Connection, EngineKind, ProbeError};

pub use self::duckdb::DuckDbIntrospector;
pub use self::postgres::PostgresIntrospector;

/// Result type for reflection calls.
pub type IntrospectResult<T> = Result<T, ProbeError>;

/// Schema used when an engine reports no user schema.
pub const IMPLICIT_SCHEMA: &str = "main";

/// A table or view as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub name: String,
    pub description: Option<String>,
}

/// A column as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    pub native_type: String,
    pub nullable: bool,
    pub ordinal_position: u32,
    pub description: Option<String>,
}

/// Reflection capability over one open database connection.
#[async_trait]
pub trait Introspector: Send + Sync {
    /// Cheap round trip used by connection probes.
    async fn ping(&self) -> IntrospectResult<()>;

    /// Lists user schemas.
    async fn list_schemas(&self) -> IntrospectResult<Vec<String>>;

    /// Lists tables and views of a schema, ordered by name.
    async fn list_tables(&self, schema: &str) -> IntrospectResult<Vec<RawTable>>;

    /// Lists the columns of a table in ordinal order.
    async fn list_columns(&self, schema: &str, table: &str) -> IntrospectResult<Vec<RawColumn>>;

    /// Releases the underlying connection.
    async fn close(&self);
}

/// Opens an [`Introspector`] for a connection.
#[async_trait]
pub trait IntrospectorFactory: Send + Sync {
    async fn open(&self, connection: &Connection) -> IntrospectResult<Box<dyn Introspector>>;
}

/// Factory backed by real database drivers.
pub struct LiveIntrospectorFactory {
    connect_timeout: Duration,
}

impl LiveIntrospectorFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl IntrospectorFactory for LiveIntrospectorFactory {
    async fn open(&self, connection: &Connection) -> IntrospectResult<Box<dyn Introspector>> {
        match connection.engine {
            EngineKind::Postgres => {
                let introspector =
                    PostgresIntrospector::connect(connection, self.connect_timeout).await?;
                Ok(Box::new(introspector))
            }
            EngineKind::DuckDb => Ok(Box::new(DuckDbIntrospector::open(connection)?)),
        }
    }
}

/// Trims a comment and drops it when empty; engines report missing comments
/// as either NULL or ''.
pub(crate) fn clean_description(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_description() {
        assert_eq!(clean_description(None), None);
        assert_eq!(clean_description(Some("   ".into())), None);
        assert_eq!(
            clean_description(Some(" user email \n".into())),
            Some("user email".to_string())
        );
    }
}
