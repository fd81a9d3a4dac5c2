//! Harvested schema metadata.
//!
//! A [`MetadataSnapshot`] holds three flat collections (schemas, tables, columns).
//! Every entry carries the names of its parents so the hierarchy can be rebuilt
//! from the stored collections alone.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};
use crate::models::connection::EngineKind;

/// Engine-agnostic type vocabulary used in prompts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TypeFamily {
    Integer,
    Decimal,
    Text,
    Boolean,
    DateTime,
    Binary,
    Other,
}

impl TypeFamily {
    /// Maps a native type name (`varchar(255)`, `TIMESTAMP WITH TIME ZONE`, `int4[]`, ...)
    /// onto the common vocabulary.
    pub fn from_native(native: &str) -> Self {
        let lowered = native.trim().to_lowercase();
        if lowered.ends_with("[]") || lowered.starts_with("array") || lowered.starts_with('_') {
            return TypeFamily::Other;
        }
        let base = match lowered.find('(') {
            Some(idx) => lowered[..idx].trim_end(),
            None => lowered.as_str(),
        };
        match base {
            "smallint" | "integer" | "int" | "bigint" | "int2" | "int4" | "int8" | "tinyint"
            | "hugeint" | "uhugeint" | "utinyint" | "usmallint" | "uinteger" | "ubigint"
            | "smallserial" | "serial" | "bigserial" | "serial2" | "serial4" | "serial8"
            | "int1" | "int16" | "int32" | "int64" | "long" | "short" | "signed" => {
                TypeFamily::Integer
            }
            "numeric" | "decimal" | "real" | "double" | "double precision" | "float"
            | "float4" | "float8" | "money" => TypeFamily::Decimal,
            "text" | "varchar" | "character varying" | "character" | "char" | "bpchar"
            | "nchar" | "nvarchar" | "string" | "citext" | "name" | "uuid" | "enum" => {
                TypeFamily::Text
            }
            "boolean" | "bool" | "logical" => TypeFamily::Boolean,
            "bytea" | "blob" | "binary" | "varbinary" | "bytes" => TypeFamily::Binary,
            b if b.starts_with("timestamp")
                || b.starts_with("time")
                || b.starts_with("date")
                || b.starts_with("interval") =>
            {
                TypeFamily::DateTime
            }
            _ => TypeFamily::Other,
        }
    }
}

impl fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeFamily::Integer => "integer",
            TypeFamily::Decimal => "decimal",
            TypeFamily::Text => "text",
            TypeFamily::Boolean => "boolean",
            TypeFamily::DateTime => "date/time",
            TypeFamily::Binary => "binary",
            TypeFamily::Other => "other",
        };
        f.write_str(s)
    }
}

/// A schema (namespace) of one connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SchemaDescriptor {
    pub schema_name: String,
}

/// A table or view inside a schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TableDescriptor {
    pub schema_name: String,
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A column of a table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ColumnDescriptor {
    pub schema_name: String,
    pub table_name: String,
    pub column_name: String,
    /// Normalized type family.
    pub data_type: TypeFamily,
    /// Type as declared by the engine.
    pub native_type: String,
    pub nullable: bool,
    pub ordinal_position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Full capture of one connection's structure at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MetadataSnapshot {
    pub connection_name: String,
    pub engine: EngineKind,
    /// Dialect name recorded at harvest time.
    pub dialect: String,
    pub harvested_at: DateTime<Utc>,
    pub schemas: Vec<SchemaDescriptor>,
    pub tables: Vec<TableDescriptor>,
    pub columns: Vec<ColumnDescriptor>,
}

impl MetadataSnapshot {
    /// Checks the structural invariants: no orphan tables or columns and no
    /// duplicate schema, table or column identities.
    pub fn validate(&self) -> AppResult<()> {
        let mut schemas = HashSet::new();
        for schema in &self.schemas {
            if !schemas.insert(schema.schema_name.as_str()) {
                return Err(AppError::InvalidSnapshot(format!(
                    "duplicate schema {}",
                    schema.schema_name
                )));
            }
        }

        let mut tables = HashSet::new();
        for table in &self.tables {
            if !schemas.contains(table.schema_name.as_str()) {
                return Err(AppError::InvalidSnapshot(format!(
                    "table {}.{} references unknown schema",
                    table.schema_name, table.table_name
                )));
            }
            if !tables.insert((table.schema_name.as_str(), table.table_name.as_str())) {
                return Err(AppError::InvalidSnapshot(format!(
                    "duplicate table {}.{}",
                    table.schema_name, table.table_name
                )));
            }
        }

        let mut columns = HashSet::new();
        for column in &self.columns {
            let parent = (column.schema_name.as_str(), column.table_name.as_str());
            if !tables.contains(&parent) {
                return Err(AppError::InvalidSnapshot(format!(
                    "column {}.{}.{} references unknown table",
                    column.schema_name, column.table_name, column.column_name
                )));
            }
            if !columns.insert((parent.0, parent.1, column.column_name.as_str())) {
                return Err(AppError::InvalidSnapshot(format!(
                    "duplicate column {}.{}.{}",
                    column.schema_name, column.table_name, column.column_name
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Result of a completed harvest.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HarvestSummary {
    pub connection_name: String,
    pub harvested_at: DateTime<Utc>,
    pub schemas: usize,
    pub tables: usize,
    pub columns: usize,
}

impl From<&MetadataSnapshot> for HarvestSummary {
    fn from(snapshot: &MetadataSnapshot) -> Self {
        Self {
            connection_name: snapshot.connection_name.clone(),
            harvested_at: snapshot.harvested_at,
            schemas: snapshot.schemas.len(),
            tables: snapshot.tables.len(),
            columns: snapshot.columns.len(),
        }
    }
}

/// Whether metadata has been harvested for a connection.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MetadataStatus {
    pub connection_name: String,
    pub harvested: bool,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_type_normalization() {
        assert_eq!(TypeFamily::from_native("INTEGER"), TypeFamily::Integer);
        assert_eq!(TypeFamily::from_native("int8"), TypeFamily::Integer);
        assert_eq!(TypeFamily::from_native("numeric(12,2)"), TypeFamily::Decimal);
        assert_eq!(TypeFamily::from_native("double precision"), TypeFamily::Decimal);
        assert_eq!(TypeFamily::from_native("character varying(255)"), TypeFamily::Text);
        assert_eq!(TypeFamily::from_native("VARCHAR"), TypeFamily::Text);
        assert_eq!(TypeFamily::from_native("bool"), TypeFamily::Boolean);
        assert_eq!(
            TypeFamily::from_native("timestamp with time zone"),
            TypeFamily::DateTime
        );
        assert_eq!(TypeFamily::from_native("DATE"), TypeFamily::DateTime);
        assert_eq!(TypeFamily::from_native("bytea"), TypeFamily::Binary);
        assert_eq!(TypeFamily::from_native("BLOB"), TypeFamily::Binary);
        assert_eq!(TypeFamily::from_native("integer[]"), TypeFamily::Other);
        assert_eq!(TypeFamily::from_native("jsonb"), TypeFamily::Other);
        assert_eq!(TypeFamily::DateTime.to_string(), "date/time");
    }

    #[test]
    fn test_valid_snapshot_passes() {
        assert!(users_snapshot("sales").validate().is_ok());
    }

    #[test]
    fn test_orphan_table_rejected() {
        let mut snapshot = users_snapshot("sales");
        snapshot.tables[0].schema_name = "missing".into();
        let err = snapshot.validate().unwrap_err();
        assert!(matches!(err, AppError::InvalidSnapshot(_)));
    }

    #[test]
    fn test_orphan_column_rejected() {
        let mut snapshot = users_snapshot("sales");
        snapshot.columns.push(column("public", "orders", "id", "int", 1));
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let mut snapshot = users_snapshot("sales");
        snapshot.columns.push(column("public", "users", "email", "text", 3));
        assert!(snapshot.validate().is_err());
    }
}
