//! Connection configuration models.
//!
//! Contains models for database connection management.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::{AppError, AppResult};

const DUCKDB_PREFIX: &str = "duckdb:///";
const DUCKDB_MEMORY: &str = ":memory:";
const MAX_NAME_LEN: usize = 64;

/// Database engine family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// PostgreSQL and wire-compatible engines (Redshift).
    Postgres,
    /// DuckDB database file.
    DuckDb,
}

impl EngineKind {
    /// Resolves the engine from a descriptor's URL scheme.
    pub fn from_descriptor(descriptor: &str) -> Result<Self, ProbeError> {
        let (scheme, rest) = descriptor.trim().split_once("://").ok_or_else(|| {
            ProbeError::malformed(format!("descriptor has no URL scheme: {}", redact_descriptor(descriptor)))
        })?;
        if rest.is_empty() {
            return Err(ProbeError::malformed("descriptor has an empty location"));
        }
        let base = scheme.split('+').next().unwrap_or(scheme).to_lowercase();
        match base.as_str() {
            "postgres" | "postgresql" | "redshift" => Ok(EngineKind::Postgres),
            "duckdb" => Ok(EngineKind::DuckDb),
            other => Err(ProbeError::malformed(format!("unsupported scheme: {}", other))),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Postgres => write!(f, "postgres"),
            EngineKind::DuckDb => write!(f, "duckdb"),
        }
    }
}

/// Classified reason a connection probe failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeFailure {
    Unreachable,
    AuthFailed,
    MalformedDescriptor,
    Timeout,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeFailure::Unreachable => "unreachable",
            ProbeFailure::AuthFailed => "auth-failed",
            ProbeFailure::MalformedDescriptor => "malformed-descriptor",
            ProbeFailure::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Failure reported by a probe or an introspection call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ProbeError {
    pub kind: ProbeFailure,
    pub message: String,
}

impl ProbeError {
    pub fn new(kind: ProbeFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProbeFailure::MalformedDescriptor, message)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ProbeFailure::Unreachable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProbeFailure::Timeout, message)
    }
}

impl From<ProbeError> for AppError {
    fn from(e: ProbeError) -> Self {
        AppError::ConnectionValidation {
            kind: e.kind,
            message: e.message,
        }
    }
}

/// Validation state of a connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Unvalidated,
    Valid,
    Invalid,
}

/// A named database connection.
///
/// The descriptor may embed credentials, so this type is never serialized;
/// API responses use [`ConnectionItem`].
#[derive(Clone, PartialEq, Eq)]
pub struct Connection {
    pub name: String,
    pub engine: EngineKind,
    pub descriptor: String,
    pub status: ValidationStatus,
}

impl Connection {
    /// Creates an unvalidated connection, resolving the engine from the descriptor.
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Result<Self, ProbeError> {
        let descriptor = descriptor.into();
        let engine = EngineKind::from_descriptor(&descriptor)?;
        Ok(Self {
            name: name.into(),
            engine,
            descriptor,
            status: ValidationStatus::Unvalidated,
        })
    }

    pub fn with_status(mut self, status: ValidationStatus) -> Self {
        self.status = status;
        self
    }

    /// SQL dialect name used in prompts.
    pub fn dialect(&self) -> &'static str {
        match self.engine {
            EngineKind::DuckDb => "DuckDB",
            EngineKind::Postgres if self.descriptor.to_lowercase().contains("redshift") => {
                "Redshift"
            }
            EngineKind::Postgres => "PostgreSQL",
        }
    }

    /// URL accepted by the PostgreSQL driver (`redshift` schemes are rewritten).
    pub fn postgres_url(&self) -> String {
        match self.descriptor.split_once("://") {
            Some((_, rest)) => format!("postgres://{}", rest),
            None => self.descriptor.clone(),
        }
    }

    /// Database file for DuckDB connections; `None` means in-memory.
    pub fn duckdb_path(&self) -> Option<&str> {
        let path = self.descriptor.strip_prefix(DUCKDB_PREFIX).unwrap_or_else(|| {
            self.descriptor
                .split_once("://")
                .map(|(_, rest)| rest)
                .unwrap_or(&self.descriptor)
        });
        if path.is_empty() || path == DUCKDB_MEMORY {
            None
        } else {
            Some(path)
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("engine", &self.engine)
            .field("descriptor", &redact_descriptor(&self.descriptor))
            .field("status", &self.status)
            .finish()
    }
}

/// Checks that a connection name can be used as a configuration key and a directory name.
pub fn validate_connection_name(name: &str) -> AppResult<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(AppError::InvalidRequest(format!(
            "connection name must be 1-{} characters",
            MAX_NAME_LEN
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::InvalidRequest(format!(
            "connection name {:?} may only contain letters, digits and '_'",
            name
        )));
    }
    Ok(())
}

/// Normalizes common URL forms so the drivers accept them.
///
/// `postgresql+psycopg2://` style schemes become `postgres://`, `redshift+driver://`
/// becomes `redshift://`. DuckDB URLs are left unchanged.
pub fn normalize_descriptor(descriptor: &str) -> String {
    let s = descriptor.trim();
    let Some((scheme, rest)) = s.split_once("://") else {
        return s.to_string();
    };
    let base = scheme.split('+').next().unwrap_or(scheme).to_lowercase();
    match base.as_str() {
        "postgres" | "postgresql" => format!("postgres://{}", rest),
        "redshift" => format!("redshift://{}", rest),
        _ => s.to_string(),
    }
}

/// Converts a filesystem path (or `:memory:`) to a DuckDB descriptor.
pub fn path_to_duckdb_url(file_path: &str) -> AppResult<String> {
    let s = file_path.trim();
    if s.is_empty() {
        return Err(AppError::InvalidRequest("database file path is required".into()));
    }
    if s.eq_ignore_ascii_case(DUCKDB_MEMORY) {
        return Ok(format!("{}{}", DUCKDB_PREFIX, DUCKDB_MEMORY));
    }
    let absolute = std::path::absolute(s)
        .map_err(|e| AppError::InvalidRequest(format!("invalid database path {:?}: {}", s, e)))?;
    let path = absolute.to_string_lossy().replace('\\', "/");
    Ok(format!("{}{}", DUCKDB_PREFIX, path))
}

/// Hides the password component of a URL descriptor.
pub fn redact_descriptor(descriptor: &str) -> String {
    let Some((scheme, rest)) = descriptor.split_once("://") else {
        return descriptor.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    match authority.rsplit_once('@') {
        Some((userinfo, host)) => {
            let user = userinfo.split(':').next().unwrap_or_default();
            if userinfo.contains(':') {
                format!("{}://{}:***@{}{}", scheme, user, host, tail)
            } else {
                format!("{}://{}@{}{}", scheme, user, host, tail)
            }
        }
        None => descriptor.to_string(),
    }
}

/// Picks the descriptor from a request that carries either a URL or a DuckDB path.
fn resolve_descriptor(descriptor: Option<&str>, file_path: Option<&str>) -> AppResult<String> {
    let descriptor = descriptor.map(str::trim).filter(|s| !s.is_empty());
    let file_path = file_path.map(str::trim).filter(|s| !s.is_empty());
    match (descriptor, file_path) {
        (Some(url), None) => Ok(normalize_descriptor(url)),
        (None, Some(path)) => path_to_duckdb_url(path),
        (Some(_), Some(_)) => Err(AppError::InvalidRequest(
            "provide either descriptor or file_path, not both".into(),
        )),
        (None, None) => Err(AppError::InvalidRequest(
            "a connection descriptor or a DuckDB file path is required".into(),
        )),
    }
}

/// Request body for registering a new connection.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateConnectionRequest {
    /// Connection name (letters, digits and '_').
    #[validate(length(min = 1, max = 64, message = "Name must be 1-64 characters"))]
    pub name: String,
    /// Connection URL (postgres://, postgresql://, redshift:// or duckdb:///).
    pub descriptor: Option<String>,
    /// DuckDB database file path, as an alternative to `descriptor`.
    pub file_path: Option<String>,
}

impl CreateConnectionRequest {
    /// Returns the normalized descriptor.
    pub fn descriptor(&self) -> AppResult<String> {
        resolve_descriptor(self.descriptor.as_deref(), self.file_path.as_deref())
    }
}

/// Request body for probing a descriptor without registering it.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateConnectionRequest {
    pub descriptor: Option<String>,
    pub file_path: Option<String>,
}

impl ValidateConnectionRequest {
    pub fn descriptor(&self) -> AppResult<String> {
        resolve_descriptor(self.descriptor.as_deref(), self.file_path.as_deref())
    }
}

/// Connection item for API responses (credentials redacted).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionItem {
    pub name: String,
    pub engine: EngineKind,
    /// Dialect name used in prompts.
    pub dialect: String,
    /// Descriptor with the password hidden.
    pub descriptor: String,
    pub status: ValidationStatus,
}

impl From<&Connection> for ConnectionItem {
    fn from(conn: &Connection) -> Self {
        Self {
            name: conn.name.clone(),
            engine: conn.engine,
            dialect: conn.dialect().to_string(),
            descriptor: redact_descriptor(&conn.descriptor),
            status: conn.status,
        }
    }
}

impl From<Connection> for ConnectionItem {
    fn from(conn: Connection) -> Self {
        Self::from(&conn)
    }
}
