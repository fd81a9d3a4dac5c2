//! On-disk metadata store.
//!
//! Layout, one directory per connection:
//!
//! ```text
//! <root>/<connection>/manifest.json
//! <root>/<connection>/<generation>/schemas.json
//! <root>/<connection>/<generation>/tables.json
//! <root>/<connection>/<generation>/columns.json
//! ```
//!
//! A write stages the three collections in a fresh generation directory and then
//! replaces `manifest.json` with a rename. Readers only follow the manifest, so they
//! see either the previous snapshot or the new one, never a mix.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::errors::{AppError, AppResult};
use crate::models::connection::{validate_connection_name, EngineKind};
use crate::models::metadata::{ColumnDescriptor, MetadataSnapshot, SchemaDescriptor, TableDescriptor};
use crate::utils::IdGenerator;

/// Version of the on-disk format.
pub const FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const SCHEMAS_FILE: &str = "schemas.json";
const TABLES_FILE: &str = "tables.json";
const COLUMNS_FILE: &str = "columns.json";
const STAGING_PREFIX: &str = ".tmp-";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    connection: String,
    generation: String,
    engine: EngineKind,
    dialect: String,
    harvested_at: DateTime<Utc>,
    schemas: usize,
    tables: usize,
    columns: usize,
}

/// One collection file. `I` is a borrowed slice when writing and a `Vec` when reading.
#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile<I> {
    format_version: u32,
    kind: String,
    connection: String,
    generation: String,
    items: I,
}

/// Persists metadata snapshots per connection.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns true once a harvest has been committed for the connection.
    pub fn exists(&self, connection_name: &str) -> bool {
        validate_connection_name(connection_name).is_ok()
            && self.connection_dir(connection_name).join(MANIFEST_FILE).is_file()
    }

    /// Replaces the stored snapshot for `connection_name`.
    pub fn write(&self, connection_name: &str, snapshot: &MetadataSnapshot) -> AppResult<()> {
        validate_connection_name(connection_name)?;
        if snapshot.connection_name != connection_name {
            return Err(AppError::InvalidSnapshot(format!(
                "snapshot belongs to {}, not {}",
                snapshot.connection_name, connection_name
            )));
        }
        snapshot.validate()?;

        let dir = self.connection_dir(connection_name);
        fs::create_dir_all(&dir).map_err(|e| io_error("create", &dir, e))?;
        let previous = read_manifest(&dir)?.map(|m| m.generation);

        let generation = IdGenerator::generation_id();
        let staging = dir.join(format!("{}{}", STAGING_PREFIX, generation));
        fs::create_dir(&staging).map_err(|e| io_error("create", &staging, e))?;
        if let Err(e) = write_collections(&staging, connection_name, &generation, snapshot) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
        let generation_dir = dir.join(&generation);
        fs::rename(&staging, &generation_dir).map_err(|e| io_error("rename", &staging, e))?;

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            connection: connection_name.to_string(),
            generation: generation.clone(),
            engine: snapshot.engine,
            dialect: snapshot.dialect.clone(),
            harvested_at: snapshot.harvested_at,
            schemas: snapshot.schemas.len(),
            tables: snapshot.tables.len(),
            columns: snapshot.columns.len(),
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| io_error("create", &dir, e))?;
        serde_json::to_writer_pretty(&mut tmp, &manifest)?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| io_error("sync", tmp.path(), e))?;
        tmp.persist(&manifest_path)
            .map_err(|e| io_error("replace", &manifest_path, e.error))?;

        tracing::info!(
            connection = %connection_name,
            generation = %generation,
            schemas = manifest.schemas,
            tables = manifest.tables,
            columns = manifest.columns,
            "Metadata snapshot committed"
        );

        prune_generations(&dir, &generation, previous.as_deref());
        Ok(())
    }

    /// Loads the current snapshot for `connection_name`.
    ///
    /// Fails with [`AppError::MetadataNotFound`] when no harvest was ever committed.
    pub fn read(&self, connection_name: &str) -> AppResult<MetadataSnapshot> {
        validate_connection_name(connection_name)?;
        let dir = self.connection_dir(connection_name);
        let manifest = read_manifest(&dir)?
            .ok_or_else(|| AppError::MetadataNotFound(connection_name.to_string()))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(AppError::MetadataStore(format!(
                "unsupported format version {} for {}",
                manifest.format_version, connection_name
            )));
        }
        if manifest.connection != connection_name {
            return Err(corrupt(connection_name, "manifest names another connection"));
        }

        let generation_dir = dir.join(&manifest.generation);
        let schemas: Vec<SchemaDescriptor> =
            read_collection(&generation_dir.join(SCHEMAS_FILE), "schemas", &manifest)?;
        let tables: Vec<TableDescriptor> =
            read_collection(&generation_dir.join(TABLES_FILE), "tables", &manifest)?;
        let columns: Vec<ColumnDescriptor> =
            read_collection(&generation_dir.join(COLUMNS_FILE), "columns", &manifest)?;

        if schemas.len() != manifest.schemas
            || tables.len() != manifest.tables
            || columns.len() != manifest.columns
        {
            return Err(corrupt(connection_name, "collection sizes disagree with manifest"));
        }

        Ok(MetadataSnapshot {
            connection_name: manifest.connection,
            engine: manifest.engine,
            dialect: manifest.dialect,
            harvested_at: manifest.harvested_at,
            schemas,
            tables,
            columns,
        })
    }

    fn connection_dir(&self, connection_name: &str) -> PathBuf {
        self.root.join(connection_name)
    }
}

fn write_collections(
    staging: &Path,
    connection: &str,
    generation: &str,
    snapshot: &MetadataSnapshot,
) -> AppResult<()> {
    write_json(
        &staging.join(SCHEMAS_FILE),
        &collection("schemas", connection, generation, snapshot.schemas.as_slice()),
    )?;
    write_json(
        &staging.join(TABLES_FILE),
        &collection("tables", connection, generation, snapshot.tables.as_slice()),
    )?;
    write_json(
        &staging.join(COLUMNS_FILE),
        &collection("columns", connection, generation, snapshot.columns.as_slice()),
    )
}

fn collection<'a, T>(
    kind: &str,
    connection: &str,
    generation: &str,
    items: &'a [T],
) -> CollectionFile<&'a [T]> {
    CollectionFile {
        format_version: FORMAT_VERSION,
        kind: kind.to_string(),
        connection: connection.to_string(),
        generation: generation.to_string(),
        items,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
    let file = File::create(path).map_err(|e| io_error("create", path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|e| io_error("write", path, e))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| io_error("sync", path, e))
}

fn read_manifest(dir: &Path) -> AppResult<Option<Manifest>> {
    let path = dir.join(MANIFEST_FILE);
    match fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| AppError::MetadataStore(format!("unreadable manifest {}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error("read", &path, e)),
    }
}

fn read_collection<T: DeserializeOwned>(
    path: &Path,
    kind: &str,
    manifest: &Manifest,
) -> AppResult<Vec<T>> {
    let bytes = fs::read(path).map_err(|e| io_error("read", path, e))?;
    let file: CollectionFile<Vec<T>> = serde_json::from_slice(&bytes)
        .map_err(|e| AppError::MetadataStore(format!("unreadable {}: {}", path.display(), e)))?;
    if file.kind != kind
        || file.generation != manifest.generation
        || file.connection != manifest.connection
        || file.format_version != manifest.format_version
    {
        return Err(corrupt(
            &manifest.connection,
            &format!("{} does not belong to generation {}", path.display(), manifest.generation),
        ));
    }
    Ok(file.items)
}

/// Removes generations other than the current and the previous one. Failures are logged only.
fn prune_generations(dir: &Path, current: &str, previous: Option<&str>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Could not list metadata generations");
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir || name == current || Some(name.as_str()) == previous {
            continue;
        }
        if let Err(e) = fs::remove_dir_all(entry.path()) {
            tracing::warn!(path = %entry.path().display(), error = %e, "Could not prune metadata generation");
        }
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> AppError {
    AppError::MetadataStore(format!("failed to {} {}: {}", action, path.display(), e))
}

fn corrupt(connection: &str, detail: &str) -> AppError {
    AppError::MetadataStore(format!("stored metadata for {} is inconsistent: {}", connection, detail))
}
