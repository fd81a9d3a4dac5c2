//! In-process fake database used by the registry, harvester and service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::models::connection::{Connection, ProbeError};

use crate::introspect::{IntrospectResult, Introspector, IntrospectorFactory, RawColumn, RawTable};

/// Structure served by a fake database, plus injected failures.
#[derive(Clone, Default)]
pub struct FakeDatabase {
    pub schemas: Vec<String>,
    pub tables: HashMap<String, Vec<RawTable>>,
    pub columns: HashMap<(String, String), Vec<RawColumn>>,
    pub open_error: Option<ProbeError>,
    pub columns_error: Option<ProbeError>,
    pub delay: Option<Duration>,
}

impl FakeDatabase {
    /// `public.users(id integer NOT NULL, email text -- primary contact address)`.
    pub fn users() -> Self {
        let mut db = Self::default();
        db.schemas.push("public".into());
        db.tables.insert(
            "public".into(),
            vec![RawTable {
                name: "users".into(),
                description: Some("registered accounts".into()),
            }],
        );
        db.columns.insert(
            ("public".into(), "users".into()),
            vec![
                raw_column("id", "integer", false, 1, None),
                raw_column("email", "text", true, 2, Some("primary contact address")),
            ],
        );
        db
    }

    pub fn with_table(mut self, schema: &str, table: &str, columns: Vec<RawColumn>) -> Self {
        if !self.schemas.iter().any(|s| s == schema) {
            self.schemas.push(schema.into());
        }
        self.tables.entry(schema.into()).or_default().push(RawTable {
            name: table.into(),
            description: None,
        });
        self.columns.insert((schema.into(), table.into()), columns);
        self
    }
}

pub fn raw_column(
    name: &str,
    native_type: &str,
    nullable: bool,
    ordinal: u32,
    description: Option<&str>,
) -> RawColumn {
    RawColumn {
        name: name.into(),
        native_type: native_type.into(),
        nullable,
        ordinal_position: ordinal,
        description: description.map(Into::into),
    }
}

/// Factory serving fake databases keyed by descriptor.
#[derive(Default)]
pub struct FakeFactory {
    databases: Mutex<HashMap<String, FakeDatabase>>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl FakeFactory {
    pub fn with(self, descriptor: &str, db: FakeDatabase) -> Self {
        self.set(descriptor, db);
        self
    }

    /// Replaces the database behind a descriptor.
    pub fn set(&self, descriptor: &str, db: FakeDatabase) {
        self.databases
            .lock()
            .unwrap()
            .insert(descriptor.to_string(), db);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntrospectorFactory for FakeFactory {
    async fn open(&self, connection: &Connection) -> IntrospectResult<Box<dyn Introspector>> {
        let db = self
            .databases
            .lock()
            .unwrap()
            .get(&connection.descriptor)
            .cloned()
            .ok_or_else(|| ProbeError::unreachable("no such host"))?;
        if let Some(e) = db.open_error.clone() {
            return Err(e);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeIntrospector {
            db,
            closed: self.closed.clone(),
        }))
    }
}

struct FakeIntrospector {
    db: FakeDatabase,
    closed: Arc<AtomicUsize>,
}

impl FakeIntrospector {
    async fn pause(&self) {
        if let Some(delay) = self.db.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Introspector for FakeIntrospector {
    async fn ping(&self) -> IntrospectResult<()> {
        self.pause().await;
        Ok(())
    }

    async fn list_schemas(&self) -> IntrospectResult<Vec<String>> {
        self.pause().await;
        Ok(self.db.schemas.clone())
    }

    async fn list_tables(&self, schema: &str) -> IntrospectResult<Vec<RawTable>> {
        Ok(self.db.tables.get(schema).cloned().unwrap_or_default())
    }

    async fn list_columns(&self, schema: &str, table: &str) -> IntrospectResult<Vec<RawColumn>> {
        if let Some(e) = self.db.columns_error.clone() {
            return Err(e);
        }
        Ok(self
            .db
            .columns
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
