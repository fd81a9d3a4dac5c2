//! Snapshot builders and a scripted LLM for tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::models::connection::EngineKind;
use common::models::metadata::{
    ColumnDescriptor, MetadataSnapshot, SchemaDescriptor, TableDescriptor, TypeFamily,
};

use crate::llm::{CompletionRequest, LlmClient, LlmError};

pub fn column(schema: &str, table: &str, name: &str, native: &str, ordinal: u32) -> ColumnDescriptor {
    ColumnDescriptor {
        schema_name: schema.into(),
        table_name: table.into(),
        column_name: name.into(),
        data_type: TypeFamily::from_native(native),
        native_type: native.into(),
        nullable: true,
        ordinal_position: ordinal,
        description: None,
    }
}

pub fn table(schema: &str, name: &str, description: Option<&str>) -> TableDescriptor {
    TableDescriptor {
        schema_name: schema.into(),
        table_name: name.into(),
        description: description.map(Into::into),
    }
}

/// Builds a snapshot whose schemas are derived from the tables.
pub fn snapshot(tables: Vec<TableDescriptor>, columns: Vec<ColumnDescriptor>) -> MetadataSnapshot {
    let mut schema_names: Vec<String> = tables.iter().map(|t| t.schema_name.clone()).collect();
    schema_names.sort();
    schema_names.dedup();
    MetadataSnapshot {
        connection_name: "sales".into(),
        engine: EngineKind::Postgres,
        dialect: "PostgreSQL".into(),
        harvested_at: Utc::now(),
        schemas: schema_names
            .into_iter()
            .map(|schema_name| SchemaDescriptor { schema_name })
            .collect(),
        tables,
        columns,
    }
}

/// `public.users(id integer NOT NULL, email text)` with descriptions.
pub fn users_snapshot(connection: &str) -> MetadataSnapshot {
    let mut id = column("public", "users", "id", "integer", 1);
    id.nullable = false;
    let mut email = column("public", "users", "email", "text", 2);
    email.description = Some("primary contact address".into());
    let mut snap = snapshot(vec![table("public", "users", Some("registered accounts"))], vec![id, email]);
    snap.connection_name = connection.into();
    snap
}

/// One recorded LLM call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub user: String,
    pub model: String,
}

/// LLM that returns a fixed reply and records what it was asked.
pub struct ScriptedLlm {
    reply: Result<String, LlmError>,
    delay: Option<Duration>,
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlm {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: LlmError) -> Self {
        Self {
            reply: Err(error),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system: request.system.to_string(),
            user: request.user.to_string(),
            model: request.model.to_string(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone()
    }
}
