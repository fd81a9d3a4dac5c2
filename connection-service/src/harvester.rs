//! 元数据采集
//!
//! 通过 [`Introspector`] 读取连接的 schema、表和列，生成完整的 [`MetadataSnapshot`]。
//! 采集要么返回完整快照，要么返回分类后的错误；连接在任何情况下都会被关闭。

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use common::errors::{AppError, AppResult};
use common::models::connection::{Connection, ProbeError, ProbeFailure};
use common::models::metadata::{
    ColumnDescriptor, MetadataSnapshot, SchemaDescriptor, TableDescriptor, TypeFamily,
};
use tracing::{debug, info, warn};

use crate::introspect::{IntrospectResult, Introspector, IntrospectorFactory};

/// 元数据采集器
pub struct Harvester {
    factory: Arc<dyn IntrospectorFactory>,
    call_timeout: Duration,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// 正在进行的采集；释放时解除该连接的占用
pub struct HarvestGuard {
    name: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for HarvestGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.name);
    }
}

impl Harvester {
    pub fn new(factory: Arc<dyn IntrospectorFactory>, call_timeout: Duration) -> Self {
        Self {
            factory,
            call_timeout,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 占用连接，同一连接同时只允许一次采集
    pub fn begin(&self, connection_name: &str) -> AppResult<HarvestGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(connection_name.to_string()) {
            return Err(AppError::HarvestInProgress(connection_name.to_string()));
        }
        Ok(HarvestGuard {
            name: connection_name.to_string(),
            in_flight: self.in_flight.clone(),
        })
    }

    /// 采集连接的完整结构
    pub async fn harvest(&self, connection: &Connection) -> AppResult<MetadataSnapshot> {
        let started = Instant::now();
        let introspector = self
            .bounded(&connection.name, "connect", self.factory.open(connection))
            .await?;

        let result = self.collect(connection, introspector.as_ref()).await;
        introspector.close().await;

        match &result {
            Ok(snapshot) => info!(
                connection = %connection.name,
                schemas = snapshot.schemas.len(),
                tables = snapshot.tables.len(),
                columns = snapshot.columns.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "元数据采集完成"
            ),
            Err(e) => warn!(connection = %connection.name, error = %e, "元数据采集失败"),
        }
        result
    }

    async fn collect(
        &self,
        connection: &Connection,
        introspector: &dyn Introspector,
    ) -> AppResult<MetadataSnapshot> {
        let name = connection.name.as_str();
        let schema_names = self.bounded(name, "list schemas", introspector.list_schemas()).await?;

        let mut schemas = Vec::with_capacity(schema_names.len());
        let mut tables = Vec::new();
        let mut columns = Vec::new();

        for schema in schema_names {
            let raw_tables = self
                .bounded(name, "list tables", introspector.list_tables(&schema))
                .await?;
            debug!(connection = %name, schema = %schema, tables = raw_tables.len(), "读取 schema");

            for table in raw_tables {
                let raw_columns = self
                    .bounded(name, "list columns", introspector.list_columns(&schema, &table.name))
                    .await?;
                columns.extend(raw_columns.into_iter().map(|c| ColumnDescriptor {
                    schema_name: schema.clone(),
                    table_name: table.name.clone(),
                    column_name: c.name,
                    data_type: TypeFamily::from_native(&c.native_type),
                    native_type: c.native_type,
                    nullable: c.nullable,
                    ordinal_position: c.ordinal_position,
                    description: c.description,
                }));
                tables.push(TableDescriptor {
                    schema_name: schema.clone(),
                    table_name: table.name,
                    description: table.description,
                });
            }
            schemas.push(SchemaDescriptor { schema_name: schema });
        }

        let snapshot = MetadataSnapshot {
            connection_name: name.to_string(),
            engine: connection.engine,
            dialect: connection.dialect().to_string(),
            harvested_at: Utc::now(),
            schemas,
            tables,
            columns,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// 为单次反射调用加上超时并分类错误
    ///
    /// 超时只在调用让出执行权时生效；阻塞式驱动（DuckDB）需在阻塞线程池中执行。
    async fn bounded<T>(
        &self,
        connection_name: &str,
        step: &str,
        call: impl Future<Output = IntrospectResult<T>>,
    ) -> AppResult<T> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(connection_name, step, e)),
            Err(_) => Err(AppError::HarvestTimeout(format!(
                "{}: {} exceeded {}s",
                connection_name,
                step,
                self.call_timeout.as_secs_f32()
            ))),
        }
    }
}

fn classify(connection_name: &str, step: &str, e: ProbeError) -> AppError {
    let message = format!("{}: {} failed: {}", connection_name, step, e.message);
    match e.kind {
        ProbeFailure::Timeout => AppError::HarvestTimeout(message),
        _ => AppError::HarvestConnection(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{raw_column, FakeDatabase, FakeFactory};

    const URL: &str = "postgres://u:p@db.internal/app";

    fn harvester(factory: Arc<FakeFactory>) -> Harvester {
        Harvester::new(factory, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_harvest_users_table() {
        let factory = Arc::new(FakeFactory::default().with(URL, FakeDatabase::users()));
        let conn = Connection::new("main_db", URL).unwrap();
        let snapshot = harvester(factory.clone()).harvest(&conn).await.unwrap();

        assert_eq!(snapshot.connection_name, "main_db");
        assert_eq!(snapshot.dialect, "PostgreSQL");
        assert_eq!(snapshot.schemas.len(), 1);
        assert_eq!(snapshot.tables.len(), 1);
        assert_eq!(snapshot.tables[0].description.as_deref(), Some("registered accounts"));
        assert_eq!(snapshot.columns.len(), 2);

        let id = &snapshot.columns[0];
        assert_eq!(id.column_name, "id");
        assert_eq!(id.data_type, TypeFamily::Integer);
        assert!(!id.nullable);
        let email = &snapshot.columns[1];
        assert_eq!(email.data_type, TypeFamily::Text);
        assert_eq!(email.description.as_deref(), Some("primary contact address"));

        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_empty_database_harvests_empty_snapshot() {
        let factory = Arc::new(FakeFactory::default().with(URL, FakeDatabase::default()));
        let conn = Connection::new("empty", URL).unwrap();
        let snapshot = harvester(factory).harvest(&conn).await.unwrap();
        assert!(snapshot.is_empty());
        assert!(snapshot.tables.is_empty());
    }

    #[tokio::test]
    async fn test_column_failure_is_classified_and_closes() {
        let mut db = FakeDatabase::users();
        db.columns_error = Some(ProbeError::unreachable("connection reset"));
        let factory = Arc::new(FakeFactory::default().with(URL, db));
        let conn = Connection::new("flaky", URL).unwrap();

        let err = harvester(factory.clone()).harvest(&conn).await.unwrap_err();
        assert!(matches!(err, AppError::HarvestConnection(_)));
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_slow_engine_times_out() {
        let mut db = FakeDatabase::users();
        db.delay = Some(Duration::from_secs(5));
        let factory = Arc::new(FakeFactory::default().with(URL, db));
        let conn = Connection::new("slow", URL).unwrap();

        let err = harvester(factory.clone()).harvest(&conn).await.unwrap_err();
        assert!(matches!(err, AppError::HarvestTimeout(_)));
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_open_is_connection_error() {
        let factory = Arc::new(FakeFactory::default());
        let conn = Connection::new("gone", URL).unwrap();
        let err = harvester(factory).harvest(&conn).await.unwrap_err();
        assert!(matches!(err, AppError::HarvestConnection(_)));
    }

    #[tokio::test]
    async fn test_duplicate_columns_rejected() {
        let db = FakeDatabase::default().with_table(
            "public",
            "t",
            vec![
                raw_column("a", "int", true, 1, None),
                raw_column("a", "int", true, 2, None),
            ],
        );
        let factory = Arc::new(FakeFactory::default().with(URL, db));
        let conn = Connection::new("dup", URL).unwrap();
        let err = harvester(factory).harvest(&conn).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSnapshot(_)));
    }

    #[test]
    fn test_begin_rejects_concurrent_harvest() {
        let h = harvester(Arc::new(FakeFactory::default()));
        let guard = h.begin("main_db").unwrap();
        assert!(matches!(h.begin("main_db"), Err(AppError::HarvestInProgress(_))));
        assert!(h.begin("other").is_ok());
        drop(guard);
        assert!(h.begin("main_db").is_ok());
    }
}
