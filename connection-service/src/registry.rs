//! 连接注册表
//!
//! 负责发现、校验、注册和查找命名连接。连接只有在探测成功后才会被持久化。

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::errors::{AppError, AppResult};
use common::models::connection::{
    normalize_descriptor, validate_connection_name, Connection, ProbeError, ValidationStatus,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config_store::ConfigStore;
use crate::introspect::IntrospectorFactory;

/// 命名连接注册表
pub struct ConnectionRegistry {
    store: Arc<dyn ConfigStore>,
    factory: Arc<dyn IntrospectorFactory>,
    probe_timeout: Duration,
    /// 串行化注册，保证重名检查与持久化之间没有竞争
    registration: Mutex<()>,
}

impl ConnectionRegistry {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        factory: Arc<dyn IntrospectorFactory>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            store,
            factory,
            probe_timeout,
            registration: Mutex::new(()),
        }
    }

    /// 列出所有配置中的连接（未校验）
    ///
    /// 无法识别引擎的条目会被跳过并记录警告。
    pub fn discover(&self) -> AppResult<Vec<Connection>> {
        let connections = self
            .store
            .entries()?
            .into_iter()
            .filter_map(|(name, descriptor)| {
                if let Err(e) = validate_connection_name(&name) {
                    warn!(connection = %name, error = %e, "跳过名称无效的连接配置");
                    return None;
                }
                match Connection::new(&name, descriptor) {
                    Ok(conn) => Some(conn),
                    Err(e) => {
                        warn!(connection = %name, error = %e, "跳过无法识别的连接配置");
                        None
                    }
                }
            })
            .collect();
        Ok(connections)
    }

    /// 按名称查找连接
    pub fn get(&self, name: &str) -> AppResult<Connection> {
        self.find(name)?
            .ok_or_else(|| AppError::ConnectionNotFound(name.to_string()))
    }

    fn find(&self, name: &str) -> AppResult<Option<Connection>> {
        Ok(self.discover()?.into_iter().find(|c| c.name == name))
    }

    /// 探测描述符是否可用，返回往返延迟
    pub async fn validate(&self, descriptor: &str) -> Result<Duration, ProbeError> {
        let connection = Connection::new("probe", normalize_descriptor(descriptor))?;
        self.probe(&connection).await
    }

    /// 探测已有连接
    pub async fn probe(&self, connection: &Connection) -> Result<Duration, ProbeError> {
        let started = Instant::now();
        let attempt = async {
            let introspector = self.factory.open(connection).await?;
            let outcome = introspector.ping().await;
            introspector.close().await;
            outcome
        };
        match tokio::time::timeout(self.probe_timeout, attempt).await {
            Ok(Ok(())) => {
                let latency = started.elapsed();
                debug!(connection = %connection.name, latency_ms = latency.as_millis() as u64, "探测成功");
                Ok(latency)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProbeError::timeout(format!(
                "no response within {}s",
                self.probe_timeout.as_secs_f32()
            ))),
        }
    }

    /// 校验并注册新连接
    ///
    /// 名称重复或探测失败时不会修改任何配置。
    pub async fn register(&self, name: &str, descriptor: &str) -> AppResult<Connection> {
        validate_connection_name(name)?;
        let descriptor = normalize_descriptor(descriptor);
        let connection = Connection::new(name, descriptor)?;

        let _guard = self.registration.lock().await;
        if self.find(name)?.is_some() {
            return Err(AppError::DuplicateName(name.to_string()));
        }

        if let Err(e) = self.probe(&connection).await {
            warn!(connection = %name, kind = %e.kind, error = %e.message, "连接校验失败");
            return Err(e.into());
        }

        self.store.persist(name, &connection.descriptor)?;
        info!(connection = %name, engine = %connection.engine, "连接已注册");
        Ok(connection.with_status(ValidationStatus::Valid))
    }
}
