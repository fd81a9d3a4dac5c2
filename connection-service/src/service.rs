//! 连接管理服务模块

use std::sync::Arc;

use async_trait::async_trait;
use validator::Validate;

use common::errors::AppResult;
use common::metadata_store::MetadataStore;
use common::models::connection::{
    validate_connection_name, ConnectionItem, CreateConnectionRequest, ValidateConnectionRequest,
};
use common::models::metadata::{HarvestSummary, MetadataSnapshot, MetadataStatus};

use crate::harvester::Harvester;
use crate::registry::ConnectionRegistry;

/// 连接服务 Trait
#[async_trait]
pub trait ConnectionServiceTrait: Send + Sync {
    /// 列出所有已配置的连接
    async fn list(&self) -> AppResult<Vec<ConnectionItem>>;

    /// 校验并注册新连接
    async fn create(&self, req: CreateConnectionRequest) -> AppResult<ConnectionItem>;

    /// 探测描述符但不保存，返回延迟（毫秒）
    async fn validate(&self, req: ValidateConnectionRequest) -> AppResult<u64>;

    /// 根据名称获取连接
    async fn get(&self, name: &str) -> AppResult<ConnectionItem>;

    /// 测试已保存的连接，返回延迟（毫秒）
    async fn test(&self, name: &str) -> AppResult<u64>;

    /// 采集元数据并写入元数据存储
    async fn harvest(&self, name: &str) -> AppResult<HarvestSummary>;

    /// 读取已采集的元数据
    async fn metadata(&self, name: &str) -> AppResult<MetadataSnapshot>;

    /// 查询是否已采集元数据
    async fn metadata_status(&self, name: &str) -> AppResult<MetadataStatus>;
}

/// 数据库连接管理服务
pub struct ConnectionService {
    registry: Arc<ConnectionRegistry>,
    harvester: Arc<Harvester>,
    store: Arc<MetadataStore>,
}

impl ConnectionService {
    /// 创建新的连接服务实例
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        harvester: Arc<Harvester>,
        store: Arc<MetadataStore>,
    ) -> Self {
        Self {
            registry,
            harvester,
            store,
        }
    }
}

#[async_trait]
impl ConnectionServiceTrait for ConnectionService {
    async fn list(&self) -> AppResult<Vec<ConnectionItem>> {
        Ok(self
            .registry
            .discover()?
            .into_iter()
            .map(ConnectionItem::from)
            .collect())
    }

    async fn create(&self, req: CreateConnectionRequest) -> AppResult<ConnectionItem> {
        req.validate()?;
        let descriptor = req.descriptor()?;
        let connection = self.registry.register(&req.name, &descriptor).await?;
        Ok(ConnectionItem::from(connection))
    }

    async fn validate(&self, req: ValidateConnectionRequest) -> AppResult<u64> {
        let descriptor = req.descriptor()?;
        let latency = self.registry.validate(&descriptor).await?;
        Ok(latency.as_millis() as u64)
    }

    async fn get(&self, name: &str) -> AppResult<ConnectionItem> {
        self.registry.get(name).map(ConnectionItem::from)
    }

    async fn test(&self, name: &str) -> AppResult<u64> {
        let connection = self.registry.get(name)?;
        let latency = self.registry.probe(&connection).await?;
        Ok(latency.as_millis() as u64)
    }

    async fn harvest(&self, name: &str) -> AppResult<HarvestSummary> {
        validate_connection_name(name)?;
        let _guard = self.harvester.begin(name)?;
        let connection = self.registry.get(name)?;
        let snapshot = self.harvester.harvest(&connection).await?;
        self.store.write(name, &snapshot)?;
        Ok(HarvestSummary::from(&snapshot))
    }

    async fn metadata(&self, name: &str) -> AppResult<MetadataSnapshot> {
        self.store.read(name)
    }

    async fn metadata_status(&self, name: &str) -> AppResult<MetadataStatus> {
        validate_connection_name(name)?;
        Ok(MetadataStatus {
            connection_name: name.to_string(),
            harvested: self.store.exists(name),
        })
    }
}

impl From<&crate::state::AppState> for ConnectionService {
    fn from(state: &crate::state::AppState) -> Self {
        Self::new(
            state.registry.clone(),
            state.harvester.clone(),
            state.metadata.clone(),
        )
    }
}
