//! 数据库连接管理服务
//!
//! 提供数据库连接与元数据功能，包括：
//! - 连接的发现、校验与注册
//! - 连接测试
//! - 元数据采集与读取

mod config_store;
mod handlers;
mod harvester;
mod introspect;
mod registry;
mod routes;
mod service;
mod state;
#[cfg(test)]
mod testing;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::middleware::request_id::request_id_middleware;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

const SERVICE_NAME: &str = "connection-service";
const DEFAULT_PORT: u16 = 8081;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "连接服务 API",
        version = "0.1.0",
        description = "数据库连接与元数据采集微服务"
    ),
    paths(
        handlers::list_connections,
        handlers::create_connection,
        handlers::validate_connection,
        handlers::get_connection,
        handlers::test_connection,
        handlers::harvest_connection,
        handlers::get_metadata,
        handlers::get_metadata_status,
        handlers::health_check,
    ),
    components(schemas(
        common::models::ConnectionItem,
        common::models::CreateConnectionRequest,
        common::models::ValidateConnectionRequest,
        common::models::EngineKind,
        common::models::ProbeFailure,
        common::models::ValidationStatus,
        common::models::MetadataSnapshot,
        common::models::SchemaDescriptor,
        common::models::TableDescriptor,
        common::models::ColumnDescriptor,
        common::models::TypeFamily,
        common::models::HarvestSummary,
        common::models::MetadataStatus,
        handlers::ProbeReport,
        handlers::HealthResponse,
    )),
    tags(
        (name = "connections", description = "连接管理端点"),
        (name = "metadata", description = "元数据采集端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载 .env 与配置
    let mut config = AppConfig::bootstrap(SERVICE_NAME);
    config.port = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 创建应用状态
    let state = AppState::new(config.clone());
    info!(
        metadata_dir = %config.metadata_dir.display(),
        env_file = %config.env_file.display(),
        "元数据目录与连接配置"
    );

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = format!("{}:{}", config.host, config.port);
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;
    axum::serve(listener, app).await.context("服务启动失败")?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::metadata_store::MetadataStore;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config_store::InMemoryConfigStore;
    use crate::harvester::Harvester;
    use crate::registry::ConnectionRegistry;
    use crate::testing::{FakeDatabase, FakeFactory};

    const SALES: &str = "postgres://u:p@sales.internal/sales";

    fn test_state(dir: &TempDir) -> AppState {
        let factory = Arc::new(FakeFactory::default().with(SALES, FakeDatabase::users()));
        AppState {
            config: AppConfig::load_with_service(SERVICE_NAME),
            registry: Arc::new(ConnectionRegistry::new(
                Arc::new(InMemoryConfigStore::with_entries(&[("sales", SALES)])),
                factory.clone(),
                Duration::from_secs(1),
            )),
            harvester: Arc::new(Harvester::new(factory, Duration::from_secs(1))),
            metadata: Arc::new(MetadataStore::new(dir.path())),
        }
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_harvest_over_http() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));

        let (status, body) = send(app.clone(), "GET", "/api/connections/sales/metadata").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, body) = send(app.clone(), "POST", "/api/connections/sales/harvest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["columns"], 2);
        assert!(body["meta"]["request_id"].is_string());

        let (status, body) = send(app, "GET", "/api/connections/sales/metadata").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["tables"][0]["table_name"], "users");
    }

    #[tokio::test]
    async fn test_unknown_connection_is_404() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));
        let (status, body) = send(app, "GET", "/api/connections/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "CONNECTION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_openapi_lists_harvest_path() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));
        let (status, body) = send(app, "GET", "/api-docs/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/api/connections/{name}/harvest"].is_object());
    }
}
