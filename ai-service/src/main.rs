//! AI 智能查询服务
//!
//! 基于已采集的数据库元数据，将自然语言问题转换为 SQL：
//! - 元数据上下文组装（按预算截断）
//! - 多服务商 LLM 调用
//! - 单条 SQL 语句提取

mod context;
mod extract;
mod handlers;
mod llm;
mod prompt;
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

const SERVICE_NAME: &str = "ai-service";
const DEFAULT_PORT: u16 = 8083;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "AI 服务 API",
        version = "0.1.0",
        description = "基于数据库元数据的 Text2SQL 微服务"
    ),
    paths(
        handlers::generate_sql,
        handlers::list_providers,
        handlers::health_check,
    ),
    components(schemas(
        common::models::GenerateRequest,
        common::models::GenerateResponse,
        common::models::Provider,
        common::models::ProviderModels,
        handlers::HealthResponse,
    )),
    tags(
        (name = "generation", description = "SQL 生成端点"),
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
    let state = AppState::new(config.clone()).context("初始化应用状态失败")?;
    let configured: Vec<String> = common::models::Provider::ALL
        .into_iter()
        .filter(|p| state.llm_config.is_configured(*p))
        .map(|p| p.to_string())
        .collect();
    info!(providers = ?configured, budget = config.context_budget_chars, "LLM 服务商配置");

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

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use common::metadata_store::MetadataStore;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::llm::LlmConfig;
    use crate::testing::{users_snapshot, ScriptedLlm};

    fn test_app(dir: &TempDir, reply: &str) -> Router {
        let mut config = AppConfig::load_with_service(SERVICE_NAME);
        config.metadata_dir = dir.path().to_path_buf();
        MetadataStore::new(dir.path())
            .write("sales", &users_snapshot("sales"))
            .unwrap();
        let state = AppState::with_llm(config, LlmConfig::default(), Arc::new(ScriptedLlm::replying(reply)));
        create_router(state)
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-request-id", "req-42")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_generate_endpoint() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir, "```sql\nSELECT COUNT(*) FROM users;\n```");
        let (status, body) = post_json(
            app,
            "/api/generate",
            serde_json::json!({
                "connection": "sales",
                "question": "how many users?",
                "provider": "openai",
                "model": "gpt-4o"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["sql"], "SELECT COUNT(*) FROM users;");
        assert_eq!(body["data"]["read_only"], true);
        assert_eq!(body["meta"]["request_id"], "req-42");
    }

    #[tokio::test]
    async fn test_generate_unknown_connection() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir, "SELECT 1");
        let (status, body) = post_json(
            app,
            "/api/generate",
            serde_json::json!({
                "connection": "inventory",
                "question": "how many items?",
                "provider": "groq",
                "model": "llama-3.1-8b-instant"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_providers_endpoint() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir, "SELECT 1");
        let response = app
            .oneshot(Request::builder().uri("/api/providers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let providers = body["data"].as_array().unwrap();
        assert_eq!(providers.len(), 4);
        assert_eq!(providers[0]["provider"], "openai");
        assert_eq!(providers[0]["configured"], false);
    }
}
