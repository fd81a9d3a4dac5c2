//! Handler模块

use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use common::errors::AppError;
use common::middleware::request_id::RequestId;
use common::models::generation::{GenerateRequest, GenerateResponse, Provider, ProviderModels};
use common::response::ApiResponse;
use crate::state::AppState;

const SERVICE: &str = "ai-service";

/// 根据自然语言问题生成 SQL（不执行）
#[utoipa::path(
    post,
    path = "/api/generate",
    tag = "generation",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "生成的 SQL", body = ApiResponse<GenerateResponse>),
        (status = 400, description = "请求无效或上下文为空"),
        (status = 404, description = "尚未采集元数据"),
        (status = 422, description = "模型输出中没有 SQL"),
        (status = 502, description = "LLM 调用失败"),
        (status = 504, description = "LLM 调用超时")
    )
)]
pub async fn generate_sql(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<ApiResponse<GenerateResponse>>, AppError> {
    let started = std::time::Instant::now();
    let data = state.generation_service().generate(req).await?;
    Ok(Json(
        ApiResponse::ok_with_service(data, SERVICE)
            .with_duration(started.elapsed().as_millis() as u64)
            .with_request_id(request_id.as_str()),
    ))
}

/// 列出支持的 LLM 服务商及推荐模型
#[utoipa::path(
    get,
    path = "/api/providers",
    tag = "generation",
    responses(
        (status = 200, description = "服务商列表", body = ApiResponse<Vec<ProviderModels>>)
    )
)]
pub async fn list_providers(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<ProviderModels>>> {
    let data = Provider::ALL
        .into_iter()
        .map(|provider| ProviderModels {
            provider,
            models: provider
                .suggested_models()
                .iter()
                .map(|m| m.to_string())
                .collect(),
            configured: state.llm_config.is_configured(provider),
        })
        .collect();
    Json(ApiResponse::ok_with_service(data, SERVICE))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        metadata_dir: state.metadata.root().display().to_string(),
    })
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 元数据目录
    pub metadata_dir: String,
}
