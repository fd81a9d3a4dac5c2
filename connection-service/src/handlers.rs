//! Handler模块

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use common::errors::{AppError, AppResult};
use common::middleware::request_id::RequestId;
use common::models::connection::{
    ConnectionItem, CreateConnectionRequest, ProbeFailure, ValidateConnectionRequest,
};
use common::models::metadata::{HarvestSummary, MetadataSnapshot, MetadataStatus};
use common::response::ApiResponse;
use crate::service::{ConnectionService, ConnectionServiceTrait};
use crate::state::AppState;

const SERVICE: &str = "connection-service";

/// 列出所有已配置的数据库连接
#[utoipa::path(
    get,
    path = "/api/connections",
    tag = "connections",
    responses(
        (status = 200, description = "连接列表", body = ApiResponse<Vec<ConnectionItem>>)
    )
)]
pub async fn list_connections(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ConnectionItem>>>, AppError> {
    let service = ConnectionService::from(&state);
    let data = service.list().await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE)))
}

/// 校验并注册新的数据库连接
#[utoipa::path(
    post,
    path = "/api/connections",
    tag = "connections",
    request_body = CreateConnectionRequest,
    responses(
        (status = 200, description = "连接已注册", body = ApiResponse<ConnectionItem>),
        (status = 409, description = "连接名称已存在"),
        (status = 422, description = "连接校验失败")
    )
)]
pub async fn create_connection(
    State(state): State<AppState>,
    Json(req): Json<CreateConnectionRequest>,
) -> Result<Json<ApiResponse<ConnectionItem>>, AppError> {
    let service = ConnectionService::from(&state);
    let data = service.create(req).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE)))
}

/// 探测连接描述符（不保存）
#[utoipa::path(
    post,
    path = "/api/connections/validate",
    tag = "connections",
    request_body = ValidateConnectionRequest,
    responses(
        (status = 200, description = "探测结果", body = ApiResponse<ProbeReport>)
    )
)]
pub async fn validate_connection(
    State(state): State<AppState>,
    Json(req): Json<ValidateConnectionRequest>,
) -> Result<Json<ApiResponse<ProbeReport>>, AppError> {
    let service = ConnectionService::from(&state);
    let report = ProbeReport::from_outcome(None, service.validate(req).await)?;
    Ok(Json(ApiResponse::ok_with_service(report, SERVICE)))
}

/// 根据名称获取连接
#[utoipa::path(
    get,
    path = "/api/connections/{name}",
    tag = "connections",
    params(
        ("name" = String, Path, description = "连接名称")
    ),
    responses(
        (status = 200, description = "连接详情", body = ApiResponse<ConnectionItem>),
        (status = 404, description = "连接未找到")
    )
)]
pub async fn get_connection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<ConnectionItem>>, AppError> {
    let service = ConnectionService::from(&state);
    let data = service.get(&name).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE)))
}

/// 测试已保存的数据库连接
#[utoipa::path(
    get,
    path = "/api/connections/{name}/test",
    tag = "connections",
    params(
        ("name" = String, Path, description = "连接名称")
    ),
    responses(
        (status = 200, description = "连接测试结果", body = ApiResponse<ProbeReport>),
        (status = 404, description = "连接未找到")
    )
)]
pub async fn test_connection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<ProbeReport>>, AppError> {
    let service = ConnectionService::from(&state);
    let outcome = service.test(&name).await;
    let report = ProbeReport::from_outcome(Some(name), outcome)?;
    Ok(Json(ApiResponse::ok_with_service(report, SERVICE)))
}

/// 采集连接的元数据并写入元数据存储
#[utoipa::path(
    post,
    path = "/api/connections/{name}/harvest",
    tag = "metadata",
    params(
        ("name" = String, Path, description = "连接名称")
    ),
    responses(
        (status = 200, description = "采集完成", body = ApiResponse<HarvestSummary>),
        (status = 404, description = "连接未找到"),
        (status = 409, description = "该连接正在采集"),
        (status = 502, description = "采集失败"),
        (status = 504, description = "采集超时")
    )
)]
pub async fn harvest_connection(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<HarvestSummary>>, AppError> {
    let started = std::time::Instant::now();
    let service = ConnectionService::from(&state);
    let data = service.harvest(&name).await?;
    Ok(Json(
        ApiResponse::ok_with_service(data, SERVICE)
            .with_duration(started.elapsed().as_millis() as u64)
            .with_request_id(request_id.as_str()),
    ))
}

/// 读取已采集的元数据快照
#[utoipa::path(
    get,
    path = "/api/connections/{name}/metadata",
    tag = "metadata",
    params(
        ("name" = String, Path, description = "连接名称")
    ),
    responses(
        (status = 200, description = "元数据快照", body = ApiResponse<MetadataSnapshot>),
        (status = 404, description = "尚未采集元数据")
    )
)]
pub async fn get_metadata(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<MetadataSnapshot>>, AppError> {
    let service = ConnectionService::from(&state);
    let data = service.metadata(&name).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE)))
}

/// 查询连接是否已采集元数据
#[utoipa::path(
    get,
    path = "/api/connections/{name}/metadata/status",
    tag = "metadata",
    params(
        ("name" = String, Path, description = "连接名称")
    ),
    responses(
        (status = 200, description = "采集状态", body = ApiResponse<MetadataStatus>)
    )
)]
pub async fn get_metadata_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<MetadataStatus>>, AppError> {
    let service = ConnectionService::from(&state);
    let data = service.metadata_status(&name).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE)))
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
    let discovered = state.registry.discover().map(|c| c.len());
    Json(HealthResponse::from_discovery(&state.config.service_name, discovered))
}

/// 连接探测结果
#[derive(Debug, Serialize, ToSchema)]
pub struct ProbeReport {
    /// 连接名称（仅测试已保存连接时存在）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 探测是否成功
    pub success: bool,
    /// 往返延迟（毫秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// 失败分类
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ProbeFailure>,
    /// 错误信息（如果探测失败）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeReport {
    /// 探测失败记为结果；其他错误（如连接不存在）继续向上返回
    fn from_outcome(name: Option<String>, outcome: Result<u64, AppError>) -> Result<Self, AppError> {
        match outcome {
            Ok(latency_ms) => Ok(Self {
                name,
                success: true,
                latency_ms: Some(latency_ms),
                failure: None,
                error: None,
            }),
            Err(AppError::ConnectionValidation { kind, message }) => Ok(Self {
                name,
                success: false,
                latency_ms: None,
                failure: Some(kind),
                error: Some(message),
            }),
            Err(e) => Err(e),
        }
    }
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
    /// 已配置的连接数
    pub connections: usize,
    /// 读取连接配置失败时的错误信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    /// 连接配置无法读取时服务状态为 degraded
    fn from_discovery(service: &str, discovered: AppResult<usize>) -> Self {
        let (status, connections, error) = match discovered {
            Ok(count) => ("healthy", count, None),
            Err(e) => {
                tracing::warn!(error = %e, "健康检查时读取连接配置失败");
                ("degraded", 0, Some(e.to_string()))
            }
        };
        Self {
            status: status.to_string(),
            service: service.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            connections,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_failure_becomes_report() {
        let report = ProbeReport::from_outcome(
            Some("sales".into()),
            Err(AppError::ConnectionValidation {
                kind: ProbeFailure::AuthFailed,
                message: "password rejected".into(),
            }),
        )
        .unwrap();
        assert!(!report.success);
        assert_eq!(report.failure, Some(ProbeFailure::AuthFailed));

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["failure"], "auth-failed");
        assert!(value.get("latency_ms").is_none());
    }

    #[test]
    fn test_health_reports_config_failure() {
        let ok = HealthResponse::from_discovery("connection-service", Ok(2));
        assert_eq!((ok.status.as_str(), ok.connections), ("healthy", 2));
        assert!(ok.error.is_none());

        let degraded = HealthResponse::from_discovery(
            "connection-service",
            Err(AppError::ConfigStore("env file unreadable".into())),
        );
        assert_eq!(degraded.status, "degraded");
        let value = serde_json::to_value(&degraded).unwrap();
        assert!(value["error"].as_str().unwrap().contains("env file unreadable"));
    }

    #[test]
    fn test_not_found_propagates() {
        let err = ProbeReport::from_outcome(None, Err(AppError::ConnectionNotFound("x".into())))
            .unwrap_err();
        assert!(matches!(err, AppError::ConnectionNotFound(_)));
    }
}
