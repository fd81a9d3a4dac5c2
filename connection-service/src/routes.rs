//! 连接服务路由模块

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{
    create_connection, get_connection, get_metadata, get_metadata_status, harvest_connection,
    health_check, list_connections, test_connection, validate_connection,
};
use crate::state::AppState;

/// 创建连接管理路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/connections", get(list_connections).post(create_connection))
        .route("/api/connections/validate", post(validate_connection))
        .route("/api/connections/{name}", get(get_connection))
        .route("/api/connections/{name}/test", get(test_connection))
        .route("/api/connections/{name}/harvest", post(harvest_connection))
        .route("/api/connections/{name}/metadata", get(get_metadata))
        .route("/api/connections/{name}/metadata/status", get(get_metadata_status))
        .route("/api/health", get(health_check))
}
