//! AI 服务路由模块

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{generate_sql, health_check, list_providers};
use crate::state::AppState;

/// 创建 SQL 生成路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/generate", post(generate_sql))
        .route("/api/providers", get(list_providers))
        .route("/api/health", get(health_check))
}
