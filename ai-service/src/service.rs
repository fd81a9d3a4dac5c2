//! SQL 生成服务模块
//!
//! 每次提问是一个独立的回合：Idle → ContextLoaded → PromptSent →
//! SqlExtracted | Failed → Idle。回合之间不保留任何状态。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use common::errors::{AppError, AppResult};
use common::metadata_store::MetadataStore;
use common::models::generation::{GenerateRequest, GenerateResponse, Provider};
use common::utils::{IdGenerator, SqlValidator};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::context::assemble;
use crate::extract::extract_sql;
use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::prompt::build_system_prompt;

const NO_METADATA: &str =
    "No database metadata available. Harvest metadata for the active connection first.";

/// 一次生成的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSql {
    pub sql: String,
    pub raw_response: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Idle,
    ContextLoaded,
    PromptSent,
    SqlExtracted,
    Failed,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::Idle => "idle",
            TurnState::ContextLoaded => "context_loaded",
            TurnState::PromptSent => "prompt_sent",
            TurnState::SqlExtracted => "sql_extracted",
            TurnState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 单个提问回合的状态跟踪
struct Turn {
    id: String,
    state: TurnState,
}

impl Turn {
    fn start() -> Self {
        Self {
            id: IdGenerator::request_id(),
            state: TurnState::Idle,
        }
    }

    fn advance(&mut self, next: TurnState) {
        debug!(turn = %self.id, from = %self.state, to = %next, "回合状态变更");
        self.state = next;
    }

    /// 记录结果并回到 Idle
    fn finish<T>(mut self, result: AppResult<T>) -> AppResult<T> {
        let outcome = if result.is_ok() {
            TurnState::SqlExtracted
        } else {
            TurnState::Failed
        };
        self.advance(outcome);
        self.advance(TurnState::Idle);
        result
    }
}

/// 基于元数据上下文生成 SQL
pub struct SqlGenerator {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// 根据问题与元数据上下文生成单条 SQL 语句（不执行）
    pub async fn generate_sql(
        &self,
        question: &str,
        context: &str,
        dialect: &str,
        provider: Provider,
        model: &str,
    ) -> AppResult<GeneratedSql> {
        let mut turn = Turn::start();
        let result = self
            .run(&mut turn, question, context, dialect, provider, model)
            .await;
        if let Err(e) = &result {
            warn!(turn = %turn.id, provider = %provider, error = %e, "SQL 生成失败");
        }
        turn.finish(result)
    }

    async fn run(
        &self,
        turn: &mut Turn,
        question: &str,
        context: &str,
        dialect: &str,
        provider: Provider,
        model: &str,
    ) -> AppResult<GeneratedSql> {
        let question = question.trim();
        let model = model.trim();
        if question.is_empty() {
            return Err(AppError::InvalidRequest("question must not be empty".into()));
        }
        if model.is_empty() {
            return Err(AppError::InvalidRequest("no model selected".into()));
        }
        if context.trim().is_empty() {
            return Err(AppError::InvalidRequest(NO_METADATA.into()));
        }
        turn.advance(TurnState::ContextLoaded);

        let system = build_system_prompt(dialect, context);
        let request = CompletionRequest {
            provider,
            model,
            system: &system,
            user: question,
        };
        turn.advance(TurnState::PromptSent);

        let raw = match tokio::time::timeout(self.timeout, self.llm.complete(&request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(LlmError::Timeout)) | Err(_) => {
                return Err(AppError::GenerationTimeout(self.timeout))
            }
            Ok(Err(e)) => return Err(AppError::Generation(e.to_string())),
        };
        if raw.trim().is_empty() {
            return Err(AppError::Generation(format!(
                "{} returned an empty response",
                provider
            )));
        }

        let sql = extract_sql(&raw)?;
        let read_only = SqlValidator::is_read_only(&sql);
        Ok(GeneratedSql {
            sql,
            raw_response: raw,
            read_only,
        })
    }
}

/// 生成接口编排：读取元数据、组装上下文、调用生成器
pub struct GenerationService {
    store: Arc<MetadataStore>,
    generator: Arc<SqlGenerator>,
    default_budget: usize,
}

impl GenerationService {
    pub fn new(store: Arc<MetadataStore>, generator: Arc<SqlGenerator>, default_budget: usize) -> Self {
        Self {
            store,
            generator,
            default_budget,
        }
    }

    pub async fn generate(&self, req: GenerateRequest) -> AppResult<GenerateResponse> {
        req.validate()?;
        let snapshot = self.store.read(&req.connection)?;
        let budget = req.budget.unwrap_or(self.default_budget);
        let context = assemble(&snapshot, budget);
        if context.truncated {
            info!(
                connection = %req.connection,
                budget,
                tables_included = context.tables_included,
                tables_total = context.tables_total,
                "元数据上下文已截断"
            );
        }

        let generated = self
            .generator
            .generate_sql(&req.question, &context.text, &snapshot.dialect, req.provider, &req.model)
            .await?;

        info!(
            connection = %req.connection,
            provider = %req.provider,
            model = %req.model,
            read_only = generated.read_only,
            "SQL 已生成"
        );
        Ok(GenerateResponse {
            sql: generated.sql,
            raw_response: generated.raw_response,
            read_only: generated.read_only,
            dialect: snapshot.dialect,
            context_chars: context.chars(),
            tables_included: context.tables_included,
            tables_total: context.tables_total,
            truncated: context.truncated,
        })
    }
}
