//! 连接配置存储
//!
//! 连接以 `HABLADB_CONN_<name>=<descriptor>` 形式保存在环境变量中，
//! 新注册的连接追加写入配置文件（默认 `.env`），并在当前进程内立即可见。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::RwLock;

use common::errors::{AppError, AppResult};

/// 连接配置的持久化接口
pub trait ConfigStore: Send + Sync {
    /// 返回所有 `(name, descriptor)` 条目：环境中的条目按名称排序在前，本进程新增的在后
    fn entries(&self) -> AppResult<Vec<(String, String)>>;

    /// 持久化一条新连接
    fn persist(&self, name: &str, descriptor: &str) -> AppResult<()>;
}

/// 基于进程环境和 `.env` 文件的配置存储
pub struct EnvConfigStore {
    prefix: String,
    env_file: PathBuf,
    added: RwLock<Vec<(String, String)>>,
}

impl EnvConfigStore {
    pub fn new(prefix: impl Into<String>, env_file: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            env_file: env_file.into(),
            added: RwLock::new(Vec::new()),
        }
    }

    /// 从给定的变量集合中提取连接条目
    fn entries_from(&self, vars: impl Iterator<Item = (String, String)>) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = vars
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(&self.prefix)?.trim();
                let descriptor = value.trim();
                if name.is_empty() || descriptor.is_empty() {
                    None
                } else {
                    Some((name.to_string(), descriptor.to_string()))
                }
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let added = self.added.read().unwrap_or_else(|e| e.into_inner());
        for (name, descriptor) in added.iter() {
            if !entries.iter().any(|(n, _)| n == name) {
                entries.push((name.clone(), descriptor.clone()));
            }
        }
        entries
    }
}

impl ConfigStore for EnvConfigStore {
    fn entries(&self) -> AppResult<Vec<(String, String)>> {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
        Ok(self.entries_from(vars))
    }

    fn persist(&self, name: &str, descriptor: &str) -> AppResult<()> {
        let needs_newline = std::fs::read(&self.env_file)
            .map(|bytes| bytes.last().is_some_and(|b| *b != b'\n'))
            .unwrap_or(false);
        let mut line = String::new();
        if needs_newline {
            line.push('\n');
        }
        line.push_str(&format!("{}{}=\"{}\"\n", self.prefix, name, descriptor));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.env_file)
            .map_err(|e| store_error(&self.env_file, e))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| store_error(&self.env_file, e))?;

        self.added
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string(), descriptor.to_string()));
        tracing::info!(connection = %name, file = %self.env_file.display(), "连接配置已写入");
        Ok(())
    }
}

fn store_error(path: &std::path::Path, e: std::io::Error) -> AppError {
    AppError::ConfigStore(format!("failed to write {}: {}", path.display(), e))
}

/// 内存配置存储（测试用）
#[cfg(test)]
#[derive(Default)]
pub struct InMemoryConfigStore {
    entries: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl InMemoryConfigStore {
    pub fn with_entries(entries: &[(&str, &str)]) -> Self {
        Self {
            entries: std::sync::Mutex::new(
                entries
                    .iter()
                    .map(|(n, d)| (n.to_string(), d.to_string()))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
impl ConfigStore for InMemoryConfigStore {
    fn entries(&self) -> AppResult<Vec<(String, String)>> {
        Ok(self.entries.lock().unwrap().clone())
    }

    fn persist(&self, name: &str, descriptor: &str) -> AppResult<()> {
        self.entries
            .lock()
            .unwrap()
            .push((name.to_string(), descriptor.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::parse_dotenv;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> impl Iterator<Item = (String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_entries_filter_prefix_and_sort() {
        let store = EnvConfigStore::new("HABLADB_CONN_", "/nonexistent/.env");
        let entries = store.entries_from(vars(&[
            ("HABLADB_CONN_zeta", "postgres://h/z"),
            ("PATH", "/usr/bin"),
            ("HABLADB_CONN_alpha", " duckdb:///:memory: "),
            ("HABLADB_CONN_", "postgres://h/none"),
            ("HABLADB_CONN_empty", ""),
        ]));
        assert_eq!(
            entries,
            vec![
                ("alpha".to_string(), "duckdb:///:memory:".to_string()),
                ("zeta".to_string(), "postgres://h/z".to_string()),
            ]
        );
    }

    #[test]
    fn test_persist_appends_and_is_visible() {
        let dir = TempDir::new().unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(&env_file, "OPENAI_API_KEY=sk-test").unwrap();

        let prefix = "HABLADB_STORE_TEST_";
        let store = EnvConfigStore::new(prefix, &env_file);
        store.persist("analytics", "postgres://u:p@h/db").unwrap();

        let content = std::fs::read_to_string(&env_file).unwrap();
        let parsed = parse_dotenv(&content);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, "OPENAI_API_KEY");
        assert_eq!(
            parsed[1],
            (
                "HABLADB_STORE_TEST_analytics".to_string(),
                "postgres://u:p@h/db".to_string()
            )
        );

        let entries = store.entries().unwrap();
        assert_eq!(
            entries,
            vec![("analytics".to_string(), "postgres://u:p@h/db".to_string())]
        );
    }

    #[test]
    fn test_environment_entry_shadows_added_entry() {
        let dir = TempDir::new().unwrap();
        let store = EnvConfigStore::new("HABLADB_CONN_", dir.path().join(".env"));
        store.persist("main_db", "postgres://h/new").unwrap();
        let entries = store.entries_from(vars(&[("HABLADB_CONN_main_db", "postgres://h/env")]));
        assert_eq!(entries, vec![("main_db".to_string(), "postgres://h/env".to_string())]);
    }
}
