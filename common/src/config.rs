//! Service configuration.
//!
//! Every service reads the same environment-style settings. A `.env` file in the
//! working directory is loaded first (see [`load_dotenv`]) so connection entries
//! and provider keys can live next to the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of the configuration keys that declare database connections.
pub const CONNECTION_ENV_PREFIX: &str = "HABLADB_CONN_";

/// Application configuration shared by all services.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name used in logs and response metadata.
    pub service_name: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Timeout for opening a database connection (probe and harvest).
    pub connect_timeout_secs: u64,
    /// Timeout applied to each reflection call during a harvest.
    pub harvest_timeout_secs: u64,
    /// Timeout for a single LLM completion.
    pub llm_timeout_secs: u64,
    /// Root directory of the metadata store.
    pub metadata_dir: PathBuf,
    /// Configuration file that registered connections are appended to.
    pub env_file: PathBuf,
    /// Default context budget, in characters.
    pub context_budget_chars: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "habladb".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            connect_timeout_secs: 10,
            harvest_timeout_secs: 30,
            llm_timeout_secs: 60,
            metadata_dir: PathBuf::from("databases"),
            env_file: PathBuf::from(".env"),
            context_budget_chars: 24_000,
        }
    }
}

impl AppConfig {
    /// Loads the configuration from the environment for the given service.
    pub fn load_with_service(service_name: &str) -> Self {
        let defaults = Self::default();
        Self {
            service_name: service_name.to_string(),
            host: std::env::var("SERVER_HOST").unwrap_or(defaults.host),
            port: env_parse("SERVER_PORT").unwrap_or(defaults.port),
            connect_timeout_secs: env_parse("CONNECT_TIMEOUT_SECS")
                .unwrap_or(defaults.connect_timeout_secs),
            harvest_timeout_secs: env_parse("HARVEST_TIMEOUT_SECS")
                .unwrap_or(defaults.harvest_timeout_secs),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS").unwrap_or(defaults.llm_timeout_secs),
            metadata_dir: std::env::var("METADATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.metadata_dir),
            env_file: std::env::var("ENV_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.env_file),
            context_budget_chars: env_parse("CONTEXT_BUDGET_CHARS")
                .unwrap_or(defaults.context_budget_chars),
        }
    }

    /// Loads the `.env` file named by `ENV_FILE` (default `.env`), then the configuration.
    pub fn bootstrap(service_name: &str) -> Self {
        let env_file = std::env::var("ENV_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default().env_file);
        load_dotenv(&env_file);
        Self::load_with_service(service_name)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn harvest_timeout(&self) -> Duration {
        Duration::from_secs(self.harvest_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Loads a `.env` file into the process environment (best-effort, no error if missing).
///
/// Variables already present in the environment win. Values may be wrapped in
/// single or double quotes.
pub fn load_dotenv(path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    for (key, value) in parse_dotenv(&content) {
        if std::env::var(&key).is_err() {
            std::env::set_var(key, value);
        }
    }
}

/// Parses `KEY=value` lines, skipping blanks and `#` comments.
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), unquote(value.trim()).to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv_strips_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# connections\nHABLADB_CONN_sales=\"postgres://u:p@db/sales\"\n\nOPENAI_API_KEY='sk-1'\nPLAIN=value\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("HABLADB_CONN_sales".to_string(), "postgres://u:p@db/sales".to_string()),
                ("OPENAI_API_KEY".to_string(), "sk-1".to_string()),
                ("PLAIN".to_string(), "value".to_string()),
            ]
        );
    }

    #[test]
    fn test_unquote_keeps_unbalanced_values() {
        assert_eq!(unquote("\"abc"), "\"abc");
        assert_eq!(unquote("\""), "\"");
    }
}
