//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or the path passed with `-f`), then applies `HELPBOT_BASE_DIR` and
//! `HELPBOT_LOG_LEVEL` env overrides. Relative paths in `[paths]` and the
//! log file are resolved against `base_dir`.

use std::{
    env,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Filesystem locations the assistant reads from and writes to.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Source documents scanned by the "Load Context" action.
    pub doc_dir: PathBuf,
    /// Where the built index is persisted.
    pub persist_dir: PathBuf,
    /// Where rotated log archives accumulate.
    pub archive_dir: PathBuf,
}

/// Log maintenance settings.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Rotation threshold in KB (sizes are rounded up to whole KB).
    pub max_log_size_kb: u64,
    /// Periodic rotation check interval. `0` disables the tick; rotation
    /// still runs at startup and shutdown.
    pub check_interval_secs: u64,
}

/// Session registry limits.
#[derive(Debug, Clone)]
pub struct SessionsConfig {
    /// Live sessions kept before the least recently used is dropped.
    pub max_sessions: usize,
    /// Seconds without activity after which a session is dropped.
    pub idle_timeout_secs: u64,
}

/// Axum HTTP channel configuration.
#[derive(Debug, Clone)]
pub struct AxumChannelConfig {
    /// Socket address to bind the HTTP channel to.
    pub bind: String,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub axum: AxumChannelConfig,
}

/// Retrieval tuning.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Passages forwarded to the LLM per question.
    pub top_k: usize,
    /// Chunk size in bytes used when building the index.
    pub chunk_size: usize,
}

/// OpenAI / OpenAI-compatible provider configuration.
/// Populated from `[llm.openai]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature (ignored for models that forbid it).
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"`, `"openai"`).
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    /// Base directory for relative paths (already expanded, no `~`).
    pub base_dir: PathBuf,
    pub log_level: String,
    /// Live log file. `None` logs to stderr and disables rotation.
    pub log_file: Option<PathBuf>,
    pub paths: PathsConfig,
    pub maintenance: MaintenanceConfig,
    pub sessions: SessionsConfig,
    pub comms: CommsConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    /// API key from `LLM_API_KEY` env var; `None` for keyless local models.
    /// Never sourced from TOML.
    pub llm_api_key: Option<String>,
}

/// Raw TOML shape, the `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    supervisor: RawSupervisor,
    #[serde(default)]
    paths: RawPaths,
    #[serde(default)]
    maintenance: RawMaintenance,
    #[serde(default)]
    sessions: RawSessions,
    #[serde(default)]
    comms: RawComms,
    #[serde(default)]
    retrieval: RawRetrieval,
    #[serde(default)]
    llm: RawLlm,
}

#[derive(Deserialize)]
struct RawSupervisor {
    bot_name: String,
    #[serde(default = "default_base_dir")]
    base_dir: String,
    log_level: String,
    /// Empty string disables file logging.
    #[serde(default = "default_log_file")]
    log_file: String,
}

#[derive(Deserialize)]
struct RawPaths {
    #[serde(default = "default_doc_dir")]
    doc_dir: String,
    #[serde(default = "default_persist_dir")]
    persist_dir: String,
    #[serde(default = "default_archive_dir")]
    archive_dir: String,
}

impl Default for RawPaths {
    fn default() -> Self {
        Self {
            doc_dir: default_doc_dir(),
            persist_dir: default_persist_dir(),
            archive_dir: default_archive_dir(),
        }
    }
}

#[derive(Deserialize)]
struct RawMaintenance {
    #[serde(default = "default_max_log_size_kb")]
    max_log_size_kb: u64,
    #[serde(default)]
    check_interval_secs: u64,
}

impl Default for RawMaintenance {
    fn default() -> Self {
        Self { max_log_size_kb: default_max_log_size_kb(), check_interval_secs: 0 }
    }
}

#[derive(Deserialize)]
struct RawSessions {
    #[serde(default = "default_max_sessions")]
    max_sessions: usize,
    #[serde(default = "default_idle_timeout_secs")]
    idle_timeout_secs: u64,
}

impl Default for RawSessions {
    fn default() -> Self {
        Self { max_sessions: default_max_sessions(), idle_timeout_secs: default_idle_timeout_secs() }
    }
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    axum: RawAxum,
}

#[derive(Deserialize)]
struct RawAxum {
    #[serde(default = "default_http_bind")]
    bind: String,
}

impl Default for RawAxum {
    fn default() -> Self {
        Self { bind: default_http_bind() }
    }
}

#[derive(Deserialize)]
struct RawRetrieval {
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
}

impl Default for RawRetrieval {
    fn default() -> Self {
        Self { top_k: default_top_k(), chunk_size: default_chunk_size() }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), openai: RawOpenAiConfig::default() }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default)]
    temperature: f32,
    #[serde(default = "default_openai_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: 0.0,
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

fn default_base_dir() -> String { ".".to_string() }
fn default_log_file() -> String { "app.log".to_string() }
fn default_doc_dir() -> String { "data".to_string() }
fn default_persist_dir() -> String { "storage".to_string() }
fn default_archive_dir() -> String { "archives".to_string() }
fn default_max_log_size_kb() -> u64 { 100 }
fn default_max_sessions() -> usize { 1000 }
fn default_idle_timeout_secs() -> u64 { 3600 }
fn default_http_bind() -> String { "127.0.0.1:8080".to_string() }
fn default_top_k() -> usize { 4 }
fn default_chunk_size() -> usize { 1024 }
fn default_llm_provider() -> String { "dummy".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_openai_timeout_seconds() -> u64 { 60 }

/// Load config from `path` (or `config/default.toml`), then apply env-var overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let base_dir_override = env::var("HELPBOT_BASE_DIR").ok();
    let log_level_override = env::var("HELPBOT_LOG_LEVEL").ok();
    let mut config = load_from(
        Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH)),
        base_dir_override.as_deref(),
        log_level_override.as_deref(),
    )?;
    config.llm_api_key = env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
    Ok(config)
}

/// Internal loader. Accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    base_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let s = parsed.supervisor;

    let base_dir = expand_home(base_dir_override.unwrap_or(&s.base_dir));
    let log_level = log_level_override.unwrap_or(&s.log_level).to_string();
    let log_file = if s.log_file.trim().is_empty() {
        None
    } else {
        Some(resolve(&base_dir, &s.log_file))
    };

    if parsed.retrieval.chunk_size == 0 {
        return Err(AppError::Config("retrieval.chunk_size must be > 0".into()));
    }
    if parsed.sessions.max_sessions == 0 {
        return Err(AppError::Config("sessions.max_sessions must be > 0".into()));
    }
    if parsed.retrieval.top_k == 0 {
        return Err(AppError::Config("retrieval.top_k must be > 0".into()));
    }

    Ok(Config {
        bot_name: s.bot_name,
        log_level,
        log_file,
        paths: PathsConfig {
            doc_dir: resolve(&base_dir, &parsed.paths.doc_dir),
            persist_dir: resolve(&base_dir, &parsed.paths.persist_dir),
            archive_dir: resolve(&base_dir, &parsed.paths.archive_dir),
        },
        base_dir,
        maintenance: MaintenanceConfig {
            max_log_size_kb: parsed.maintenance.max_log_size_kb,
            check_interval_secs: parsed.maintenance.check_interval_secs,
        },
        sessions: SessionsConfig {
            max_sessions: parsed.sessions.max_sessions,
            idle_timeout_secs: parsed.sessions.idle_timeout_secs,
        },
        comms: CommsConfig {
            axum: AxumChannelConfig { bind: parsed.comms.axum.bind },
        },
        retrieval: RetrievalConfig {
            top_k: parsed.retrieval.top_k,
            chunk_size: parsed.retrieval.chunk_size,
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: parsed.llm.openai.model,
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        llm_api_key: None,
    })
}

/// Join `path` onto `base` unless it is already absolute (or `~`-prefixed).
fn resolve(base: &Path, path: &str) -> PathBuf {
    let expanded = expand_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// Self-contained `Config` rooted at `base_dir`: dummy LLM, no API keys,
    /// no external calls. Used by tests and embedders.
    pub fn test_default(base_dir: &Path) -> Self {
        Self {
            bot_name: "test".into(),
            base_dir: base_dir.to_path_buf(),
            log_level: "info".into(),
            log_file: None,
            paths: PathsConfig {
                doc_dir: base_dir.join(default_doc_dir()),
                persist_dir: base_dir.join(default_persist_dir()),
                archive_dir: base_dir.join(default_archive_dir()),
            },
            maintenance: MaintenanceConfig {
                max_log_size_kb: default_max_log_size_kb(),
                check_interval_secs: 0,
            },
            sessions: SessionsConfig {
                max_sessions: default_max_sessions(),
                idle_timeout_secs: default_idle_timeout_secs(),
            },
            comms: CommsConfig {
                axum: AxumChannelConfig { bind: default_http_bind() },
            },
            retrieval: RetrievalConfig {
                top_k: default_top_k(),
                chunk_size: default_chunk_size(),
            },
            llm: LlmConfig {
                provider: "dummy".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
            },
            llm_api_key: None,
        }
    }
}
