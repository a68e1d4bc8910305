use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::classifier::RuleConfig;

pub const CONFIG_FILE_NAME: &str = "errsight.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    #[serde(default)]
    pub insights: InsightConfig,

    #[serde(default)]
    pub remediation: RemediationConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Directory the config was loaded from; relative paths resolve against it.
    #[serde(skip)]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Gateway error log to tail. Defaults to `<data_dir>/logs/gateway.err.log`.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    #[serde(default = "default_sync_cron")]
    pub sync_cron: String,

    #[serde(default = "default_max_sync_duration_ms")]
    pub max_sync_duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentsConfig {
    /// Base URL of the agent gateway. Without one no agent is eligible for diagnosis.
    #[serde(default)]
    pub gateway_url: Option<String>,

    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_main_agent")]
    pub main_agent: String,

    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InsightConfig {
    #[serde(default = "default_insight_batch")]
    pub default_batch: usize,

    #[serde(default = "default_insight_max_batch")]
    pub max_batch: usize,

    #[serde(default = "default_ready_ttl_secs")]
    pub ready_ttl_secs: i64,

    #[serde(default = "default_failed_retry_secs")]
    pub failed_retry_secs: i64,

    #[serde(default = "default_pending_stale_secs")]
    pub pending_stale_secs: i64,

    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemediationConfig {
    #[serde(default = "default_owner")]
    pub owner: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_sync_cron() -> String {
    "0 */5 * * * *".to_string()
}
fn default_max_sync_duration_ms() -> u64 {
    10_000
}
fn default_main_agent() -> String {
    "main".to_string()
}
fn default_agent_timeout_secs() -> u64 {
    12
}
fn default_insight_batch() -> usize {
    3
}
fn default_insight_max_batch() -> usize {
    10
}
fn default_ready_ttl_secs() -> i64 {
    6 * 60 * 60
}
fn default_failed_retry_secs() -> i64 {
    15 * 60
}
fn default_pending_stale_secs() -> i64 {
    12
}
fn default_lease_ttl_secs() -> i64 {
    30
}
fn default_owner() -> String {
    "user".to_string()
}
fn default_api_host() -> String {
    "127.0.0.1".to_string()
}
fn default_api_port() -> u16 {
    17990
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            sync_cron: default_sync_cron(),
            max_sync_duration_ms: default_max_sync_duration_ms(),
        }
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            api_token: None,
            main_agent: default_main_agent(),
            timeout_secs: default_agent_timeout_secs(),
        }
    }
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            default_batch: default_insight_batch(),
            max_batch: default_insight_max_batch(),
            ready_ttl_secs: default_ready_ttl_secs(),
            failed_retry_secs: default_failed_retry_secs(),
            pending_stale_secs: default_pending_stale_secs(),
            lease_ttl_secs: default_lease_ttl_secs(),
        }
    }
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            source: SourceConfig::default(),
            store: StoreConfig::default(),
            agents: AgentsConfig::default(),
            insights: InsightConfig::default(),
            remediation: RemediationConfig::default(),
            api: ApiConfig::default(),
            classifier: ClassifierConfig::default(),
            data_dir: PathBuf::new(),
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            info!("No {} found, using defaults.", CONFIG_FILE_NAME);
            return Ok(Self {
                data_dir,
                ..Self::default()
            });
        }
        let content = tokio::fs::read_to_string(&config_path).await?;
        let mut config = Self::from_toml(&content)?;
        config.data_dir = data_dir;
        info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;

        // A batch cap below the default would make the default unreachable.
        config.insights.max_batch = config.insights.max_batch.clamp(1, 10);
        config.insights.default_batch = config
            .insights
            .default_batch
            .clamp(1, config.insights.max_batch);

        Ok(config)
    }

    pub fn log_path(&self) -> PathBuf {
        match &self.source.log_path {
            Some(p) => self.resolve(p),
            None => self.data_dir.join("logs").join("gateway.err.log"),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.store.database_path {
            Some(p) => self.resolve(p),
            None => self.data_dir.join("errsight.db"),
        }
    }

    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level
            .parse::<tracing::Level>()
            .unwrap_or(tracing::Level::INFO)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}
