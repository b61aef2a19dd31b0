use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration, loaded once at startup and handed to each component.
#[derive(Clone, Debug)]
pub struct Config {
    pub slack: SlackConfig,
    pub classifier: ClassifierConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub extraction: ExtractionConfig,
}

/// Slack Web API access + pacing.
#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: String,
    pub api_base: String,
    /// Fixed delay inserted before every page request.
    pub page_delay: Duration,
    pub max_rate_limit_retries: u32,
    /// Used when a rate-limited response carries no `Retry-After`.
    pub default_retry_after: Duration,
    pub min_channel_members: u32,
    pub request_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ClassifierConfig {
    /// `None` disables the remote classifier; every message goes through the rule-based path.
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

impl StoreConfig {
    pub fn knowledge_file(&self) -> PathBuf {
        self.data_dir.join("knowledge.json")
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid bind address {}:{}: {e}", self.host, self.port)))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ExtractionConfig {
    pub min_confidence: f64,
    pub default_days_back: u32,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: "https://slack.com/api".to_string(),
            page_delay: Duration::from_millis(1000),
            max_rate_limit_retries: 3,
            default_retry_after: Duration::from_secs(30),
            min_channel_members: 3,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.anthropic.com".to_string(),
            model: "claude-3-sonnet-20240229".to_string(),
            max_tokens: 1000,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            default_days_back: 30,
        }
    }
}

impl Config {
    /// Load from `.env` (if present) and the process environment.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let slack_defaults = SlackConfig::default();
        let bot_token = env_str("SLACK_BOT_TOKEN")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("SLACK_BOT_TOKEN environment variable is required".to_string())
            })?;

        let slack = SlackConfig {
            bot_token,
            api_base: env_str("SLACK_API_BASE")
                .and_then(non_empty)
                .unwrap_or(slack_defaults.api_base),
            page_delay: env_u64("RATE_LIMIT_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(slack_defaults.page_delay),
            max_rate_limit_retries: env_u32("RATE_LIMIT_MAX_RETRIES")
                .unwrap_or(slack_defaults.max_rate_limit_retries),
            default_retry_after: env_u64("RATE_LIMIT_DEFAULT_RETRY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(slack_defaults.default_retry_after),
            min_channel_members: env_u32("MIN_CHANNEL_MEMBERS")
                .unwrap_or(slack_defaults.min_channel_members),
            request_timeout: env_u64("SLACK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(slack_defaults.request_timeout),
        };

        let classifier_defaults = ClassifierConfig::default();
        let classifier = ClassifierConfig {
            api_key: env_str("CLAUDE_API_KEY")
                .and_then(non_empty)
                .or_else(|| env_str("ANTHROPIC_API_KEY").and_then(non_empty)),
            api_base: env_str("CLAUDE_API_BASE")
                .and_then(non_empty)
                .unwrap_or(classifier_defaults.api_base),
            model: env_str("CLAUDE_MODEL")
                .and_then(non_empty)
                .unwrap_or(classifier_defaults.model),
            max_tokens: env_u32("CLAUDE_MAX_TOKENS").unwrap_or(classifier_defaults.max_tokens),
            timeout: env_u64("CLAUDE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(classifier_defaults.timeout),
        };

        let store = StoreConfig {
            data_dir: env_path("DATA_DIR").unwrap_or_else(|| StoreConfig::default().data_dir),
        };

        let server_defaults = ServerConfig::default();
        let port = match env_str("PORT").and_then(non_empty) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("PORT must be a valid port number, got {raw:?}")))?,
            None => server_defaults.port,
        };
        let server = ServerConfig {
            host: env_str("HOST")
                .and_then(non_empty)
                .unwrap_or(server_defaults.host),
            port,
        };

        let extraction_defaults = ExtractionConfig::default();
        let extraction = ExtractionConfig {
            min_confidence: env_f64("MIN_CONFIDENCE")
                .map(|v| v.clamp(0.0, 1.0))
                .unwrap_or(extraction_defaults.min_confidence),
            default_days_back: env_u32("DEFAULT_DAYS_BACK")
                .map(|v| v.clamp(1, 90))
                .unwrap_or(extraction_defaults.default_days_back),
        };

        Ok(Self {
            slack,
            classifier,
            store,
            server,
            extraction,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env_str(key)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
