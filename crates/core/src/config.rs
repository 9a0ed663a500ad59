use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub smtp: SmtpConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub use_tls: bool,
    pub mock_mode: bool,
    pub from_address: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub supplier_email: String,
    pub reply_to: Option<String>,
    pub competitor_count: usize,
    pub price_tolerance_pct: u32,
    pub max_discount_pct: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub smtp_mock_mode: Option<bool>,
    pub supplier_email: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
    #[error("missing llm credential: {0}")]
    MissingCredential(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig { url: "sqlite://data/erp.db".to_string(), timeout_secs: 30 },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: None,
                timeout_secs: 120,
            },
            smtp: SmtpConfig {
                host: "smtp.example.com".to_string(),
                port: 587,
                username: String::new(),
                password: String::new().into(),
                use_tls: true,
                mock_mode: true,
                from_address: None,
                timeout_secs: 30,
            },
            pipeline: PipelineConfig {
                supplier_email: "supplier@example.com".to_string(),
                reply_to: None,
                competitor_count: 3,
                price_tolerance_pct: 5,
                max_discount_pct: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::Anthropic => "claude-3-5-sonnet-20241022",
            Self::Ollama => "llama3.1",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Ollama => "http://localhost:11434",
        }
    }

    /// Provider-native variable consulted when no stockpilot-scoped key is set.
    pub fn native_key_var(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama => None,
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.provider.default_model())
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or_else(|| self.provider.default_base_url())
    }

    /// Checked before a pipeline run rather than at load time, so store-only
    /// commands keep working without a provider key.
    pub fn ensure_credentials(&self) -> Result<(), ConfigError> {
        match self.provider {
            LlmProvider::OpenAi | LlmProvider::Anthropic => {
                let missing = self
                    .api_key
                    .as_ref()
                    .map(|value| value.expose_secret().trim().is_empty())
                    .unwrap_or(true);
                if missing {
                    let var = self.provider.native_key_var().unwrap_or("STOCKPILOT_LLM_API_KEY");
                    return Err(ConfigError::MissingCredential(format!(
                        "{var} (or STOCKPILOT_LLM_API_KEY) is required when llm.provider = {}",
                        self.provider.as_str()
                    )));
                }
            }
            LlmProvider::Ollama => {}
        }
        Ok(())
    }
}

impl SmtpConfig {
    pub fn sender_address(&self) -> &str {
        match self.from_address.as_deref() {
            Some(address) if !address.trim().is_empty() => address,
            _ if !self.username.trim().is_empty() => &self.username,
            _ => "noreply@orchestrator.local",
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("stockpilot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = Some(model);
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(smtp) = patch.smtp {
            if let Some(host) = smtp.host {
                self.smtp.host = host;
            }
            if let Some(port) = smtp.port {
                self.smtp.port = port;
            }
            if let Some(username) = smtp.username {
                self.smtp.username = username;
            }
            if let Some(password) = smtp.password {
                self.smtp.password = secret_value(password);
            }
            if let Some(use_tls) = smtp.use_tls {
                self.smtp.use_tls = use_tls;
            }
            if let Some(mock_mode) = smtp.mock_mode {
                self.smtp.mock_mode = mock_mode;
            }
            if let Some(from_address) = smtp.from_address {
                self.smtp.from_address = Some(from_address);
            }
            if let Some(timeout_secs) = smtp.timeout_secs {
                self.smtp.timeout_secs = timeout_secs;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(supplier_email) = pipeline.supplier_email {
                self.pipeline.supplier_email = supplier_email;
            }
            if let Some(reply_to) = pipeline.reply_to {
                self.pipeline.reply_to = Some(reply_to);
            }
            if let Some(competitor_count) = pipeline.competitor_count {
                self.pipeline.competitor_count = competitor_count;
            }
            if let Some(price_tolerance_pct) = pipeline.price_tolerance_pct {
                self.pipeline.price_tolerance_pct = price_tolerance_pct;
            }
            if let Some(max_discount_pct) = pipeline.max_discount_pct {
                self.pipeline.max_discount_pct = max_discount_pct;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STOCKPILOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("STOCKPILOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("STOCKPILOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let provider = read_env("STOCKPILOT_LLM_PROVIDER").or_else(|| read_env("LLM_PROVIDER"));
        if let Some(value) = provider {
            self.llm.provider = value.parse()?;
        }
        let api_key = read_env("STOCKPILOT_LLM_API_KEY")
            .or_else(|| self.llm.provider.native_key_var().and_then(read_env));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("STOCKPILOT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("STOCKPILOT_LLM_MODEL") {
            self.llm.model = Some(value);
        }
        if let Some(value) = read_env("STOCKPILOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("STOCKPILOT_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STOCKPILOT_SMTP_HOST") {
            self.smtp.host = value;
        }
        if let Some(value) = read_env("STOCKPILOT_SMTP_PORT") {
            self.smtp.port = parse_u16("STOCKPILOT_SMTP_PORT", &value)?;
        }
        if let Some(value) = read_env("STOCKPILOT_SMTP_USERNAME") {
            self.smtp.username = value;
        }
        if let Some(value) = read_env("STOCKPILOT_SMTP_PASSWORD") {
            self.smtp.password = secret_value(value);
        }
        if let Some(value) = read_env("STOCKPILOT_SMTP_USE_TLS") {
            self.smtp.use_tls = parse_bool("STOCKPILOT_SMTP_USE_TLS", &value)?;
        }
        if let Some(value) = read_env("STOCKPILOT_SMTP_MOCK_MODE") {
            self.smtp.mock_mode = parse_bool("STOCKPILOT_SMTP_MOCK_MODE", &value)?;
        }
        if let Some(value) = read_env("STOCKPILOT_SMTP_FROM_ADDRESS") {
            self.smtp.from_address = Some(value);
        }
        if let Some(value) = read_env("STOCKPILOT_SMTP_TIMEOUT_SECS") {
            self.smtp.timeout_secs = parse_u64("STOCKPILOT_SMTP_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STOCKPILOT_PIPELINE_SUPPLIER_EMAIL") {
            self.pipeline.supplier_email = value;
        }
        if let Some(value) = read_env("STOCKPILOT_PIPELINE_REPLY_TO") {
            self.pipeline.reply_to = Some(value);
        }
        if let Some(value) = read_env("STOCKPILOT_PIPELINE_COMPETITOR_COUNT") {
            self.pipeline.competitor_count =
                parse_usize("STOCKPILOT_PIPELINE_COMPETITOR_COUNT", &value)?;
        }
        if let Some(value) = read_env("STOCKPILOT_PIPELINE_PRICE_TOLERANCE_PCT") {
            self.pipeline.price_tolerance_pct =
                parse_u32("STOCKPILOT_PIPELINE_PRICE_TOLERANCE_PCT", &value)?;
        }
        if let Some(value) = read_env("STOCKPILOT_PIPELINE_MAX_DISCOUNT_PCT") {
            self.pipeline.max_discount_pct =
                parse_u32("STOCKPILOT_PIPELINE_MAX_DISCOUNT_PCT", &value)?;
        }

        let log_level =
            read_env("STOCKPILOT_LOGGING_LEVEL").or_else(|| read_env("STOCKPILOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STOCKPILOT_LOGGING_FORMAT").or_else(|| read_env("STOCKPILOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = Some(llm_model);
        }
        if let Some(mock_mode) = overrides.smtp_mock_mode {
            self.smtp.mock_mode = mock_mode;
        }
        if let Some(supplier_email) = overrides.supplier_email {
            self.pipeline.supplier_email = supplier_email;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_smtp(&self.smtp)?;
        validate_pipeline(&self.pipeline)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("stockpilot.toml"), PathBuf::from("config/stockpilot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    if !url.starts_with("sqlite:") {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://path/to/erp.db`)".to_string(),
        ));
    }
    // Every tool call opens its own connection, so an in-memory database
    // would vanish between calls.
    if url.contains(":memory:") || url.contains("mode=memory") {
        return Err(ConfigError::Validation(
            "database.url must point at a file; in-memory sqlite is not supported".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if llm.model.as_ref().is_some_and(|model| model.trim().is_empty()) {
        return Err(ConfigError::Validation("llm.model must not be blank".to_string()));
    }

    Ok(())
}

fn validate_smtp(smtp: &SmtpConfig) -> Result<(), ConfigError> {
    if smtp.port == 0 {
        return Err(ConfigError::Validation("smtp.port must be greater than zero".to_string()));
    }

    if smtp.timeout_secs == 0 || smtp.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "smtp.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !smtp.mock_mode && smtp.host.trim().is_empty() {
        return Err(ConfigError::Validation(
            "smtp.host is required when smtp.mock_mode is false".to_string(),
        ));
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if !pipeline.supplier_email.contains('@') {
        return Err(ConfigError::Validation(
            "pipeline.supplier_email must be an email address".to_string(),
        ));
    }

    if !(1..=10).contains(&pipeline.competitor_count) {
        return Err(ConfigError::Validation(
            "pipeline.competitor_count must be in range 1..=10".to_string(),
        ));
    }

    if pipeline.price_tolerance_pct > 100 || pipeline.max_discount_pct > 100 {
        return Err(ConfigError::Validation(
            "pipeline percentages must be in range 0..=100".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    smtp: Option<SmtpPatch>,
    pipeline: Option<PipelinePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SmtpPatch {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    use_tls: Option<bool>,
    mock_mode: Option<bool>,
    from_address: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    supplier_email: Option<String>,
    reply_to: Option<String>,
    competitor_count: Option<usize>,
    price_tolerance_pct: Option<u32>,
    max_discount_pct: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const MANAGED_VARS: &[&str] = &[
        "STOCKPILOT_DATABASE_URL",
        "STOCKPILOT_LLM_PROVIDER",
        "STOCKPILOT_LLM_API_KEY",
        "STOCKPILOT_LLM_MODEL",
        "STOCKPILOT_SMTP_PASSWORD",
        "STOCKPILOT_SMTP_MOCK_MODE",
        "STOCKPILOT_LOG_LEVEL",
        "STOCKPILOT_LOG_FORMAT",
        "LLM_PROVIDER",
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
        "TEST_STOCKPILOT_KEY",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_demo_setup() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.database.url == "sqlite://data/erp.db", "default store path")?;
        ensure(config.llm.provider == LlmProvider::OpenAi, "openai is the default provider")?;
        ensure(config.llm.model() == "gpt-4o", "openai default model")?;
        ensure(config.smtp.mock_mode, "mock mode is on by default")?;
        ensure(config.smtp.sender_address() == "noreply@orchestrator.local", "sender fallback")?;
        ensure(config.pipeline.competitor_count == 3, "three competitor prices by default")?;
        ensure(matches!(config.logging.format, LogFormat::Compact), "compact logs by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("TEST_STOCKPILOT_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("stockpilot.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "anthropic"
api_key = "${TEST_STOCKPILOT_KEY}"

[smtp]
mock_mode = false
host = "mail.internal"
port = 2525
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("sk-from-env".to_string()),
                "api key should be interpolated from the environment",
            )?;
            ensure(config.llm.provider == LlmProvider::Anthropic, "provider from file")?;
            ensure(config.llm.model() == "claude-3-5-sonnet-20241022", "anthropic default model")?;
            ensure(!config.smtp.mock_mode, "mock mode disabled from file")?;
            ensure(config.smtp.port == 2525, "smtp port from file")?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn provider_native_key_is_used_as_fallback() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("LLM_PROVIDER", "anthropic");
        env::set_var("OPENAI_API_KEY", "sk-openai");
        env::set_var("ANTHROPIC_API_KEY", "sk-ant-native");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("sk-ant-native".to_string()),
                "anthropic provider should pick ANTHROPIC_API_KEY",
            )?;
            config.llm.ensure_credentials().map_err(|err| err.to_string())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("STOCKPILOT_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("STOCKPILOT_LLM_MODEL", "gpt-4o-mini");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("stockpilot.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[llm]
model = "gpt-4-turbo"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.llm.model() == "gpt-4o-mini", "env model should win over file")?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn missing_credential_is_reported_separately_from_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config should load without a key: {err}"))?;
        let error = match config.llm.ensure_credentials() {
            Ok(()) => return Err("expected a missing credential error".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::MissingCredential(ref message) if message.contains("OPENAI_API_KEY")),
            "missing credential should name OPENAI_API_KEY",
        )
    }

    #[test]
    fn in_memory_database_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("database.url")),
            "in-memory database should fail validation",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("STOCKPILOT_LLM_API_KEY", "sk-secret-value");
        env::set_var("STOCKPILOT_SMTP_PASSWORD", "smtp-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                !debug.contains("smtp-secret-value"),
                "debug output should not contain smtp password",
            )?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }
}
