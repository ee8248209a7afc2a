use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chatbot::intent::DEFAULT_IMAGE_KEYWORDS;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

/// Which image backend a configured tier uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageBackend {
    Cloudflare,
    HuggingFace,
    Pollinations,
}

impl ImageBackend {
    /// Observed size of a real image from each tier, minus some slack.
    fn default_min_bytes(self) -> usize {
        match self {
            Self::Cloudflare => 20_000,
            Self::HuggingFace => 10_000,
            Self::Pollinations => 5_000,
        }
    }
}

#[derive(Deserialize)]
struct ImageProviderFile {
    backend: ImageBackend,
    min_bytes: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageProviderConfig {
    pub backend: ImageBackend,
    /// Payloads of this size or smaller are rejected.
    pub min_bytes: usize,
}

#[derive(Deserialize)]
struct ConfigFile {
    /// Users allowed to run `/set_ai` and `/reset`.
    owner_ids: Vec<u64>,
    #[serde(default)]
    telegram_bot_token: String,
    #[serde(default)]
    groq_api_key: String,
    #[serde(default)]
    cloudflare_account_id: String,
    #[serde(default)]
    cloudflare_api_token: String,
    #[serde(default)]
    hf_api_key: String,
    /// Groq models in preference order.
    #[serde(default = "default_text_models")]
    text_models: Vec<String>,
    #[serde(default = "default_temperature")]
    temperature: f32,
    /// Image tiers in preference order.
    #[serde(default = "default_image_providers")]
    image_providers: Vec<ImageProviderFile>,
    system_prompt: Option<String>,
    /// Appended to the system message on a new thread or when asked who made the bot.
    creator_note: Option<String>,
    #[serde(default = "default_identity_keywords")]
    identity_keywords: Vec<String>,
    image_keywords: Option<Vec<String>>,
    #[serde(default = "default_history_window")]
    history_window: usize,
    #[serde(default = "default_max_retries")]
    max_retries_per_provider: u32,
    #[serde(default = "default_retry_backoff_ms")]
    retry_backoff_ms: u64,
    #[serde(default = "default_text_timeout_secs")]
    text_timeout_secs: u64,
    #[serde(default = "default_image_timeout_secs")]
    image_timeout_secs: u64,
    #[serde(default = "default_max_message_chars")]
    max_message_chars: usize,
    /// Directory for state files (database, logs). Defaults to `data`.
    data_dir: Option<String>,
}

fn default_text_models() -> Vec<String> {
    ["llama-3.3-70b-versatile", "llama-3.1-8b-instant", "gemma2-9b-it"]
        .map(String::from)
        .to_vec()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_image_providers() -> Vec<ImageProviderFile> {
    [ImageBackend::Cloudflare, ImageBackend::HuggingFace, ImageBackend::Pollinations]
        .into_iter()
        .map(|backend| ImageProviderFile { backend, min_bytes: None })
        .collect()
}

fn default_identity_keywords() -> Vec<String> {
    ["من برمجك", "من صنعك", "من المبرمج", "مين سواك", "who made you", "who programmed you"]
        .map(String::from)
        .to_vec()
}

fn default_history_window() -> usize {
    15
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_text_timeout_secs() -> u64 {
    15
}

fn default_image_timeout_secs() -> u64 {
    60
}

fn default_max_message_chars() -> usize {
    2000
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "أنت مساعد ذكي وخبير لسيرفر ريسبكت الشمال. \
     يجب أن تكون جميع ردودك باللغة العربية الفصحى فقط وبأسلوب طبيعي وواضح. \
     يمنع استخدام أي لغات أخرى في الردود إلا إذا طلب المستخدم ذلك صراحة.";

pub struct Config {
    pub owner_ids: Vec<u64>,
    pub telegram_bot_token: String,
    pub groq_api_key: Option<String>,
    pub cloudflare_account_id: Option<String>,
    pub cloudflare_api_token: Option<String>,
    pub hf_api_key: Option<String>,
    pub text_models: Vec<String>,
    pub temperature: f32,
    pub image_providers: Vec<ImageProviderConfig>,
    pub system_prompt: String,
    pub creator_note: Option<String>,
    pub identity_keywords: Vec<String>,
    pub image_keywords: Vec<String>,
    pub history_window: usize,
    pub max_retries_per_provider: u32,
    pub retry_backoff: Duration,
    pub text_timeout: Duration,
    pub image_timeout: Duration,
    pub max_message_chars: usize,
    /// Directory for state files (database, logs).
    pub data_dir: PathBuf,
}

/// Config value if set, otherwise the environment variable.
fn secret(value: String, env_var: &str) -> Option<String> {
    Some(value)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| std::env::var(env_var).ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        if file.owner_ids.is_empty() {
            return Err(ConfigError::Validation("owner_ids must contain at least one owner ID".into()));
        }

        let telegram_bot_token = secret(file.telegram_bot_token, "TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let text_models: Vec<String> = file
            .text_models
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if text_models.is_empty() {
            return Err(ConfigError::Validation("text_models must name at least one model".into()));
        }
        if file.image_providers.is_empty() {
            return Err(ConfigError::Validation("image_providers must list at least one backend".into()));
        }
        if file.history_window == 0 {
            return Err(ConfigError::Validation("history_window must be at least 1".into()));
        }
        if file.max_message_chars == 0 {
            return Err(ConfigError::Validation("max_message_chars must be at least 1".into()));
        }

        let image_providers = file
            .image_providers
            .into_iter()
            .map(|p| ImageProviderConfig {
                backend: p.backend,
                min_bytes: p.min_bytes.unwrap_or_else(|| p.backend.default_min_bytes()),
            })
            .collect();

        let image_keywords = file
            .image_keywords
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_KEYWORDS.iter().map(|k| k.to_string()).collect());

        Ok(Self {
            owner_ids: file.owner_ids,
            telegram_bot_token,
            groq_api_key: secret(file.groq_api_key, "GROQ_API_KEY"),
            cloudflare_account_id: secret(file.cloudflare_account_id, "CLOUDFLARE_ACCOUNT_ID"),
            cloudflare_api_token: secret(file.cloudflare_api_token, "CLOUDFLARE_API_TOKEN"),
            hf_api_key: secret(file.hf_api_key, "HF_API_KEY"),
            text_models,
            temperature: file.temperature,
            image_providers,
            system_prompt: file
                .system_prompt
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            creator_note: file.creator_note.filter(|n| !n.trim().is_empty()),
            identity_keywords: file.identity_keywords,
            image_keywords,
            history_window: file.history_window,
            max_retries_per_provider: file.max_retries_per_provider,
            retry_backoff: Duration::from_millis(file.retry_backoff_ms),
            text_timeout: Duration::from_secs(file.text_timeout_secs),
            image_timeout: Duration::from_secs(file.image_timeout_secs),
            max_message_chars: file.max_message_chars,
            data_dir: file.data_dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
        })
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owner_ids.contains(&user_id)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("bot_database.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config_gets_defaults() {
        let file = write_config(r#"{
            "owner_ids": [123456],
            "telegram_bot_token": "123456789:ABCdefGHIjklMNOpqrsTUVwxyz",
            "groq_api_key": "gsk_test"
        }"#);
        let config = Config::load(file.path()).expect("should load valid config");

        assert!(config.is_owner(123456));
        assert_eq!(config.groq_api_key.as_deref(), Some("gsk_test"));
        assert_eq!(config.text_models.len(), 3);
        assert_eq!(config.history_window, 15);
        assert_eq!(config.max_message_chars, 2000);
        assert_eq!(config.retry_backoff, Duration::from_secs(1));
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.image_keywords.len(), DEFAULT_IMAGE_KEYWORDS.len());

        let backends: Vec<(ImageBackend, usize)> =
            config.image_providers.iter().map(|p| (p.backend, p.min_bytes)).collect();
        assert_eq!(
            backends,
            [
                (ImageBackend::Cloudflare, 20_000),
                (ImageBackend::HuggingFace, 10_000),
                (ImageBackend::Pollinations, 5_000)
            ]
        );
    }

    #[test]
    fn test_image_provider_overrides() {
        let file = write_config(r#"{
            "owner_ids": [1],
            "telegram_bot_token": "123456789:ABCdef",
            "image_providers": [
                {"backend": "pollinations", "min_bytes": 1000},
                {"backend": "cloudflare"}
            ]
        }"#);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(
            config.image_providers,
            [
                ImageProviderConfig { backend: ImageBackend::Pollinations, min_bytes: 1000 },
                ImageProviderConfig { backend: ImageBackend::Cloudflare, min_bytes: 20_000 },
            ]
        );
    }

    #[test]
    fn test_unknown_image_backend() {
        let file = write_config(r#"{
            "owner_ids": [1],
            "telegram_bot_token": "123456789:ABCdef",
            "image_providers": [{"backend": "midjourney"}]
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }

    #[test]
    fn test_empty_owner_ids() {
        let file = write_config(r#"{
            "owner_ids": [],
            "telegram_bot_token": "123456789:ABCdef"
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("owner_ids"));
    }

    #[test]
    fn test_invalid_token_format() {
        for token in ["invalid_token_no_colon", "notanumber:ABCdef", "123456789:"] {
            let file = write_config(&format!(
                r#"{{"owner_ids": [1], "telegram_bot_token": "{token}"}}"#
            ));
            let err = assert_err(Config::load(file.path()));
            assert!(matches!(err, ConfigError::Validation(_)), "{token}");
        }
    }

    #[test]
    fn test_empty_lists_and_zero_sizes_rejected() {
        for extra in [
            r#""text_models": []"#,
            r#""text_models": ["  "]"#,
            r#""image_providers": []"#,
            r#""history_window": 0"#,
            r#""max_message_chars": 0"#,
        ] {
            let file = write_config(&format!(
                r#"{{"owner_ids": [1], "telegram_bot_token": "123456789:ABCdef", {extra}}}"#
            ));
            let err = assert_err(Config::load(file.path()));
            assert!(matches!(err, ConfigError::Validation(_)), "{extra}");
        }
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
