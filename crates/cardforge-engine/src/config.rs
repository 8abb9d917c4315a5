use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_SQUARE_SIZE: u32 = 512;
pub const DEFAULT_GENERATION_MODEL: &str = "dall-e-3";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-2";
pub const DEFAULT_QUALITY: &str = "standard";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    /// Model for text-to-image generation.
    pub generation_model: String,
    /// Model for variations and edits.
    pub image_model: String,
    pub quality: String,
    pub square_size: u32,
    pub provider_timeout: Duration,
    pub download_timeout: Duration,
    pub user_agent: String,
    pub staging_dir: Option<PathBuf>,
    pub templates_path: Option<PathBuf>,
    pub events_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            quality: DEFAULT_QUALITY.to_string(),
            square_size: DEFAULT_SQUARE_SIZE,
            provider_timeout: Duration::from_secs(120),
            download_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            staging_dir: None,
            templates_path: None,
            events_path: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from the environment; blank values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`], reading raw values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let value = |key: &str| lookup(key).and_then(non_empty);
        Self {
            api_key: value("OPENAI_API_KEY").or_else(|| value("OPENAI_API_KEY_BACKUP")),
            api_base: value("OPENAI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            generation_model: value("CARDFORGE_GENERATION_MODEL")
                .unwrap_or(defaults.generation_model),
            image_model: value("CARDFORGE_IMAGE_MODEL").unwrap_or(defaults.image_model),
            quality: value("CARDFORGE_QUALITY").unwrap_or(defaults.quality),
            square_size: value("CARDFORGE_SQUARE_SIZE")
                .and_then(parse_value::<u32>)
                .filter(|size| *size > 0)
                .unwrap_or(defaults.square_size),
            provider_timeout: value("CARDFORGE_PROVIDER_TIMEOUT_SECS")
                .and_then(parse_value)
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_timeout),
            download_timeout: value("CARDFORGE_DOWNLOAD_TIMEOUT_SECS")
                .and_then(parse_value)
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            user_agent: defaults.user_agent,
            staging_dir: value("CARDFORGE_STAGING_DIR").map(PathBuf::from),
            templates_path: value("CARDFORGE_TEMPLATES").map(PathBuf::from),
            events_path: value("CARDFORGE_EVENTS").map(PathBuf::from),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_square_size(mut self, square_size: u32) -> Self {
        self.square_size = square_size;
        self
    }

    pub fn with_timeouts(mut self, provider: Duration, download: Duration) -> Self {
        self.provider_timeout = provider;
        self.download_timeout = download;
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn with_templates(mut self, path: impl Into<PathBuf>) -> Self {
        self.templates_path = Some(path.into());
        self
    }

    pub fn with_events(mut self, path: impl Into<PathBuf>) -> Self {
        self.events_path = Some(path.into());
        self
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_value<T: std::str::FromStr>(value: String) -> Option<T> {
    value.parse().ok()
}
