use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_EXTRACTION_API_URL: &str =
    "https://api.va.landing.ai/v1/tools/agentic-document-analysis";
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_LLM_MODEL: &str = "google/gemini-2.0-flash-001";
pub const DEFAULT_VISION_MODEL: &str = "openai/gpt-4.1-mini";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionBackend {
    /// Hosted document-extraction API
    AgenticDoc { api_key: String, api_url: String },
    /// Page images sent to a vision model over OpenRouter
    VisionLlm { model: String },
}

impl ExtractionBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AgenticDoc { .. } => "agentic-doc",
            Self::VisionLlm { .. } => "vision-llm",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub llm_model: String,
    pub extraction: ExtractionBackend,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
    pub session_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source; unset and blank are the same.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let openrouter_api_key =
            get("OPENROUTER_API_KEY").ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?;

        let backend = get("EXTRACTION_BACKEND").unwrap_or_else(|| "agentic-doc".to_string());
        let extraction = match backend.as_str() {
            "agentic-doc" => ExtractionBackend::AgenticDoc {
                api_key: get("VISION_AGENT_API_KEY")
                    .ok_or(ConfigError::Missing("VISION_AGENT_API_KEY"))?,
                api_url: get("EXTRACTION_API_URL")
                    .unwrap_or_else(|| DEFAULT_EXTRACTION_API_URL.to_string()),
            },
            "vision-llm" => ExtractionBackend::VisionLlm {
                model: get("VISION_MODEL").unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "EXTRACTION_BACKEND",
                    value: other.to_string(),
                    reason: "expected 'agentic-doc' or 'vision-llm'".to_string(),
                });
            }
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", get("PORT"), 3000)?,
            openrouter_api_key,
            openrouter_base_url: get("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENROUTER_BASE_URL.to_string()),
            llm_model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            extraction,
            request_timeout: Duration::from_secs(parse_or(
                "REQUEST_TIMEOUT_SECS",
                get("REQUEST_TIMEOUT_SECS"),
                120,
            )?),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"), 20 * 1024 * 1024)?,
            session_ttl: Duration::from_secs(parse_or(
                "SESSION_TTL_SECS",
                get("SESSION_TTL_SECS"),
                3600,
            )?),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw,
            reason: e.to_string(),
        }),
    }
}
