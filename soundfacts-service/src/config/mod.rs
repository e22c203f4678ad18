use crate::services::providers::openai::{ApiStyle, OPENAI_API_BASE};
use crate::services::providers::GenerationParams;
use axum::http::StatusCode;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 2000;

#[derive(Debug, Clone)]
pub struct SoundfactsConfig {
    pub common: core_config::Config,
    pub provider: ProviderKind,
    pub openai: OpenAiSettings,
    pub cors: CorsSettings,
    pub analysis: AnalysisConfig,
    /// OTLP collector; spans are only exported when this is set.
    pub otlp_endpoint: Option<String>,
}

/// Which backend answers analysis requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    /// Canned sample analysis, for local runs without a key.
    Mock,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(format!(
                "unknown provider '{}' (expected 'openai' or 'mock')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: Option<Secret<String>>,
    pub base_url: String,
    pub model: String,
    pub api_style: ApiStyle,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsSettings {
    pub allowed_origin: String,
    pub allow_authorization: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Require `song` and `artist` in the model's answer.
    pub validate_structure: bool,
    /// Status returned alongside an unusable model answer.
    pub malformed_output_status: StatusCode,
}

impl Default for SoundfactsConfig {
    fn default() -> Self {
        Self {
            common: core_config::Config::default(),
            provider: ProviderKind::OpenAi,
            openai: OpenAiSettings {
                api_key: None,
                base_url: OPENAI_API_BASE.to_string(),
                model: DEFAULT_MODEL.to_string(),
                api_style: ApiStyle::default(),
                temperature: DEFAULT_TEMPERATURE,
                max_tokens: DEFAULT_MAX_TOKENS,
                timeout: None,
            },
            cors: CorsSettings {
                allowed_origin: "*".to_string(),
                allow_authorization: true,
            },
            analysis: AnalysisConfig {
                validate_structure: false,
                malformed_output_status: StatusCode::OK,
            },
            otlp_endpoint: None,
        }
    }
}

impl SoundfactsConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let provider: ProviderKind =
            parse_env("SOUNDFACTS_PROVIDER", get_env("SOUNDFACTS_PROVIDER", Some("openai"), is_prod)?)?;

        // The key is only mandatory when OpenAI is the selected backend.
        let api_key = match provider {
            ProviderKind::OpenAi => Some(get_env("OPENAI_API_KEY", None, is_prod)?),
            ProviderKind::Mock => env::var("OPENAI_API_KEY").ok(),
        }
        .map(Secret::new);

        let timeout = match env::var("OPENAI_TIMEOUT_SECS") {
            Ok(raw) => Some(Duration::from_secs(parse_env("OPENAI_TIMEOUT_SECS", raw)?)),
            Err(_) => None,
        };

        let malformed_status: u16 = parse_env(
            "SOUNDFACTS_MALFORMED_OUTPUT_STATUS",
            get_env("SOUNDFACTS_MALFORMED_OUTPUT_STATUS", Some("200"), is_prod)?,
        )?;
        let malformed_output_status = StatusCode::from_u16(malformed_status).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "SOUNDFACTS_MALFORMED_OUTPUT_STATUS is not a valid status: {}",
                e
            ))
        })?;

        Ok(SoundfactsConfig {
            common: common_config,
            provider,
            openai: OpenAiSettings {
                api_key,
                base_url: get_env("OPENAI_BASE_URL", Some(OPENAI_API_BASE), is_prod)?,
                model: get_env("OPENAI_MODEL", Some(DEFAULT_MODEL), is_prod)?,
                api_style: parse_env(
                    "OPENAI_API_STYLE",
                    get_env("OPENAI_API_STYLE", Some("chat"), is_prod)?,
                )?,
                temperature: parse_env(
                    "OPENAI_TEMPERATURE",
                    get_env(
                        "OPENAI_TEMPERATURE",
                        Some(&DEFAULT_TEMPERATURE.to_string()),
                        is_prod,
                    )?,
                )?,
                max_tokens: parse_env(
                    "OPENAI_MAX_TOKENS",
                    get_env(
                        "OPENAI_MAX_TOKENS",
                        Some(&DEFAULT_MAX_TOKENS.to_string()),
                        is_prod,
                    )?,
                )?,
                timeout,
            },
            cors: CorsSettings {
                allowed_origin: get_env("CORS_ALLOWED_ORIGIN", Some("*"), is_prod)?,
                allow_authorization: parse_bool(
                    "CORS_ALLOW_AUTHORIZATION",
                    &get_env("CORS_ALLOW_AUTHORIZATION", Some("true"), is_prod)?,
                )?,
            },
            analysis: AnalysisConfig {
                validate_structure: parse_bool(
                    "SOUNDFACTS_VALIDATE_STRUCTURE",
                    &get_env("SOUNDFACTS_VALIDATE_STRUCTURE", Some("false"), is_prod)?,
                )?,
                malformed_output_status,
            },
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.trim().is_empty()),
        })
    }

    /// Sampling parameters sent with every provider call.
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: Some(self.openai.temperature),
            max_tokens: Some(self.openai.max_tokens),
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, raw: String) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e))
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be a boolean, got '{}'",
            key,
            raw
        ))),
    }
}
