use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Hard ceiling on files accepted in one upload or chat request.
pub const MAX_FILES_CEILING: usize = 5;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Environment variable parsed but fell outside the accepted range.
    #[error("Value out of range for environment variable {variable}: {reason}")]
    OutOfRange {
        /// Variable that carried the offending value.
        variable: String,
        /// Human-readable description of the accepted range.
        reason: String,
    },
}

/// Runtime configuration for the relay.
///
/// Every component receives the section it needs at construction; nothing reads configuration
/// from ambient state after startup.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Upload and extraction bounds.
    pub extraction: ExtractionLimits,
    /// PII detector toggles.
    pub pii: PiiConfig,
    /// Prompt cleaning bounds.
    pub prompt: PromptConfig,
    /// Provider credentials and endpoints for the dispatch capability.
    pub providers: ProviderConfig,
}

/// Bounds applied by the document pipeline before and during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionLimits {
    /// Maximum number of files accepted per request.
    pub max_files: usize,
    /// Maximum size of a single file in bytes.
    pub max_file_bytes: usize,
    /// Extracted text beyond this many characters is truncated.
    pub max_extracted_chars: usize,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_files: MAX_FILES_CEILING,
            max_file_bytes: 10 * 1024 * 1024,
            max_extracted_chars: 200_000,
        }
    }
}

/// Toggles for the optional PII heuristics. Email, IP, card, SSN, and phone detectors are always on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PiiConfig {
    /// Redact street-address shaped spans.
    pub redact_addresses: bool,
    /// Redact names introduced by an honorific (`Mr.`, `Dr.`, ...).
    pub redact_names: bool,
    /// Redact five-digit ZIP codes.
    pub redact_postal_codes: bool,
    /// Redact passport, driver's license, and bank account shaped numbers.
    pub redact_id_numbers: bool,
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            redact_addresses: true,
            redact_names: false,
            redact_postal_codes: false,
            redact_id_numbers: false,
        }
    }
}

/// Prompt cleaning configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptConfig {
    /// Maximum prompt length in characters after cleaning.
    pub max_chars: usize,
    /// Run the PII filter over the cleaned prompt before assembly.
    pub redact_pii: bool,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_chars: 8_000,
            redact_pii: true,
        }
    }
}

/// Credentials and endpoints for the LLM providers.
#[derive(Clone)]
pub struct ProviderConfig {
    /// OpenAI API key; the provider is unavailable when absent.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API.
    pub openai_base_url: String,
    /// Anthropic API key; the provider is unavailable when absent.
    pub anthropic_api_key: Option<String>,
    /// Base URL of the Anthropic API.
    pub anthropic_base_url: String,
    /// Base URL of a local Ollama runtime; the provider is unavailable when absent.
    pub ollama_url: Option<String>,
    /// Register the echoing `mock` provider.
    pub include_mock: bool,
    /// Per-request timeout for provider HTTP calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: "https://api.openai.com".into(),
            anthropic_api_key: None,
            anthropic_base_url: "https://api.anthropic.com".into(),
            ollama_url: None,
            include_mock: false,
            request_timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("openai_configured", &self.openai_api_key.is_some())
            .field("openai_base_url", &self.openai_base_url)
            .field("anthropic_configured", &self.anthropic_api_key.is_some())
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("ollama_url", &self.ollama_url)
            .field("include_mock", &self.include_mock)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let max_files = parse_or(&get, "MAX_FILES_PER_REQUEST", defaults.extraction.max_files)?;
        if max_files == 0 || max_files > MAX_FILES_CEILING {
            return Err(ConfigError::OutOfRange {
                variable: "MAX_FILES_PER_REQUEST".into(),
                reason: format!("must be between 1 and {MAX_FILES_CEILING}"),
            });
        }
        let max_file_bytes = parse_or(&get, "MAX_FILE_BYTES", defaults.extraction.max_file_bytes)?;
        if max_file_bytes == 0 {
            return Err(ConfigError::OutOfRange {
                variable: "MAX_FILE_BYTES".into(),
                reason: "must be greater than zero".into(),
            });
        }
        let max_prompt_chars = parse_or(&get, "MAX_PROMPT_CHARS", defaults.prompt.max_chars)?;
        if max_prompt_chars == 0 {
            return Err(ConfigError::OutOfRange {
                variable: "MAX_PROMPT_CHARS".into(),
                reason: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            server_port: get("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
            extraction: ExtractionLimits {
                max_files,
                max_file_bytes,
                max_extracted_chars: parse_or(
                    &get,
                    "MAX_EXTRACTED_CHARS",
                    defaults.extraction.max_extracted_chars,
                )?,
            },
            pii: PiiConfig {
                redact_addresses: parse_flag(
                    &get,
                    "PII_REDACT_ADDRESSES",
                    defaults.pii.redact_addresses,
                )?,
                redact_names: parse_flag(&get, "PII_REDACT_NAMES", defaults.pii.redact_names)?,
                redact_postal_codes: parse_flag(
                    &get,
                    "PII_REDACT_POSTAL_CODES",
                    defaults.pii.redact_postal_codes,
                )?,
                redact_id_numbers: parse_flag(
                    &get,
                    "PII_REDACT_ID_NUMBERS",
                    defaults.pii.redact_id_numbers,
                )?,
            },
            prompt: PromptConfig {
                max_chars: max_prompt_chars,
                redact_pii: parse_flag(&get, "REDACT_PROMPT_PII", defaults.prompt.redact_pii)?,
            },
            providers: ProviderConfig {
                openai_api_key: get("OPENAI_API_KEY"),
                openai_base_url: get("OPENAI_BASE_URL")
                    .unwrap_or(defaults.providers.openai_base_url),
                anthropic_api_key: get("ANTHROPIC_API_KEY"),
                anthropic_base_url: get("ANTHROPIC_BASE_URL")
                    .unwrap_or(defaults.providers.anthropic_base_url),
                ollama_url: get("OLLAMA_URL"),
                include_mock: parse_flag(
                    &get,
                    "INCLUDE_MOCK_PROVIDER",
                    defaults.providers.include_mock,
                )?,
                request_timeout_secs: parse_or(
                    &get,
                    "LLM_REQUEST_TIMEOUT_SECS",
                    defaults.providers.request_timeout_secs,
                )?,
            },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn parse_flag<G>(get: &G, key: &str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(value) = get(key) else {
        return Ok(default);
    };
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

/// Load `.env` (when present) and the process environment into a [`Config`].
pub fn load() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        server_port = ?config.server_port,
        max_files = config.extraction.max_files,
        max_file_bytes = config.extraction.max_file_bytes,
        max_prompt_chars = config.prompt.max_chars,
        providers = ?config.providers,
        "Loaded configuration"
    );
    Ok(config)
}
