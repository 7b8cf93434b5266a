//! Configuration loaded from the environment.
//!
//! Variables are read from the process environment, a `.env` file in the
//! working directory is loaded first if there is one:
//!
//! | Variable | Default |
//! |---|---|
//! | `GEMINI_API_KEY` | required |
//! | `GEMINI_MODEL` | `gemini-2.0-flash` |
//! | `GEMINI_BASE_URL` | `https://generativelanguage.googleapis.com/v1beta` |
//! | `DATA_ASSISTANT_MAX_OUTPUT_TOKENS` | `2048` |
//! | `DATA_ASSISTANT_TEMPERATURE` | `0.7` |
//! | `DATA_ASSISTANT_TOP_P` | `0.95` |
//! | `DATA_ASSISTANT_TOP_K` | `40` |
//! | `DATA_ASSISTANT_REQUEST_TIMEOUT_SECS` | `120`, `0` disables it |

use std::env;
use std::error::Error;
use std::fmt::{self, Debug, Display};
use std::str::FromStr;
use std::time::Duration;

use data_assistant_gemini_model::{GeminiConfig, GeminiConfigBuilder};
use data_assistant_model::GenerationParams;

const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TOP_P: f32 = 0.95;
const DEFAULT_TOP_K: u32 = 40;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// An error that makes the configuration unusable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `GEMINI_API_KEY` is not set or empty.
    MissingApiKey,
    /// A variable is set to something that can't be parsed.
    InvalidValue {
        /// The variable name.
        key: &'static str,
        /// The offending value.
        value: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingApiKey => {
                write!(f, "GEMINI_API_KEY environment variable is not set")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value for {key}: `{value}`")
            }
        }
    }
}

impl Error for ConfigError {}

/// Settings of the assistant.
#[derive(Clone, PartialEq)]
pub struct Config {
    api_key: String,
    model: Option<String>,
    base_url: Option<String>,
    /// Sampling parameters sent with every request.
    pub params: GenerationParams,
    /// The limit of a single request, `None` if disabled.
    pub request_timeout: Option<Duration>,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("loaded {}", path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => warn!("failed to load .env: {err}"),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value
    /// of a variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = var("GEMINI_API_KEY").ok_or(ConfigError::MissingApiKey)?;
        let params = GenerationParams {
            max_output_tokens: Some(parse_or(
                &var,
                "DATA_ASSISTANT_MAX_OUTPUT_TOKENS",
                DEFAULT_MAX_OUTPUT_TOKENS,
            )?),
            temperature: Some(parse_or(
                &var,
                "DATA_ASSISTANT_TEMPERATURE",
                DEFAULT_TEMPERATURE,
            )?),
            top_p: Some(parse_or(&var, "DATA_ASSISTANT_TOP_P", DEFAULT_TOP_P)?),
            top_k: Some(parse_or(&var, "DATA_ASSISTANT_TOP_K", DEFAULT_TOP_K)?),
        };
        let timeout_secs = parse_or(
            &var,
            "DATA_ASSISTANT_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        Ok(Self {
            api_key,
            model: var("GEMINI_MODEL"),
            base_url: var("GEMINI_BASE_URL"),
            params,
            request_timeout: (timeout_secs > 0)
                .then(|| Duration::from_secs(timeout_secs)),
        })
    }

    /// Returns the provider configuration.
    pub fn gemini_config(&self) -> GeminiConfig {
        let mut builder = GeminiConfigBuilder::with_api_key(&self.api_key);
        if let Some(model) = &self.model {
            builder = builder.with_model(model);
        }
        if let Some(base_url) = &self.base_url {
            builder = builder.with_base_url(base_url);
        }
        builder.build()
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<deducted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("params", &self.params)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn parse_or<T, F>(
    var: &F,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = var(key) else {
        return Ok(default);
    };
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(
        vars: &[(&str, &str)],
    ) -> impl Fn(&str) -> Option<String> + use<> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_lookup(lookup(&[("GEMINI_API_KEY", "secret")]))
                .unwrap();
        assert_eq!(
            config.params,
            GenerationParams {
                max_output_tokens: Some(2048),
                temperature: Some(0.7),
                top_p: Some(0.95),
                top_k: Some(40),
            }
        );
        assert_eq!(config.request_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.gemini_config().model(), "gemini-2.0-flash");
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "secret"),
            ("GEMINI_MODEL", "models/gemini-1.5-pro"),
            ("DATA_ASSISTANT_TEMPERATURE", " 0.2 "),
            ("DATA_ASSISTANT_TOP_K", "8"),
            ("DATA_ASSISTANT_REQUEST_TIMEOUT_SECS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.params.temperature, Some(0.2));
        assert_eq!(config.params.top_k, Some(8));
        assert_eq!(config.params.max_output_tokens, Some(2048));
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.gemini_config().model(), "gemini-1.5-pro");
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            Config::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::MissingApiKey
        );
        assert_eq!(
            Config::from_lookup(lookup(&[("GEMINI_API_KEY", "  ")]))
                .unwrap_err(),
            ConfigError::MissingApiKey
        );

        let err = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "secret"),
            ("DATA_ASSISTANT_TOP_K", "many"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "DATA_ASSISTANT_TOP_K",
                value: "many".to_owned(),
            }
        );
        assert_eq!(
            err.to_string(),
            "invalid value for DATA_ASSISTANT_TOP_K: `many`"
        );
    }
}
