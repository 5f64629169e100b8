//! Configuration for model backends, prompt composition and retries

use std::path::Path;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

const ENV_PREFIX: &str = "DOCUNEXUS";

/// Wire protocol spoken by a backend endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind
{   /// OpenAI-style chat completions (Azure AI Inference, Phi-4 deployments)
    #[default]
    OpenAiCompat
  , /// Google generateContent
    Gemini
}

impl std::str::FromStr for BackendKind
{   type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {   match s.trim().to_ascii_lowercase().as_str()
        {   "openai" | "openai_compat" | "azure" => Ok(BackendKind::OpenAiCompat)
          , "gemini" | "google" => Ok(BackendKind::Gemini)
          , other => Err(Error::InvalidConfiguration(
              format!("unknown backend kind: {}", other)
            ))
        }
    }
}

/// One inference endpoint
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig
{   #[serde(default)]
    pub kind: BackendKind
  , /// Base URL, e.g. "https://models.inference.ai.azure.com"
    pub endpoint: String
  , pub api_key: String
  , pub model: String
  , /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64
  , #[serde(default)]
    pub max_output_tokens: Option<u32>
  , #[serde(default)]
    pub temperature: Option<f32>
}

fn default_timeout_secs() -> u64
{   60
}

// Hand-written so the key never reaches a log line
impl std::fmt::Debug for BackendConfig
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {   f.debug_struct("BackendConfig")
          .field("kind", &self.kind)
          .field("endpoint", &self.endpoint)
          .field("api_key", &"<redacted>")
          .field("model", &self.model)
          .field("timeout_secs", &self.timeout_secs)
          .field("max_output_tokens", &self.max_output_tokens)
          .field("temperature", &self.temperature)
          .finish()
    }
}

impl BackendConfig
{   pub fn new(
      kind: BackendKind
    , endpoint: impl Into<String>
    , api_key: impl Into<String>
    , model: impl Into<String>
    ) -> Self
    {   BackendConfig
        {   kind
          , endpoint: endpoint.into()
          , api_key: api_key.into()
          , model: model.into()
          , timeout_secs: default_timeout_secs()
          , max_output_tokens: Some(8192)
          , temperature: Some(0.7)
        }
    }

    pub fn validate(&self, role: &str) -> Result<()>
    {   if self.endpoint.trim().is_empty()
        {   return Err(Error::InvalidConfiguration(
              format!("{} backend: endpoint is empty", role)
            ));
        }
        if !self.endpoint.starts_with("http://")
          && !self.endpoint.starts_with("https://")
        {   return Err(Error::InvalidConfiguration(
              format!(
                "{} backend: endpoint must be an http(s) URL: {}",
                role, self.endpoint
              )
            ));
        }
        if self.api_key.trim().is_empty()
        {   return Err(Error::InvalidConfiguration(
              format!("{} backend: api key is empty", role)
            ));
        }
        if self.model.trim().is_empty()
        {   return Err(Error::InvalidConfiguration(
              format!("{} backend: model name is empty", role)
            ));
        }
        if self.timeout_secs == 0
        {   return Err(Error::InvalidConfiguration(
              format!("{} backend: timeout must be positive", role)
            ));
        }
        if let Some(t) = self.temperature
        {   if !(0.0..=2.0).contains(&t)
            {   return Err(Error::InvalidConfiguration(
                  format!("{} backend: temperature {} out of range", role, t)
                ));
            }
        }
        Ok(())
    }

    /// Read `DOCUNEXUS_<ROLE>_*` variables
    fn from_env(role: &str) -> Result<Self>
    {   let var = |name: &str| -> Option<String> {
          std::env::var(format!("{}_{}_{}", ENV_PREFIX, role, name))
            .ok()
            .filter(|v| !v.trim().is_empty())
        };
        let require = |name: &str| -> Result<String> {
          var(name).ok_or_else(|| {
            Error::InvalidConfiguration(format!(
              "{}_{}_{} is not set", ENV_PREFIX, role, name
            ))
          })
        };

        let kind = match var("KIND")
        {   Some(kind) => kind.parse()?
          , None => BackendKind::default()
        };
        let mut config = BackendConfig::new(
          kind
        , require("ENDPOINT")?
        , require("API_KEY")?
        , require("MODEL")?
        );
        if let Some(secs) = var("TIMEOUT_SECS")
        {   config.timeout_secs = secs.parse().map_err(|_| {
              Error::InvalidConfiguration(format!(
                "{}_{}_TIMEOUT_SECS is not a number: {}",
                ENV_PREFIX, role, secs
              ))
            })?;
        }
        Ok(config)
    }
}

/// Template parameters shared by every task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig
{   /// Identity preamble opening every system instruction
    pub persona: String
  , /// Language the answer should be written in
    pub language: String
  , /// Overrides each template's own length ("concise", "detailed", ...)
    pub response_length: Option<String>
  , /// Budget for all context documents together, in characters
    pub max_context_chars: Option<usize>
}

impl Default for PromptConfig
{   fn default() -> Self
    {   PromptConfig
        {   persona: "You are DocuNexus, a helpful assistant that \
                      analyzes documents and images for its users."
              .to_string()
          , language: "English".to_string()
          , response_length: None
          , max_context_chars: None
        }
    }
}

/// Retry settings for the caller-side backend wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig
{   /// Wrap backends in a retrying layer
    pub enabled: bool
  , /// Extra attempts after the first failure
    pub max_retries: usize
  , /// Backoff multiplier for retries
    pub backoff_multiplier: f32
  , /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64
  , /// Upper bound for a single backoff in milliseconds
    pub max_backoff_ms: u64
}

impl Default for RetryConfig
{   fn default() -> Self
    {   RetryConfig
        {   enabled: false
          , max_retries: 1
          , backoff_multiplier: 2.0
          , initial_backoff_ms: 250
          , max_backoff_ms: 2_000
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig
{   /// General-purpose text/reasoning backend
    pub text: BackendConfig
  , /// Vision-capable multimodal backend
    pub vision: BackendConfig
  , #[serde(default)]
    pub prompts: PromptConfig
  , #[serde(default)]
    pub retry: RetryConfig
}

impl EngineConfig
{   pub fn new(text: BackendConfig, vision: BackendConfig) -> Self
    {   EngineConfig
        {   text
          , vision
          , prompts: PromptConfig::default()
          , retry: RetryConfig::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self>
    {   let config: EngineConfig = serde_json::from_str(json)
          .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self>
    {   let path = path.as_ref();
        debug!("Loading engine config from {}", path.display());
        let json = std::fs::read_to_string(path).map_err(|e| {
          Error::InvalidConfiguration(
            format!("cannot read {}: {}", path.display(), e)
          )
        })?;
        let config = Self::from_json_str(&json)?;
        info!("Engine config loaded from {}", path.display());
        Ok(config)
    }

    /// Build from `DOCUNEXUS_TEXT_*` and `DOCUNEXUS_VISION_*` variables
    ///
    /// `DOCUNEXUS_CONTEXT_MAX_CHARS` and `DOCUNEXUS_LANGUAGE` tune the
    /// prompt settings.
    pub fn from_env() -> Result<Self>
    {   let mut config = EngineConfig::new(
          BackendConfig::from_env("TEXT")?
        , BackendConfig::from_env("VISION")?
        );
        if let Ok(language) = std::env::var(format!("{}_LANGUAGE", ENV_PREFIX))
        {   config.prompts.language = language;
        }
        if let Ok(max) = std::env::var(
          format!("{}_CONTEXT_MAX_CHARS", ENV_PREFIX)
        )
        {   match max.parse()
            {   Ok(n) => config.prompts.max_context_chars = Some(n)
              , Err(_) => warn!(
                  "Ignoring non-numeric {}_CONTEXT_MAX_CHARS: {}",
                  ENV_PREFIX, max
                )
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()>
    {   self.text.validate("text")?;
        self.vision.validate("vision")?;
        if self.prompts.language.trim().is_empty()
        {   return Err(Error::InvalidConfiguration(
              "prompt language is empty".to_string()
            ));
        }
        if self.prompts.max_context_chars == Some(0)
        {   return Err(Error::InvalidConfiguration(
              "max_context_chars must be positive".to_string()
            ));
        }
        if self.retry.backoff_multiplier < 1.0
        {   return Err(Error::InvalidConfiguration(
              "retry backoff multiplier must be at least 1.0".to_string()
            ));
        }
        Ok(())
    }
}
