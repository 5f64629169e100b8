//! Model backend adapters

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, error};
use reqwest::StatusCode;
use crate::config::{BackendConfig, BackendKind};
use crate::error::{Error, Result};
use crate::request::{ComposedPrompt, RawModelOutput};

pub mod gemini;
pub mod openai_compat;

// Re-export for convenience
pub use gemini::GeminiBackend;
pub use openai_compat::OpenAiCompatBackend;

/// A single inference endpoint behind a uniform call
///
/// Implementations perform exactly one network call per `generate` and
/// never retry; see [`crate::failover`] for wrappers that do.
#[async_trait]
pub trait ModelBackend: Send + Sync
{   /// Short label for logs
    fn name(&self) -> &str;

    async fn generate(
      &self
    , prompt: &ComposedPrompt
    ) -> Result<RawModelOutput>;
}

#[async_trait]
impl<B: ModelBackend + ?Sized> ModelBackend for Arc<B>
{   fn name(&self) -> &str
    {   (**self).name()
    }

    async fn generate(
      &self
    , prompt: &ComposedPrompt
    ) -> Result<RawModelOutput>
    {   (**self).generate(prompt).await
    }
}

/// Construct the adapter matching `config.kind`
pub fn build_backend(config: &BackendConfig) -> Result<Arc<dyn ModelBackend>>
{   debug!("Building {:?} backend for model {}", config.kind, config.model);
    let backend: Arc<dyn ModelBackend> = match config.kind
    {   BackendKind::OpenAiCompat => Arc::new(OpenAiCompatBackend::new(config)?)
      , BackendKind::Gemini => Arc::new(GeminiBackend::new(config)?)
    };
    Ok(backend)
}

/// Refuse prompts with nothing to send, before any I/O
pub(crate) fn ensure_content(prompt: &ComposedPrompt) -> Result<()>
{   if prompt.user_content().is_empty()
    {   error!("Refusing to send prompt with empty user content");
        return Err(Error::BackendRejected(
          "prompt has no user content".to_string()
        ));
    }
    Ok(())
}

pub(crate) fn http_client(config: &BackendConfig) -> Result<reqwest::Client>
{   reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| Error::InvalidConfiguration(
        format!("cannot build HTTP client: {}", e)
      ))
}

pub(crate) fn join_url(base: &str, path: &str) -> String
{   format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Map a transport failure
pub(crate) fn transport_error(backend: &str, e: reqwest::Error) -> Error
{   if e.is_timeout()
    {   error!("{} request timed out", backend);
        Error::BackendUnavailable(format!("{}: request timed out", backend))
    } else
    {   error!("{} HTTP error: {}", backend, e);
        Error::BackendUnavailable(format!("{}: {}", backend, e))
    }
}

/// Map a non-success HTTP status
///
/// Auth, throttling and server faults are the infrastructure's problem;
/// the remaining client errors mean the input itself was declined.
pub(crate) fn status_error(
  backend: &str
, status: StatusCode
, body: &str
) -> Error
{   let detail = format!("{}: HTTP {}: {}", backend, status, truncate(body, 300));
    error!("{} API error: {}", backend, detail);
    match status.as_u16()
    {   401 | 403 | 408 | 429 => Error::BackendUnavailable(detail)
      , 400..=499 => Error::BackendRejected(detail)
      , _ => Error::BackendUnavailable(detail)
    }
}

/// First `max` characters of `text`, for logs
pub(crate) fn truncate(text: &str, max: usize) -> String
{   match text.char_indices().nth(max)
    {   Some((idx, _)) => format!("{}...", &text[..idx])
      , None => text.to_string()
    }
}
