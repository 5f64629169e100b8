//! Caller-side retry and failover wrappers around a backend
//!
//! The engine itself makes exactly one backend call per request. Callers
//! that want retries wrap their backends here before handing them over.

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, warn};
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::providers::ModelBackend;
use crate::request::{ComposedPrompt, RawModelOutput};

/// Retry policy for failed requests
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy
{   pub max_retries: usize
  , pub backoff_multiplier: f32
  , pub initial_backoff: Duration
  , pub max_backoff: Duration
}

impl RetryPolicy
{   /// Create a new retry policy
    pub fn new(
      max_retries: usize
    , backoff_multiplier: f32
    , initial_backoff_ms: u64
    , max_backoff_ms: u64
    ) -> Self
    {   RetryPolicy
        {   max_retries
          , backoff_multiplier
          , initial_backoff: Duration::from_millis(initial_backoff_ms)
          , max_backoff: Duration::from_millis(max_backoff_ms)
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self
    {   RetryPolicy::new(
          config.max_retries
        , config.backoff_multiplier
        , config.initial_backoff_ms
        , config.max_backoff_ms
        )
    }

    /// Calculate backoff duration for attempt number
    pub fn backoff_for_attempt(&self, attempt: usize) -> Duration
    {   let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let millis = (self.initial_backoff.as_millis() as f32 * multiplier) as u64;
        Duration::from_millis(millis).min(self.max_backoff)
    }
}

impl Default for RetryPolicy
{   fn default() -> Self
    {   RetryPolicy::new(1, 2.0, 250, 2_000)
    }
}

/// Retries `BackendUnavailable` with bounded backoff
pub struct RetryingBackend<B>
{   inner: B
  , policy: RetryPolicy
}

impl<B: ModelBackend> RetryingBackend<B>
{   pub fn new(inner: B, policy: RetryPolicy) -> Self
    {   RetryingBackend { inner, policy }
    }
}

#[async_trait]
impl<B: ModelBackend> ModelBackend for RetryingBackend<B>
{   fn name(&self) -> &str
    {   self.inner.name()
    }

    async fn generate(
      &self
    , prompt: &ComposedPrompt
    ) -> Result<RawModelOutput>
    {   let mut attempt = 0;
        loop
        {   match self.inner.generate(prompt).await
            {   Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                  let delay = self.policy.backoff_for_attempt(attempt);
                  warn!(
                    "{} unavailable ({}), retry {}/{} in {:?}",
                    self.inner.name(), e, attempt + 1,
                    self.policy.max_retries, delay
                  );
                  tokio::time::sleep(delay).await;
                  attempt += 1;
                }
              , result => return result
            }
        }
    }
}

/// Wrap `backend` in a [`RetryingBackend`] when `config` enables retries
pub fn with_retries(
  backend: Arc<dyn ModelBackend>
, config: &RetryConfig
) -> Arc<dyn ModelBackend>
{   if !config.enabled || config.max_retries == 0
    {   return backend;
    }
    debug!(
      "Retrying {} up to {} times",
      backend.name(), config.max_retries
    );
    Arc::new(RetryingBackend::new(backend, RetryPolicy::from_config(config)))
}

/// Tries backends in order, moving on only when one is unavailable
pub struct FailoverBackend
{   name: String
  , backends: Vec<Arc<dyn ModelBackend>>
}

impl FailoverBackend
{   pub fn new(backends: Vec<Arc<dyn ModelBackend>>) -> Result<Self>
    {   if backends.is_empty()
        {   return Err(Error::InvalidConfiguration(
              "failover needs at least one backend".to_string()
            ));
        }
        debug!(
          "Creating failover sequence with {} backends",
          backends.len()
        );
        let name = backends.iter()
          .map(|b| b.name())
          .collect::<Vec<_>>()
          .join(" -> ");
        Ok(FailoverBackend { name, backends })
    }
}

#[async_trait]
impl ModelBackend for FailoverBackend
{   fn name(&self) -> &str
    {   &self.name
    }

    async fn generate(
      &self
    , prompt: &ComposedPrompt
    ) -> Result<RawModelOutput>
    {   let mut last_error = None;
        for backend in &self.backends
        {   match backend.generate(prompt).await
            {   Err(e) if e.is_retryable() => {
                  warn!("{} unavailable, failing over: {}", backend.name(), e);
                  last_error = Some(e);
                }
              , result => return result
            }
        }
        Err(last_error.unwrap_or_else(|| {
          Error::BackendUnavailable("no backend available".to_string())
        }))
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use crate::request::ContentPart;

    struct Flaky
    {   label: &'static str
      , calls: AtomicUsize
      , results: Mutex<Vec<Result<RawModelOutput>>>
    }

    impl Flaky
    {   fn new(label: &'static str, mut results: Vec<Result<RawModelOutput>>) -> Arc<Self>
        {   results.reverse();
            Arc::new(Flaky
            {   label
              , calls: AtomicUsize::new(0)
              , results: Mutex::new(results)
            })
        }

        fn calls(&self) -> usize
        {   self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelBackend for Flaky
    {   fn name(&self) -> &str
        {   self.label
        }

        async fn generate(&self, _: &ComposedPrompt) -> Result<RawModelOutput>
        {   self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.lock().expect("lock").pop()
              .unwrap_or_else(|| Err(Error::BackendUnavailable("exhausted".into())))
        }
    }

    fn prompt() -> ComposedPrompt
    {   ComposedPrompt::new(
          "sys".into(), vec![ContentPart::Text("q".into())], "general"
        )
    }

    fn down() -> Result<RawModelOutput>
    {   Err(Error::BackendUnavailable("503".into()))
    }

    fn fast_policy(retries: usize) -> RetryPolicy
    {   RetryPolicy::new(retries, 2.0, 1, 5)
    }

    #[test]
    fn backoff_grows_and_is_capped()
    {   let policy = RetryPolicy::new(5, 2.0, 100, 300);
        assert_eq!(policy.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(300));
        assert_eq!(policy.backoff_for_attempt(8), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn retries_unavailable_then_succeeds()
    {   let inner = Flaky::new("a", vec![down(), Ok(RawModelOutput::new("ok"))]);
        let backend = RetryingBackend::new(inner.clone(), fast_policy(1));
        assert_eq!(backend.generate(&prompt()).await, Ok(RawModelOutput::new("ok")));
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries()
    {   let inner = Flaky::new("a", vec![down(), down(), down()]);
        let backend = RetryingBackend::new(inner.clone(), fast_policy(1));
        assert_eq!(backend.generate(&prompt()).await, down());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn rejection_is_not_retried()
    {   let rejected = Err(Error::BackendRejected("413".into()));
        let inner = Flaky::new("a", vec![rejected.clone()]);
        let backend = RetryingBackend::new(inner.clone(), fast_policy(3));
        assert_eq!(backend.generate(&prompt()).await, rejected);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn default_retry_config_leaves_backend_unwrapped()
    {   let inner = Flaky::new("a", vec![down(), Ok(RawModelOutput::new("ok"))]);
        let backend = with_retries(inner.clone(), &RetryConfig::default());
        assert_eq!(backend.generate(&prompt()).await, down());
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn enabled_retry_config_wraps_backend()
    {   let inner = Flaky::new("a", vec![down(), Ok(RawModelOutput::new("ok"))]);
        let config = RetryConfig
        {   enabled: true
          , initial_backoff_ms: 1
          , ..RetryConfig::default()
        };
        let backend = with_retries(inner.clone(), &config);
        assert_eq!(backend.name(), "a");
        assert_eq!(backend.generate(&prompt()).await, Ok(RawModelOutput::new("ok")));
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn failover_moves_to_next_backend()
    {   let first = Flaky::new("first", vec![down()]);
        let second = Flaky::new("second", vec![Ok(RawModelOutput::new("from second"))]);
        let backend = FailoverBackend::new(vec![
          first.clone() as Arc<dyn ModelBackend>
        , second.clone()
        ])
          .expect("failover");
        assert_eq!(backend.name(), "first -> second");
        assert_eq!(
          backend.generate(&prompt()).await,
          Ok(RawModelOutput::new("from second"))
        );
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
    }

    #[tokio::test]
    async fn failover_stops_on_rejection()
    {   let rejected = Err(Error::BackendRejected("bad image".into()));
        let first = Flaky::new("first", vec![rejected.clone()]);
        let second = Flaky::new("second", vec![Ok(RawModelOutput::new("x"))]);
        let backend = FailoverBackend::new(vec![
          first as Arc<dyn ModelBackend>
        , second.clone()
        ])
          .expect("failover");
        assert_eq!(backend.generate(&prompt()).await, rejected);
        assert_eq!(second.calls(), 0);
    }

    #[test]
    fn failover_requires_backends()
    {   assert!(FailoverBackend::new(vec![]).is_err());
    }
}
