use thiserror::Error;

/// Error type for docunexus operations
/// Implements Clone for sending through channels
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error
{   /// Malformed or contradictory request
    #[error("Invalid request: {0}")]
    InvalidRequest(String)
  , /// Transport, auth or other transient backend failure
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String)
  , /// Backend validated and declined the input
    #[error("Backend rejected input: {0}")]
    BackendRejected(String)
  , /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String)
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error
{   /// Only transient failures are worth another attempt
    pub fn is_retryable(&self) -> bool
    {   matches!(self, Error::BackendUnavailable(_))
    }

    /// Human-readable message for display next to a resubmit option
    pub fn user_message(&self) -> String
    {   match self
        {   Error::InvalidRequest(msg) => {
              format!(
                "**Error:** the request could not be processed: {}. \
                 Please adjust it and try again.",
                msg
              )
            }
          , Error::BackendUnavailable(_) => {
              "**Error:** the model service is currently unreachable. \
               Please try again in a moment."
                .to_string()
            }
          , Error::BackendRejected(msg) => {
              format!(
                "**Error:** the model service declined the input: {}. \
                 Try a smaller document or a different image.",
                msg
              )
            }
          , Error::InvalidConfiguration(msg) => {
              format!(
                "**Error:** the application is misconfigured: {}.",
                msg
              )
            }
        }
    }
}
