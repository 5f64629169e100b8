//! Request orchestration: select, compose, invoke, split

use std::fmt;
use std::sync::Arc;
use log::{debug, error, info, trace};
use crate::composer::PromptComposer;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::providers::{self, ModelBackend};
use crate::request::{BackendChoice, Reply, Request};
use crate::{selector, splitter};

/// Where a request is in its single pass through the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage
{   Received
  , Selected
  , Composed
  , Invoked
  , Split
  , Done
  , Failed
}

impl fmt::Display for Stage
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   fmt::Debug::fmt(self, f)
    }
}

/// Ties the selector, composer, backends and splitter together
///
/// Holds no per-request state, so one `Engine` can serve any number of
/// concurrent `handle` calls.
pub struct Engine
{   text_backend: Arc<dyn ModelBackend>
  , vision_backend: Arc<dyn ModelBackend>
  , composer: PromptComposer
}

impl Engine
{   pub fn new(
      text_backend: Arc<dyn ModelBackend>
    , vision_backend: Arc<dyn ModelBackend>
    , composer: PromptComposer
    ) -> Self
    {   info!(
          "Engine initialized (text: {}, vision: {})",
          text_backend.name(), vision_backend.name()
        );
        Engine
        {   text_backend
          , vision_backend
          , composer
        }
    }

    /// Build both backends from configuration
    ///
    /// The backends are used as built. `config.retry` is ignored here;
    /// callers that want retries wrap backends with
    /// [`failover::with_retries`](crate::failover::with_retries) and use
    /// [`Engine::new`].
    pub fn from_config(config: &EngineConfig) -> Result<Self>
    {   config.validate()?;
        Ok(Engine::new(
          providers::build_backend(&config.text)?
        , providers::build_backend(&config.vision)?
        , PromptComposer::new(config.prompts.clone())
        ))
    }

    pub fn composer(&self) -> &PromptComposer
    {   &self.composer
    }

    fn backend(&self, choice: BackendChoice) -> &Arc<dyn ModelBackend>
    {   match choice
        {   BackendChoice::TextModel => &self.text_backend
          , BackendChoice::VisionModel => &self.vision_backend
        }
    }

    /// Process one request into an answer and thoughts
    ///
    /// Errors from any stage are returned unchanged; no partial reply is
    /// ever produced.
    pub async fn handle(&self, request: Request) -> Result<Reply>
    {   let mut stage = Stage::Received;
        info!(
          "Processing {} request: {}",
          request.task_hint,
          providers::truncate(&request.text_prompt, 50)
        );

        match self.run(&request, &mut stage).await
        {   Ok(reply) => {
              debug!(
                "Request done (answer {} chars, thoughts: {})",
                reply.answer.len(),
                reply.has_thoughts()
              );
              Ok(reply)
            }
          , Err(e) => {
              error!("Request failed after stage {}: {}", stage, e);
              advance(&mut stage, Stage::Failed);
              Err(e)
            }
        }
    }

    async fn run(&self, request: &Request, stage: &mut Stage) -> Result<Reply>
    {   if request.is_blank()
        {   return Err(Error::InvalidRequest(
              "request has no text, documents or image".to_string()
            ));
        }

        let choice = selector::select(request)?;
        advance(stage, Stage::Selected);

        let prompt = self.composer.compose(request, choice);
        if prompt.user_content().is_empty()
        {   return Err(Error::InvalidRequest(
              "no content left after applying the context budget".to_string()
            ));
        }
        advance(stage, Stage::Composed);

        let backend = self.backend(choice);
        info!("Calling {} model: {}", choice, backend.name());
        let raw = backend.generate(&prompt).await?;
        advance(stage, Stage::Invoked);

        let reply = splitter::split(&raw);
        advance(stage, Stage::Split);

        advance(stage, Stage::Done);
        Ok(reply)
    }
}

fn advance(stage: &mut Stage, next: Stage)
{   trace!("{} -> {}", stage, next);
    *stage = next;
}
