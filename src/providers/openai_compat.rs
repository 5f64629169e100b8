//! OpenAI-style chat completions (Azure AI Inference, Phi-4, ...)

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::request::{ComposedPrompt, ContentPart, RawModelOutput};
use super::ModelBackend;

// ===== Message Types =====

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage
{   pub role: &'static str
  , pub content: MessageContent
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent
{   Text(String)
  , Parts(Vec<RequestPart>)
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestPart
{   Text
    {   text: String
    }
  , ImageUrl
    {   image_url: ImageUrl
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl
{   pub url: String
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>
  , pub stream: bool
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse
{   #[serde(default)]
    pub choices: Vec<Choice>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: ResponseMessage
  , #[serde(default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage
{   #[serde(default)]
    pub content: Option<String>
}

/// Adapter for any endpoint speaking `/chat/completions`
pub struct OpenAiCompatBackend
{   endpoint: String
  , api_key: String
  , model: String
  , max_tokens: Option<u32>
  , temperature: Option<f32>
  , http_client: reqwest::Client
}

impl OpenAiCompatBackend
{   pub fn new(config: &BackendConfig) -> Result<Self>
    {   debug!("Creating OpenAiCompatBackend for {}", config.model);
        Ok(OpenAiCompatBackend
        {   endpoint: config.endpoint.clone()
          , api_key: config.api_key.clone()
          , model: config.model.clone()
          , max_tokens: config.max_output_tokens
          , temperature: config.temperature
          , http_client: super::http_client(config)?
        })
    }

    /// Translate a composed prompt into the wire request
    pub fn build_request(&self, prompt: &ComposedPrompt) -> ChatRequest
    {   let parts: Vec<RequestPart> = prompt.user_content()
          .iter()
          .map(|part| match part
          {   ContentPart::Text(text) => RequestPart::Text
              {   text: text.clone()
              }
            , ContentPart::Image { mime_type, data } => RequestPart::ImageUrl
              {   image_url: ImageUrl
                  {   url: format!(
                        "data:{};base64,{}",
                        mime_type,
                        BASE64.encode(data)
                      )
                  }
              }
          })
          .collect();

        // Plain string content is accepted by text-only deployments too
        let user_content = if parts.iter().all(|p| matches!(p, RequestPart::Text { .. }))
        {   MessageContent::Text(prompt.user_text())
        } else
        {   MessageContent::Parts(parts)
        };

        ChatRequest
        {   model: self.model.clone()
          , messages: vec![
              ChatMessage
              {   role: "system"
                , content: MessageContent::Text(
                    prompt.system_instructions().to_string()
                  )
              }
            , ChatMessage
              {   role: "user"
                , content: user_content
              }
            ]
          , max_tokens: self.max_tokens
          , temperature: self.temperature
          , stream: false
        }
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend
{   fn name(&self) -> &str
    {   &self.model
    }

    async fn generate(
      &self
    , prompt: &ComposedPrompt
    ) -> Result<RawModelOutput>
    {   super::ensure_content(prompt)?;
        debug!(
          "Sending '{}' prompt to {}",
          prompt.task_template_id(), self.model
        );

        let request = self.build_request(prompt);
        trace!(
          "Chat request: model={} messages={}",
          request.model, request.messages.len()
        );

        let response = self.http_client
          .post(super::join_url(&self.endpoint, "chat/completions"))
          .bearer_auth(&self.api_key)
          .json(&request)
          .send()
          .await
          .map_err(|e| super::transport_error(&self.model, e))?;

        let status = response.status();
        trace!("Chat response status: {}", status);

        if !status.is_success()
        {   let error_text = response.text().await.unwrap_or_default();
            return Err(super::status_error(&self.model, status, &error_text));
        }

        let chat_response: ChatResponse
          = response.json().await.map_err(|e| {
            error!("Parse error: {}", e);
            Error::BackendUnavailable(
              format!("{}: malformed response: {}", self.model, e)
            )
          })?;

        let choice = chat_response.choices.into_iter().next()
          .ok_or_else(|| {
            error!("No choices in response");
            Error::BackendUnavailable(
              format!("{}: response contained no choices", self.model)
            )
          })?;

        if choice.finish_reason.as_deref() == Some("content_filter")
        {   return Err(Error::BackendRejected(
              format!("{}: response blocked by content filter", self.model)
            ));
        }

        let text = choice.message.content.unwrap_or_default();
        debug!(
          "Response from {} (first 100 chars): {}",
          self.model, super::truncate(&text, 100)
        );
        Ok(RawModelOutput::new(text))
    }
}
