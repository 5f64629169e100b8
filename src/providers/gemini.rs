//! Google generateContent backend

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::request::{ComposedPrompt, ContentPart, RawModelOutput};
use super::ModelBackend;

// ===== Request Types =====

#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest
{   pub system_instruction: Content
  , pub contents: Vec<Content>
  , #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content
{   #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<String>
  , #[serde(default)]
    pub parts: Vec<Part>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part
{   #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>
  , #[serde(skip_serializing_if = "Option::is_none", default)]
    pub inline_data: Option<InlineData>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineData
{   pub mime_type: String
  , pub data: String
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationConfig
{   #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>
}

// ===== Response Types =====

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse
{   #[serde(default)]
    pub candidates: Vec<Candidate>
  , #[serde(rename = "promptFeedback", default)]
    pub prompt_feedback: Option<PromptFeedback>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate
{   #[serde(default)]
    pub content: Option<Content>
  , #[serde(rename = "finishReason", default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptFeedback
{   #[serde(rename = "blockReason", default)]
    pub block_reason: Option<String>
}

fn text_part(text: impl Into<String>) -> Part
{   Part
    {   text: Some(text.into())
      , inline_data: None
    }
}

/// Adapter for the Gemini `models/{model}:generateContent` API
pub struct GeminiBackend
{   endpoint: String
  , api_key: String
  , model: String
  , max_output_tokens: Option<u32>
  , temperature: Option<f32>
  , http_client: reqwest::Client
}

impl GeminiBackend
{   pub fn new(config: &BackendConfig) -> Result<Self>
    {   debug!("Creating GeminiBackend for {}", config.model);
        Ok(GeminiBackend
        {   endpoint: config.endpoint.clone()
          , api_key: config.api_key.clone()
          , model: config.model.clone()
          , max_output_tokens: config.max_output_tokens
          , temperature: config.temperature
          , http_client: super::http_client(config)?
        })
    }

    pub fn build_request(&self, prompt: &ComposedPrompt) -> GenerateRequest
    {   let parts = prompt.user_content()
          .iter()
          .map(|part| match part
          {   ContentPart::Text(text) => text_part(text.clone())
            , ContentPart::Image { mime_type, data } => Part
              {   text: None
                , inline_data: Some(InlineData
                  {   mime_type: mime_type.clone()
                    , data: BASE64.encode(data)
                  })
              }
          })
          .collect();

        GenerateRequest
        {   system_instruction: Content
            {   role: None
              , parts: vec![text_part(prompt.system_instructions())]
            }
          , contents: vec![
              Content
              {   role: Some("user".to_string())
                , parts
              }
            ]
          , generation_config: GenerationConfig
            {   max_output_tokens: self.max_output_tokens
              , temperature: self.temperature
            }
        }
    }
}

/// Concatenate the text parts of the first candidate
fn extract_text(model: &str, response: GenerateResponse) -> Result<String>
{   if let Some(reason) = response.prompt_feedback
      .and_then(|f| f.block_reason)
    {   error!("Prompt blocked: {}", reason);
        return Err(Error::BackendRejected(
          format!("{}: prompt blocked ({})", model, reason)
        ));
    }

    let candidate = response.candidates.into_iter().next()
      .ok_or_else(|| {
        error!("No candidates in response");
        Error::BackendUnavailable(
          format!("{}: response contained no candidates", model)
        )
      })?;

    if candidate.finish_reason.as_deref() == Some("SAFETY")
    {   return Err(Error::BackendRejected(
          format!("{}: response blocked by safety filter", model)
        ));
    }

    let text: String = candidate.content
      .map(|c| c.parts)
      .unwrap_or_default()
      .into_iter()
      .filter_map(|p| p.text)
      .collect();
    Ok(text)
}

#[async_trait]
impl ModelBackend for GeminiBackend
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
        let url = super::join_url(
          &self.endpoint,
          &format!("models/{}:generateContent", self.model)
        );

        let response = self.http_client
          .post(url)
          .header("x-goog-api-key", &self.api_key)
          .json(&request)
          .send()
          .await
          .map_err(|e| super::transport_error(&self.model, e))?;

        let status = response.status();
        trace!("Gemini response status: {}", status);

        if !status.is_success()
        {   let error_text = response.text().await.unwrap_or_default();
            return Err(super::status_error(&self.model, status, &error_text));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
          error!("Parse error: {}", e);
          Error::BackendUnavailable(
            format!("{}: malformed response: {}", self.model, e)
          )
        })?;

        let text = extract_text(&self.model, body)?;
        debug!(
          "Response from {} (first 100 chars): {}",
          self.model, super::truncate(&text, 100)
        );
        Ok(RawModelOutput::new(text))
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GenerateResponse
    {   serde_json::from_value(value).expect("response")
    }

    #[test]
    fn joins_candidate_parts()
    {   let response = parse(json!({
          "candidates": [{
            "content": { "role": "model", "parts": [
              { "text": "Hello " }, { "text": "world" }
            ]},
            "finishReason": "STOP"
          }]
        }));
        assert_eq!(extract_text("m", response), Ok("Hello world".to_string()));
    }

    #[test]
    fn blocked_prompt_is_rejection()
    {   let response = parse(json!({
          "promptFeedback": { "blockReason": "SAFETY" }
        }));
        assert!(matches!(
          extract_text("m", response),
          Err(Error::BackendRejected(_))
        ));
    }

    #[test]
    fn missing_candidates_is_unavailable()
    {   let response = parse(json!({ "candidates": [] }));
        assert!(matches!(
          extract_text("m", response),
          Err(Error::BackendUnavailable(_))
        ));
    }
}
