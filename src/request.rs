//! Request, prompt and reply types shared by every stage

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Caller-supplied classification of what the request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskHint
{   #[default]
    General
  , Summarize
  , Analyze
  , Vision
  , Custom
}

impl FromStr for TaskHint
{   type Err = std::convert::Infallible;

    /// Never fails: unknown names become `Custom`
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {   let hint = match s.trim().to_ascii_lowercase().as_str()
        {   "general" => TaskHint::General
          , "summarize" | "media_summarization" => TaskHint::Summarize
          , "analyze" | "document_analysis" => TaskHint::Analyze
          , "vision" | "webcam_vision_analysis" => TaskHint::Vision
          , _ => TaskHint::Custom
        };
        Ok(hint)
    }
}

impl fmt::Display for TaskHint
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   let name = match self
        {   TaskHint::General => "general"
          , TaskHint::Summarize => "summarize"
          , TaskHint::Analyze => "analyze"
          , TaskHint::Vision => "vision"
          , TaskHint::Custom => "custom"
        };
        f.write_str(name)
    }
}

/// Normalized request handed over by the UI layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request
{   /// The user's question or instruction
    pub text_prompt: String
  , /// Plain-text documents, highest priority first
    pub context_documents: Vec<String>
  , /// Encoded image bytes (webcam frame, upload)
    pub image_payload: Option<Vec<u8>>
  , pub task_hint: TaskHint
  , /// Route text-only content to the multimodal backend
    pub force_multimodal: bool
}

impl Request
{   pub fn text(prompt: impl Into<String>) -> Self
    {   Request
        {   text_prompt: prompt.into()
          , ..Request::default()
        }
    }

    pub fn with_documents<I, S>(mut self, documents: I) -> Self
    where
      I: IntoIterator<Item = S>
    , S: Into<String>
    {   self.context_documents
          = documents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_image(mut self, bytes: Vec<u8>) -> Self
    {   self.image_payload = Some(bytes);
        self
    }

    pub fn with_task(mut self, hint: TaskHint) -> Self
    {   self.task_hint = hint;
        self
    }

    pub fn force_multimodal(mut self, force: bool) -> Self
    {   self.force_multimodal = force;
        self
    }

    /// The image bytes, treating an empty payload as absent
    pub fn image(&self) -> Option<&[u8]>
    {   self.image_payload
          .as_deref()
          .filter(|bytes| !bytes.is_empty())
    }

    pub fn has_image(&self) -> bool
    {   self.image().is_some()
    }

    /// True when there is nothing at all to send to a model
    pub fn is_blank(&self) -> bool
    {   self.text_prompt.trim().is_empty()
          && self.context_documents.iter().all(|d| d.trim().is_empty())
          && !self.has_image()
    }
}

/// Which backend serves a request; recomputed per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendChoice
{   TextModel
  , VisionModel
}

impl fmt::Display for BackendChoice
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   match self
        {   BackendChoice::TextModel => f.write_str("text")
          , BackendChoice::VisionModel => f.write_str("vision")
        }
    }
}

/// One piece of user content sent to a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart
{   Text(String)
  , Image
    {   mime_type: String
      , data: Vec<u8>
    }
}

impl ContentPart
{   pub fn as_text(&self) -> Option<&str>
    {   match self
        {   ContentPart::Text(text) => Some(text)
          , ContentPart::Image { .. } => None
        }
    }

    pub fn is_image(&self) -> bool
    {   matches!(self, ContentPart::Image { .. })
    }
}

/// Fully assembled model input; read-only after construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt
{   system_instructions: String
  , user_content: Vec<ContentPart>
  , task_template_id: String
}

impl ComposedPrompt
{   pub fn new(
      system_instructions: String
    , user_content: Vec<ContentPart>
    , task_template_id: impl Into<String>
    ) -> Self
    {   ComposedPrompt
        {   system_instructions
          , user_content
          , task_template_id: task_template_id.into()
        }
    }

    pub fn system_instructions(&self) -> &str
    {   &self.system_instructions
    }

    pub fn user_content(&self) -> &[ContentPart]
    {   &self.user_content
    }

    pub fn task_template_id(&self) -> &str
    {   &self.task_template_id
    }

    /// All text parts joined by blank lines
    pub fn user_text(&self) -> String
    {   self.user_content
          .iter()
          .filter_map(ContentPart::as_text)
          .collect::<Vec<_>>()
          .join("\n\n")
    }
}

/// Opaque text returned by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawModelOutput
{   pub text: String
}

impl RawModelOutput
{   pub fn new(text: impl Into<String>) -> Self
    {   RawModelOutput { text: text.into() }
    }
}

/// Outcome of one orchestration call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply
{   pub answer: String
  , /// Reasoning trace, empty when the model gave none
    pub thoughts: String
}

impl Reply
{   pub fn has_thoughts(&self) -> bool
    {   !self.thoughts.is_empty()
    }
}
