//! Builds model input from fixed per-task templates

use log::{debug, warn};
use crate::config::PromptConfig;
use crate::request::{BackendChoice, ComposedPrompt, ContentPart, Request, TaskHint};
use crate::splitter::THOUGHTS_MARKER;

const TRUNCATION_NOTE: &str = "\n[truncated]";

/// Directive added when an image travels with the prompt
const VISION_DIRECTIVE: &str = "An image is attached. Describe and analyze \
  what is visible in it (objects, text, people, scenes and activities) and \
  ground your answer in that visual content.";

/// Fixed wording for one task type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate
{   pub id: &'static str
  , pub heading: &'static str
  , pub focus: &'static str
  , pub guidelines: &'static [&'static str]
  , pub default_length: &'static str
}

pub static GENERAL_TEMPLATE: PromptTemplate = PromptTemplate
{   id: "general"
  , heading: "General Inquiry"
  , focus: "Answer the user's question, incorporating any context provided."
  , guidelines: &[
      "Provide a clear and helpful answer that directly addresses the question."
    , "Say so plainly when the context does not contain the answer."
    ]
  , default_length: "clear"
};

pub static SUMMARIZE_TEMPLATE: PromptTemplate = PromptTemplate
{   id: "summarize"
  , heading: "Summarization Task"
  , focus: "Summarize the provided content according to the user's request."
  , guidelines: &[
      "Focus on key themes, figures and conclusions."
    , "Leave out detail that does not serve the user's request."
    ]
  , default_length: "concise"
};

pub static ANALYSIS_TEMPLATE: PromptTemplate = PromptTemplate
{   id: "document_analysis"
  , heading: "Document Analysis Task"
  , focus: "Deeply analyze the provided documents and respond to the user's request."
  , guidelines: &[
      "Provide a detailed answer that directly addresses the user's request."
    , "Use bullet points or numbered lists where they help clarity."
    , "Extract key insights and actionable information from the documents."
    ]
  , default_length: "comprehensive"
};

pub static VISION_TEMPLATE: PromptTemplate = PromptTemplate
{   id: "vision_analysis"
  , heading: "Vision Analysis Task"
  , focus: "Analyze the attached image and answer the user's question about it."
  , guidelines: &[
      "Identify objects, scenes and activities visible in the image."
    , "Offer interpretations only where the image supports them."
    ]
  , default_length: "detailed"
};

/// Template registered for a task hint, if any
pub fn template_for(hint: TaskHint) -> Option<&'static PromptTemplate>
{   match hint
    {   TaskHint::General => Some(&GENERAL_TEMPLATE)
      , TaskHint::Summarize => Some(&SUMMARIZE_TEMPLATE)
      , TaskHint::Analyze => Some(&ANALYSIS_TEMPLATE)
      , TaskHint::Vision => Some(&VISION_TEMPLATE)
      , TaskHint::Custom => None
    }
}

/// MIME type from the leading bytes; JPEG when unrecognized
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str
{   if bytes.starts_with(b"\x89PNG\r\n\x1a\n")
    {   "image/png"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a")
    {   "image/gif"
    } else if bytes.len() >= 12
      && &bytes[..4] == b"RIFF"
      && &bytes[8..12] == b"WEBP"
    {   "image/webp"
    } else
    {   "image/jpeg"
    }
}

/// Composes prompts; holds only read-only settings
#[derive(Debug, Clone, Default)]
pub struct PromptComposer
{   config: PromptConfig
}

impl PromptComposer
{   pub fn new(config: PromptConfig) -> Self
    {   PromptComposer { config }
    }

    pub fn config(&self) -> &PromptConfig
    {   &self.config
    }

    pub fn compose(
      &self
    , request: &Request
    , choice: BackendChoice
    ) -> ComposedPrompt
    {   let template = template_for(request.task_hint)
          .unwrap_or_else(|| {
            warn!(
              "No template for task hint '{}', using '{}'",
              request.task_hint, GENERAL_TEMPLATE.id
            );
            &GENERAL_TEMPLATE
          });
        debug!("Composing prompt with template '{}'", template.id);

        let image = match choice
        {   BackendChoice::VisionModel => request.image()
          , BackendChoice::TextModel => None
        };

        let system_instructions
          = self.system_instructions(template, image.is_some());

        let mut user_content = Vec::new();
        let documents = fit_documents(
          &request.context_documents,
          self.config.max_context_chars
        );
        for (index, document) in documents.into_iter().enumerate()
        {   user_content.push(ContentPart::Text(
              format!("[Document {}]\n{}", index + 1, document)
            ));
        }

        let prompt = request.text_prompt.trim();
        if !prompt.is_empty()
        {   user_content.push(ContentPart::Text(
              format!("User request:\n{}", prompt)
            ));
        } else if image.is_some()
        {   user_content.push(ContentPart::Text(
              "User request:\nDescribe what is visible in this image."
                .to_string()
            ));
        }

        if let Some(bytes) = image
        {   user_content.push(ContentPart::Image
            {   mime_type: sniff_image_mime(bytes).to_string()
              , data: bytes.to_vec()
            });
        }

        ComposedPrompt::new(system_instructions, user_content, template.id)
    }

    fn system_instructions(
      &self
    , template: &PromptTemplate
    , with_image: bool
    ) -> String
    {   let length = self.config.response_length
          .as_deref()
          .unwrap_or(template.default_length);

        let mut out = String::new();
        out.push_str(self.config.persona.trim());
        out.push_str("\n\n[");
        out.push_str(template.heading);
        out.push_str("]\n");
        out.push_str(template.focus);
        out.push_str(&format!(
          " Write a {} response in {}.\n\nResponse guidelines:\n",
          length, self.config.language
        ));
        for line in template.guidelines
        {   out.push_str("* ");
            out.push_str(line);
            out.push('\n');
        }
        if with_image
        {   out.push('\n');
            out.push_str(VISION_DIRECTIVE);
            out.push('\n');
        }
        out.push_str(&format!(
          "\nOutput format:\nWrite your final answer first. Then, on a new \
           line, write the marker {} followed by a short step-by-step \
           explanation of your reasoning. Never put any part of the answer \
           after the marker.",
          THOUGHTS_MARKER
        ));
        out
    }
}

/// Apply the context budget, cutting from the end
///
/// Earlier documents have priority: later ones are shortened first and
/// dropped once nothing is left. Blank documents are skipped.
fn fit_documents(
  documents: &[String]
, max_chars: Option<usize>
) -> Vec<String>
{   let mut remaining = max_chars.unwrap_or(usize::MAX);
    let mut kept = Vec::with_capacity(documents.len());

    for (position, document) in documents.iter().enumerate()
    {   let document = document.trim();
        if document.is_empty()
        {   continue;
        }
        if remaining == 0
        {   debug!("Dropping document {} over context budget", position + 1);
            continue;
        }
        let length = document.chars().count();
        if length <= remaining
        {   remaining -= length;
            kept.push(document.to_string());
        } else
        {   debug!(
              "Truncating document {} from {} to {} chars",
              position + 1, length, remaining
            );
            let mut cut: String = document.chars().take(remaining).collect();
            cut.push_str(TRUNCATION_NOTE);
            remaining = 0;
            kept.push(cut);
        }
    }
    kept
}
