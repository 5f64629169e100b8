//! Picks the backend that serves a request

use log::debug;
use crate::error::{Error, Result};
use crate::request::{BackendChoice, Request, TaskHint};

/// Decide which backend handles `request`
///
/// Image content always goes to the vision backend. A vision task with no
/// image is contradictory and rejected. Text-only requests use the text
/// backend unless the caller forces the multimodal one.
pub fn select(request: &Request) -> Result<BackendChoice>
{   if request.has_image()
    {   debug!("Image present, selecting vision backend");
        return Ok(BackendChoice::VisionModel);
    }

    if request.task_hint == TaskHint::Vision
    {   return Err(Error::InvalidRequest(
          "vision task requires an image payload".to_string()
        ));
    }

    if request.force_multimodal
    {   debug!("Multimodal backend forced for text-only request");
        return Ok(BackendChoice::VisionModel);
    }

    Ok(BackendChoice::TextModel)
}
