//! Splits raw model output into answer and thoughts

use log::trace;
use crate::request::{RawModelOutput, Reply};

/// Marker every prompt template asks the model to put before its reasoning
pub const THOUGHTS_MARKER: &str = "###THOUGHTS###";

/// Split `raw` at the first thoughts marker
///
/// With a marker, both halves are trimmed. Without one the whole text is
/// the answer, untouched, and thoughts are empty. Never fails.
pub fn split(raw: &RawModelOutput) -> Reply
{   match raw.text.split_once(THOUGHTS_MARKER)
    {   Some((answer, thoughts)) => {
          trace!(
            "Thoughts marker found ({} answer bytes, {} thought bytes)",
            answer.len(),
            thoughts.len()
          );
          Reply
          {   answer: answer.trim().to_string()
            , thoughts: thoughts.trim().to_string()
          }
        }
      , None => {
          trace!("No thoughts marker in model output");
          Reply
          {   answer: raw.text.clone()
            , thoughts: String::new()
          }
        }
    }
}
