//! docunexus: model selection and request orchestration for a
//! document and webcam assistant.
//!
//! A [`Request`] (prompt, optional context documents, optional image) goes
//! through one linear pass:
//!
//! ```text
//! Engine::handle
//!   -> selector::select       text or vision backend
//!   -> PromptComposer::compose task template + context + image
//!   -> ModelBackend::generate  exactly one network call
//!   -> splitter::split         answer / thoughts
//! ```
//!
//! The model is asked to put its reasoning after [`THOUGHTS_MARKER`]; the
//! splitter returns the text before it as the answer and the rest as
//! thoughts. Retries and failover are opt-in wrappers in [`failover`].

pub mod error;
pub mod config;
pub mod request;
pub mod selector;
pub mod composer;
pub mod splitter;
pub mod providers;
pub mod failover;
pub mod engine;
pub mod client;

pub use client::EngineService;
pub use composer::PromptComposer;
pub use config::{BackendConfig, BackendKind, EngineConfig, PromptConfig, RetryConfig};
pub use engine::Engine;
pub use error::{Error, Result};
pub use providers::ModelBackend;
pub use request::{
  BackendChoice
, ComposedPrompt
, ContentPart
, RawModelOutput
, Reply
, Request
, TaskHint
};
pub use splitter::THOUGHTS_MARKER;
