use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};
use docunexus::{
  ComposedPrompt
, ContentPart
, Engine
, EngineService
, Error
, ModelBackend
, PromptComposer
, PromptConfig
, RawModelOutput
, Reply
, Request
, Result
, TaskHint
};

fn init_logging()
{   let _ = env_logger::builder().is_test(true).try_init();
}

/// In-memory backend returning one fixed result and recording prompts
struct ScriptedBackend
{   label: &'static str
  , result: Result<RawModelOutput>
  , seen: Mutex<Vec<ComposedPrompt>>
  , calls: AtomicUsize
}

impl ScriptedBackend
{   fn replying(label: &'static str, text: &str) -> Arc<Self>
    {   Self::with_result(label, Ok(RawModelOutput::new(text)))
    }

    fn with_result(label: &'static str, result: Result<RawModelOutput>) -> Arc<Self>
    {   Arc::new(ScriptedBackend
        {   label
          , result
          , seen: Mutex::new(vec![])
          , calls: AtomicUsize::new(0)
        })
    }

    fn calls(&self) -> usize
    {   self.calls.load(Ordering::SeqCst)
    }

    fn last_prompt(&self) -> ComposedPrompt
    {   self.seen.lock().expect("lock")
          .last()
          .cloned()
          .expect("backend was called")
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend
{   fn name(&self) -> &str
    {   self.label
    }

    async fn generate(&self, prompt: &ComposedPrompt) -> Result<RawModelOutput>
    {   self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().expect("lock").push(prompt.clone());
        self.result.clone()
    }
}

fn engine(text: &Arc<ScriptedBackend>, vision: &Arc<ScriptedBackend>) -> Engine
{   Engine::new(text.clone(), vision.clone(), PromptComposer::default())
}

#[tokio::test]
async fn test_summarize_scenario()
{   init_logging();
    let text = ScriptedBackend::replying(
      "text",
      "Revenue grew 10%. ###THOUGHTS### The document states a 10% figure."
    );
    let vision = ScriptedBackend::replying("vision", "unused");
    let engine = engine(&text, &vision);

    let request = Request::text("Summarize this")
      .with_documents(["Report: Q1 revenue grew 10%."])
      .with_task(TaskHint::Summarize);
    let reply = assert_ok!(engine.handle(request).await);

    assert_eq!(
      reply,
      Reply
      {   answer: "Revenue grew 10%.".to_string()
        , thoughts: "The document states a 10% figure.".to_string()
      }
    );
    assert_eq!(text.calls(), 1);
    assert_eq!(vision.calls(), 0);

    let prompt = text.last_prompt();
    assert_eq!(prompt.task_template_id(), "summarize");
    assert!(prompt.user_text().contains("Report: Q1 revenue grew 10%."));
    assert!(prompt.user_content().iter().all(|p| !p.is_image()));
}

#[tokio::test]
async fn test_vision_reply_without_marker()
{   init_logging();
    let answer = "A person holding a coffee mug in front of a bookshelf.";
    let text = ScriptedBackend::replying("text", "unused");
    let vision = ScriptedBackend::replying("vision", answer);
    let engine = engine(&text, &vision);

    let request = Request::text("What do you see?")
      .with_image(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00])
      .with_task(TaskHint::Vision);
    let reply = assert_ok!(engine.handle(request).await);

    assert_eq!(reply.answer, answer);
    assert_eq!(reply.thoughts, "");
    assert_eq!(vision.calls(), 1);
    assert_eq!(text.calls(), 0);

    let prompt = vision.last_prompt();
    assert_eq!(prompt.task_template_id(), "vision_analysis");
    assert!(matches!(
      prompt.user_content().last(),
      Some(ContentPart::Image { mime_type, .. }) if mime_type == "image/jpeg"
    ));
}

#[tokio::test]
async fn test_image_routes_to_vision_for_any_hint()
{   let text = ScriptedBackend::replying("text", "t");
    let vision = ScriptedBackend::replying("vision", "v");
    let engine = engine(&text, &vision);

    for hint in [TaskHint::General, TaskHint::Summarize, TaskHint::Analyze, TaskHint::Custom]
    {   let request = Request::text("describe")
          .with_image(vec![1, 2, 3])
          .with_task(hint);
        let reply = assert_ok!(engine.handle(request).await);
        assert_eq!(reply.answer, "v");
    }
    assert_eq!(text.calls(), 0);
    assert_eq!(vision.calls(), 4);
}

#[tokio::test]
async fn test_vision_hint_without_image_is_rejected()
{   let text = ScriptedBackend::replying("text", "t");
    let vision = ScriptedBackend::replying("vision", "v");
    let engine = engine(&text, &vision);

    let request = Request::text("What is on my desk?")
      .with_task(TaskHint::Vision);
    let err = assert_err!(engine.handle(request).await);

    assert!(matches!(err, Error::InvalidRequest(_)));
    assert_eq!(text.calls() + vision.calls(), 0);
}

#[tokio::test]
async fn test_blank_request_is_rejected()
{   let text = ScriptedBackend::replying("text", "t");
    let vision = ScriptedBackend::replying("vision", "v");
    let engine = engine(&text, &vision);

    let err = assert_err!(engine.handle(Request::text("   ")).await);
    assert!(matches!(err, Error::InvalidRequest(_)));
    assert_eq!(text.calls(), 0);
}

#[tokio::test]
async fn test_documents_dropped_by_budget_never_reach_backend()
{   let text = ScriptedBackend::replying("text", "ok");
    let vision = ScriptedBackend::replying("vision", "v");
    let composer = PromptComposer::new(PromptConfig
    {   max_context_chars: Some(0)
      , ..PromptConfig::default()
    });
    let engine = Engine::new(text.clone(), vision.clone(), composer);

    let request = Request::text("").with_documents(["only a document"]);
    let err = assert_err!(engine.handle(request).await);
    assert!(matches!(err, Error::InvalidRequest(_)));
    assert_eq!(text.calls() + vision.calls(), 0);
}

#[tokio::test]
async fn test_backend_unavailable_propagates_unchanged()
{   init_logging();
    let failure = Error::BackendUnavailable("connection reset".to_string());
    let text = ScriptedBackend::with_result("text", Err(failure.clone()));
    let vision = ScriptedBackend::replying("vision", "v");
    let engine = engine(&text, &vision);

    let result = engine.handle(Request::text("Hello")).await;
    assert_eq!(result, Err(failure));
    assert_eq!(text.calls(), 1);
}

#[tokio::test]
async fn test_backend_rejection_propagates_unchanged()
{   let failure = Error::BackendRejected("payload too large".to_string());
    let text = ScriptedBackend::replying("text", "t");
    let vision = ScriptedBackend::with_result("vision", Err(failure.clone()));
    let engine = engine(&text, &vision);

    let request = Request::text("look").with_image(vec![9; 16]);
    assert_eq!(engine.handle(request).await, Err(failure));
}

#[tokio::test]
async fn test_forced_multimodal_text_request()
{   let text = ScriptedBackend::replying("text", "t");
    let vision = ScriptedBackend::replying("vision", "Hello ###THOUGHTS### greeted");
    let engine = engine(&text, &vision);

    let request = Request::text("Say hello").force_multimodal(true);
    let reply = assert_ok!(engine.handle(request).await);

    assert_eq!(reply.answer, "Hello");
    assert_eq!(reply.thoughts, "greeted");
    assert!(vision.last_prompt().user_content().iter().all(|p| !p.is_image()));
}

#[tokio::test]
async fn test_context_documents_keep_order()
{   let text = ScriptedBackend::replying("text", "ok");
    let vision = ScriptedBackend::replying("vision", "v");
    let engine = engine(&text, &vision);

    let request = Request::text("Compare them")
      .with_documents(["doc1", "doc2"])
      .with_task(TaskHint::Analyze);
    assert_ok!(engine.handle(request).await);

    let user_text = text.last_prompt().user_text();
    let first = user_text.find("doc1").expect("doc1");
    let second = user_text.find("doc2").expect("doc2");
    let question = user_text.find("Compare them").expect("question");
    assert!(first < second && second < question);
}

#[tokio::test]
async fn test_concurrent_requests_are_independent()
{   let text = ScriptedBackend::replying("text", "same ###THOUGHTS### why");
    let vision = ScriptedBackend::replying("vision", "v");
    let engine = Arc::new(engine(&text, &vision));

    let mut tasks = Vec::new();
    for i in 0..8
    {   let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
          engine.handle(Request::text(format!("question {}", i))).await
        }));
    }
    for task in tasks
    {   let reply = assert_ok!(task.await.expect("join"));
        assert_eq!(reply.answer, "same");
    }
    assert_eq!(text.calls(), 8);
}

#[tokio::test]
async fn test_service_round_trip()
{   init_logging();
    let text = ScriptedBackend::replying("text", "42 ###THOUGHTS### arithmetic");
    let vision = ScriptedBackend::replying("vision", "v");
    let service = EngineService::spawn(Arc::new(engine(&text, &vision)));

    let reply = assert_ok!(service.ask(Request::text("What is 40+2?")).await);
    assert_eq!(reply.answer, "42");
    assert_eq!(reply.thoughts, "arithmetic");

    let mut rx = assert_ok!(
      service.submit(Request::text("x").with_task(TaskHint::Vision))
    );
    let result = rx.recv().await.expect("reply");
    assert!(matches!(result, Err(Error::InvalidRequest(_))));

    assert_ok!(service.shutdown().await);
}
