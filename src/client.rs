//! Background service owning an [`Engine`], fed over channels
//!
//! UI event loops that must not await a model call can queue requests here
//! and poll the reply channel later.

use std::sync::Arc;
use tokio::sync::mpsc;
use log::{debug, error, info};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::request::{Reply, Request};

// ===== HandleRequest =====

pub type HandleReply = Result<Reply>;
pub type HandleReplySender = mpsc::UnboundedSender<HandleReply>;

pub struct HandleRequestArgs
{   pub request: Request
  , pub reply: HandleReplySender
}

// ===== Shutdown =====

pub type ShutdownReply = Result<()>;
pub type ShutdownReplySender = mpsc::UnboundedSender<ShutdownReply>;

pub struct ShutdownArgs
{   pub reply: ShutdownReplySender
}

// ===== EngineHand (sender side) =====

pub struct EngineHand
{   pub handle_request_tx: mpsc::UnboundedSender<HandleRequestArgs>
  , pub shutdown_tx: mpsc::UnboundedSender<ShutdownArgs>
}

// ===== EngineFoot (receiver side) =====

pub struct EngineFoot
{   pub handle_request_rx: mpsc::UnboundedReceiver<HandleRequestArgs>
  , pub shutdown_rx: mpsc::UnboundedReceiver<ShutdownArgs>
}

/// Public API for the engine service - owns the task
pub struct EngineService
{   hand: EngineHand
  , task_handle: tokio::task::JoinHandle<()>
}

impl EngineService
{   /// Spawn the service loop; must be called inside a tokio runtime
    pub fn spawn(engine: Arc<Engine>) -> Self
    {   debug!("Creating EngineService with task ownership");

        let (handle_request_tx, handle_request_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

        let hand = EngineHand
        {   handle_request_tx
          , shutdown_tx
        };
        let foot = EngineFoot
        {   handle_request_rx
          , shutdown_rx
        };

        let task_handle = tokio::spawn(async move {
          run_service_loop(foot, engine).await
        });

        EngineService
        {   hand
          , task_handle
        }
    }

    /// Queue a request - returns immediately
    pub fn submit(
      &self
    , request: Request
    ) -> Result<mpsc::UnboundedReceiver<HandleReply>>
    {   let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        self.hand.handle_request_tx
          .send(HandleRequestArgs
          {   request
            , reply: reply_tx
          })
          .map_err(|_| {
            error!("Engine service channel closed");
            Error::BackendUnavailable(
              "engine service is not running".to_string()
            )
          })?;

        Ok(reply_rx)
    }

    /// Queue a request and wait for its reply
    pub async fn ask(&self, request: Request) -> Result<Reply>
    {   let mut reply_rx = self.submit(request)?;
        reply_rx.recv().await.unwrap_or_else(|| {
          Err(Error::BackendUnavailable(
            "engine service dropped the request".to_string()
          ))
        })
    }

    /// Gracefully shutdown the service
    ///
    /// Requests already dispatched keep running to completion.
    pub async fn shutdown(self) -> Result<()>
    {   debug!("Shutting down EngineService");
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        self.hand.shutdown_tx
          .send(ShutdownArgs { reply: reply_tx })
          .map_err(|_| {
            error!("Engine service already closed");
            Error::BackendUnavailable(
              "engine service already shut down".to_string()
            )
          })?;

        let result = reply_rx.recv().await.unwrap_or(Ok(()));
        if let Err(e) = self.task_handle.await
        {   error!("Engine service task ended abnormally: {}", e);
        }
        debug!("Engine service shutdown confirmed");
        result
    }
}

/// Main service event loop
///
/// `select!` only routes: each request is spawned onto its own task so a
/// slow model call never holds up the next request.
async fn run_service_loop(foot: EngineFoot, engine: Arc<Engine>)
{   debug!("Starting EngineService event loop");
    let EngineFoot
    {   mut handle_request_rx
      , mut shutdown_rx
    } = foot;

    loop
    { tokio::select!
      { Some(cmd) = handle_request_rx.recv() => {
          debug!("Received HandleRequest ({})", cmd.request.task_hint);
          let engine = Arc::clone(&engine);
          tokio::spawn(async move {
            let result = engine.handle(cmd.request).await;
            let _ = cmd.reply.send(result);
          });
        }
      , Some(cmd) = shutdown_rx.recv() => {
          debug!("Received Shutdown");
          let _ = cmd.reply.send(Ok(()));
          info!("EngineService shutting down");
          break;
        }
      , else => {
          debug!("All service channels closed");
          break;
        }
      }
    }
}
