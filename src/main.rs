use std::path::{Path, PathBuf};
use std::process::ExitCode;
use clap::Parser;
use log::{debug, error};
use docunexus::failover::with_retries;
use docunexus::providers::build_backend;
use docunexus::{
  Engine
, EngineConfig
, Error
, PromptComposer
, Request
, Result
, TaskHint
};

/// Ask the document assistant a question about files or an image
#[derive(Debug, Parser)]
#[command(name = "docunexus", version)]
struct Cli
{   /// Plain-text document to use as context (repeatable, in priority order)
    #[arg(long = "doc", value_name = "FILE")]
    docs: Vec<PathBuf>
  , /// Image to analyze (PNG, JPEG, GIF or WEBP)
    #[arg(long, value_name = "FILE")]
    image: Option<PathBuf>
  , /// Task: general, summarize, analyze, vision or any custom name
    #[arg(long, default_value = "general")]
    task: String
  , /// Send text-only requests to the multimodal backend
    #[arg(long)]
    multimodal: bool
  , /// JSON configuration file; environment variables are used otherwise
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>
  , /// The question or instruction
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>
}

fn read_file(path: &Path) -> Result<Vec<u8>>
{   std::fs::read(path).map_err(|e| {
      Error::InvalidRequest(format!("cannot read {}: {}", path.display(), e))
    })
}

fn build_request(cli: &Cli) -> Result<Request>
{   let mut documents = Vec::with_capacity(cli.docs.len());
    for path in &cli.docs
    {   let bytes = read_file(path)?;
        let text = String::from_utf8(bytes).map_err(|_| {
          Error::InvalidRequest(
            format!("{} is not UTF-8 text", path.display())
          )
        })?;
        documents.push(text);
    }

    let task: TaskHint = cli.task.parse().unwrap_or_default();
    let mut request = Request::text(cli.prompt.join(" "))
      .with_documents(documents)
      .with_task(task)
      .force_multimodal(cli.multimodal);
    if let Some(path) = &cli.image
    {   request = request.with_image(read_file(path)?);
    }
    Ok(request)
}

async fn run(cli: Cli) -> Result<()>
{   let config = match &cli.config
    {   Some(path) => EngineConfig::from_json_file(path)?
      , None => EngineConfig::from_env()?
    };
    let engine = Engine::new(
      with_retries(build_backend(&config.text)?, &config.retry)
    , with_retries(build_backend(&config.vision)?, &config.retry)
    , PromptComposer::new(config.prompts.clone())
    );
    let request = build_request(&cli)?;
    debug!("Request built with {} documents", request.context_documents.len());

    let reply = engine.handle(request).await?;
    println!("{}", reply.answer);
    if reply.has_thoughts()
    {   println!("\n--- DocuNexus Thoughts ---\n{}", reply.thoughts);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode
{   dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    match run(cli).await
    {   Ok(()) => ExitCode::SUCCESS
      , Err(e) => {
          error!("{}", e);
          eprintln!("{}", e.user_message());
          ExitCode::FAILURE
        }
    }
}
