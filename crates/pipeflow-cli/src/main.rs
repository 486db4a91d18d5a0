mod config;
mod render;

use anyhow::{anyhow, Context};
use clap::Parser;
use pipeflow_canvas::MemoryCanvas;
use pipeflow_client::{ConnectionController, PipelineError};
use pipeflow_types::FlowData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LoggingConfig};

#[derive(Parser)]
#[command(name = "pipeflow", version, about = "Run a pipeline and watch its nodes stream")]
struct Cli {
    /// Flow JSON exported from the editor
    #[arg(short, long)]
    flow: PathBuf,

    /// User message sent to the pipeline
    #[arg(short, long)]
    message: String,

    /// Pipeline to execute (overrides config)
    #[arg(short, long)]
    pipeline: Option<String>,

    /// Continue an existing conversation thread
    #[arg(short, long)]
    thread: Option<String>,

    /// Execution API root (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    /// Print the whole response as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load()
        .map_err(|e| anyhow!("Failed to load configuration: {}", e))?;
    init_logging(&config.logging);

    if let Some(pipeline) = &cli.pipeline {
        config.client.pipeline_id = Some(pipeline.clone());
    }
    if let Some(base_url) = &cli.base_url {
        config.client.base_url = base_url.clone();
    }

    let flow = load_flow(&cli.flow)?;
    tracing::info!(
        nodes = flow.nodes.len(),
        edges = flow.edges.len(),
        "Loaded flow from {}",
        cli.flow.display()
    );

    let canvas = Arc::new(MemoryCanvas::new(flow));
    let mut builder = ConnectionController::builder()
        .config(config.client.clone())
        .canvas(canvas.clone());
    if let Some(thread) = &cli.thread {
        builder = builder.thread_id(thread.clone());
    }
    let controller = Arc::new(builder.build()?);

    let renderer = tokio::spawn(render::watch_canvas(canvas.clone(), config.render.clone()));
    let interrupt = tokio::spawn({
        let controller = controller.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, stopping run");
                controller.stop();
            }
        }
    });

    let outcome = controller.send_message(cli.message.clone()).await;
    interrupt.abort();
    renderer.abort();

    render::print_summary(&canvas, config.render.preview_chars);

    match outcome {
        Ok(response) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.response);
                if let Some(thread) = &response.thread_id {
                    eprintln!("thread: {}", thread);
                }
                eprintln!("last node: {} ({} ms)", response.last_node_id, response.time_taken);
            }
            Ok(())
        }
        Err(PipelineError::Cancelled) => {
            eprintln!("Run stopped");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn load_flow(path: &Path) -> anyhow::Result<FlowData> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read flow file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Flow file {} is not valid JSON", path.display()))?;
    FlowData::from_value(value).context("Flow file does not describe a pipeline graph")
}

fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}
