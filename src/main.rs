//! streamforge CLI - run a dataflow graph described by a JSON document.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use streamforge::config::SourceCommand;
use streamforge::engine::Engine;
use streamforge::frame::ControlOp;

#[derive(Parser)]
#[command(name = "streamforge")]
#[command(about = "Dataflow runtime for video/image analytics pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a graph JSON document, run it to completion, and print pipe
    /// stats at the end.
    Run {
        /// Path to the graph JSON document.
        graph: PathBuf,

        /// Element id to send a `start` command to on input port 0 once
        /// the graph is running (typically a source worker's id).
        #[arg(long)]
        start_element: Option<u32>,

        /// Channel id forwarded in the start command, when `start_element`
        /// is given.
        #[arg(long, default_value = "0")]
        channel_id: i64,

        /// How long to let the graph run before stopping it, in
        /// milliseconds.
        #[arg(long, default_value = "1000")]
        run_for_ms: u64,
    },
    /// Parse a graph JSON document and report errors without running it.
    Validate {
        /// Path to the graph JSON document.
        graph: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            graph,
            start_element,
            channel_id,
            run_for_ms,
        } => run(graph, start_element, channel_id, run_for_ms),
        Commands::Validate { graph } => validate(graph),
    }
}

fn run(
    graph_path: PathBuf,
    start_element: Option<u32>,
    channel_id: i64,
    run_for_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(&graph_path)?;
    let engine = Engine::new();
    let graph_id = engine.add_graph(&json)?;

    tracing::info!(graph_id, path = %graph_path.display(), "graph loaded");
    engine.start(graph_id)?;

    if let Some(element_id) = start_element {
        tracing::info!(element_id, channel_id, "sending start command");
        let command = SourceCommand {
            channel_id,
            url: String::new(),
            source_type: String::new(),
            timeout: 0,
            resize_rate: 0.0,
            op: ControlOp::Start,
        };
        engine.send_data(graph_id, element_id, 0, Arc::new(command.into()), Duration::from_millis(500))?;
    }

    std::thread::sleep(Duration::from_millis(run_for_ms));
    engine.stop(graph_id)?;

    for stat in engine.graph_stats(graph_id)? {
        tracing::info!(
            element_id = stat.element_id,
            port = stat.port,
            len = stat.len,
            capacity = stat.capacity,
            "final pipe occupancy"
        );
    }
    Ok(())
}

fn validate(graph_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(&graph_path)?;
    let engine = Engine::new();
    match engine.add_graph(&json) {
        Ok(graph_id) => {
            println!("graph {graph_id} is valid");
            Ok(())
        }
        Err(err) => {
            eprintln!("graph is invalid: {err}");
            std::process::exit(1);
        }
    }
}
