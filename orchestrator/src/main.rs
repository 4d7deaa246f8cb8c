//! market-graph CLI
//!
//! Inspect configuration and dry-run graphs with echo workers.
//!
//! Usage:
//!   market-graph config
//!   market-graph routes --workers naver_news,reporter
//!   market-graph demo --route naver_news,reporter --query "Weekly recap"

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use market_graph::config::GraphFileConfig;
use market_graph::telemetry::init_tracing;
use market_graph::{
    event_channel, FnWorker, GraphBuilder, GraphEvent, Handoff, SequenceRouter, SharedState,
};

#[derive(Parser)]
#[command(name = "market-graph")]
#[command(about = "Supervisor-routed worker graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a .graph.toml (defaults to searching from the current directory)
    #[arg(long, env = "MARKET_GRAPH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration
    Config,
    /// Show the HTTP route each worker would be exposed on
    Routes {
        /// Comma-separated worker names
        #[arg(long, value_delimiter = ',', required = true)]
        workers: Vec<String>,
    },
    /// Run a scripted graph of echo workers
    Demo {
        /// Comma-separated worker names, in the order the router picks them
        #[arg(long, value_delimiter = ',', required = true)]
        route: Vec<String>,

        /// Initial user query
        #[arg(long, short)]
        query: String,

        /// Override the step limit (0 = unbounded)
        #[arg(long)]
        max_steps: Option<usize>,

        /// Print graph events as JSON lines
        #[arg(long)]
        events: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let file_config = match &cli.config {
        Some(path) => GraphFileConfig::load_from_path(path)?,
        None => GraphFileConfig::load()?,
    };

    match cli.command {
        Commands::Config => {
            print!("{}", file_config.to_toml()?);
        }

        Commands::Routes { workers } => {
            let mut builder = GraphBuilder::new()
                .with_router(SequenceRouter::default())
                .with_config(file_config.graph);
            for name in &workers {
                builder.add_worker(name.clone(), echo_worker(name));
            }

            let graph = builder.build()?;
            println!("Routes:");
            for route in graph.routes() {
                if route.description.is_empty() {
                    println!("  POST {} -> {}", route.path, route.name);
                } else {
                    println!("  POST {} -> {} ({})", route.path, route.name, route.description);
                }
            }
        }

        Commands::Demo {
            route,
            query,
            max_steps,
            events,
        } => {
            let mut config = file_config.graph;
            if let Some(max) = max_steps {
                config.max_steps = max;
            }

            let (tx, mut rx) = event_channel();
            let mut builder = GraphBuilder::new()
                .with_router(SequenceRouter::new(route.clone()))
                .with_config(config)
                .with_event_sender(tx);
            for name in &route {
                builder.add_worker(name.clone(), echo_worker(name));
            }
            let graph = builder.build()?;
            // Drop the builder so its sender clone does not keep the channel open
            drop(builder);

            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if events {
                        print_event(&event);
                    }
                }
            });

            let mut execution = graph.start(SharedState::from_query(query));
            let result = execution.run_to_end().await;
            drop(graph);

            if let Err(e) = result {
                let failed_step = execution.steps().len() + 1;
                // Releases the execution's sender so the printer can finish
                let state = execution.into_state();
                printer.await?;
                if e.is_step_failure() {
                    println!("\nCommitted history (step {} failed):", failed_step);
                    print_history(&state);
                }
                return Err(e.into());
            }

            let outcome = execution.into_outcome();
            printer.await?;

            println!("\nHistory:");
            print_history(&outcome.state);
            println!("\nStatus: {:?}", outcome.status);
            println!("Steps: {}", outcome.steps.len());
            println!("Total duration: {}ms", outcome.total_duration_ms());
        }
    }

    Ok(())
}

fn echo_worker(name: &str) -> FnWorker {
    let worker = name.to_string();
    FnWorker::new(move |state: &SharedState| {
        let query = state
            .history()
            .first()
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        Ok(Handoff::reply(worker.clone(), format!("{} handled: {}", worker, query)))
    })
    .with_description(format!("Echo worker '{}'", name))
}

fn print_history(state: &SharedState) {
    for message in state.history() {
        println!("  [{}] {}", message.producer(), message.content());
    }
}

fn print_event(event: &GraphEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!("Failed to serialize event: {}", e),
    }
}
