//! # nodeflow
//!
//! Command-line runner for NodeFlow pipelines.

mod workspace;

use clap::{Parser, Subcommand};
use nodeflow_core::{run_pipeline, PipelineDescriptor, Status};
use nodeflow_nodes::default_registry;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use workspace::{apply_node_configs, WorkspaceFactory};

#[derive(Parser)]
#[command(name = "nodeflow")]
#[command(about = "NodeFlow - run dataflow pipelines", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline to completion
    Run {
        /// Path to the pipeline YAML
        pipeline: PathBuf,

        /// Workspace directory holding node schemas and configs
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Initial pipeline inputs (key=value), repeatable
        #[arg(short, long = "input", value_name = "KEY=VALUE")]
        input: Vec<String>,
    },

    /// Validate a pipeline descriptor without executing it
    Validate {
        /// Path to the pipeline YAML
        pipeline: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            pipeline,
            workspace,
            input,
        } => {
            let mut descriptor = PipelineDescriptor::from_file(&pipeline)?;
            apply_node_configs(&mut descriptor, &workspace)?;
            tracing::info!(
                pipeline = %pipeline.display(),
                workspace = %workspace.display(),
                "loaded pipeline descriptor"
            );
            let factory = Arc::new(WorkspaceFactory::new(workspace, default_registry()));
            let initial_inputs = parse_inputs(&input);

            let run = run_pipeline(descriptor, factory, initial_inputs).await?;
            println!("{}", serde_json::to_string_pretty(&run.output)?);

            if run.status != Status::Done {
                eprintln!("Pipeline finished with status '{}'", run.status);
                for error in &run.errors {
                    eprintln!("  caused by: {}", error);
                }
                std::process::exit(1);
            }
        }
        Commands::Validate { pipeline } => {
            let descriptor = PipelineDescriptor::from_file(&pipeline)?;
            descriptor.validate()?;
            println!("✓ pipeline is valid");
            println!("  nodes: {}", descriptor.graph.nodes.len());
            println!("  final: {}", descriptor.graph.final_id);
        }
    }

    Ok(())
}

/// Parse repeated `key=value` pairs into a pipeline input map. Values are
/// taken as strings; nodes parse them as needed.
fn parse_inputs(pairs: &[String]) -> Map<String, Value> {
    let mut inputs = Map::new();
    for pair in pairs {
        if let Some((key, value)) = pair.split_once('=') {
            inputs.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    inputs
}
