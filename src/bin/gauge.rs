#![forbid(unsafe_code)]

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gauge_harness::outcome::{JsonlOutcomeSink, NoopOutcomeSink, OutcomeSink, SavedOutput};
use gauge_harness::task::{model_display_name, TaskSpec, CURATED_MODELS};
use gauge_harness::{OpenRouterClient, Orchestrator, RunStatus};

/// Default backend selection when no --model flags are given.
const DEFAULT_MODELS: &[&str] = &[
    "google/gemini-2.5-flash-lite",
    "meta-llama/llama-3.1-70b-instruct",
];

#[derive(Parser)]
#[command(name = "gauge", version, about = "Gauge harness CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the curated model catalog
    Models,
    /// Run a task against the selected models
    Run {
        /// Task spec JSON file
        #[arg(long)]
        task: PathBuf,

        /// Backend model id (repeatable). Defaults to the curated pair.
        #[arg(long = "model")]
        models: Vec<String>,

        /// Append run outcomes to this JSONL file
        #[arg(long)]
        log: Option<PathBuf>,

        /// Append saved outputs to this JSONL file (with --save-best)
        #[arg(long, requires = "log")]
        saved: Option<PathBuf>,

        /// After the batch, save this model's output as the best one
        #[arg(long, requires = "saved")]
        save_best: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Models => {
            for model in CURATED_MODELS {
                println!("{:<40} {}", model.id, model.name);
            }
        }
        Commands::Run {
            task,
            models,
            log,
            saved,
            save_best,
        } => {
            let spec: TaskSpec = serde_json::from_reader(File::open(&task)?)?;
            let prepared = spec.prepare()?;

            let gateway = Arc::new(OpenRouterClient::from_env()?);
            let sink: Arc<dyn OutcomeSink> = match &log {
                Some(path) => Arc::new(JsonlOutcomeSink::create(path, saved.as_deref())?),
                None => Arc::new(NoopOutcomeSink),
            };

            let orchestrator = Orchestrator::new(gateway, Arc::clone(&sink));
            let selection: Vec<String> = if models.is_empty() {
                DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
            } else {
                models
            };
            for model in &selection {
                orchestrator.select(model.clone()).await;
            }

            orchestrator.run_all_and_wait(&prepared).await;

            for model in &selection {
                let Some(state) = orchestrator.board().get(model).await else {
                    continue;
                };
                println!("== {} ({model})", model_display_name(model));
                match state.status {
                    RunStatus::Succeeded => {
                        println!(
                            "   {:.2}s | {} words | {} attempt(s)",
                            state.elapsed.as_secs_f64(),
                            state.word_count,
                            state.attempts
                        );
                        println!("{}\n", state.output);
                    }
                    RunStatus::Failed => {
                        println!(
                            "   FAILED after {:.2}s: {}\n",
                            state.elapsed.as_secs_f64(),
                            state.error_detail.as_deref().unwrap_or("unknown error")
                        );
                    }
                    RunStatus::Idle | RunStatus::Running => {
                        println!("   still pending (unexpected)\n");
                    }
                }
            }

            if let Some(best) = save_best {
                let Some(state) = orchestrator.board().get(&best).await else {
                    return Err(format!("no run state for model {best}").into());
                };
                if state.status != RunStatus::Succeeded {
                    return Err(format!("model {best} did not succeed; nothing to save").into());
                }
                sink.record_saved(SavedOutput {
                    timestamp_ms: chrono::Utc::now().timestamp_millis(),
                    task_id: spec.id.clone(),
                    backend: best,
                    inputs: spec.inputs.clone(),
                    output_text: state.output,
                })
                .await?;
            }
        }
    }

    Ok(())
}
