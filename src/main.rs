//! Malscan Core - Main Entry Point
//!
//! Sandbox-report classification service: trains the ensemble from a
//! labelled report corpus, scores individual reports, and drives full
//! submit-detonate-score cycles against an external sandbox.

mod constants;
mod error;
mod logic;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info};

use error::Result;
use logic::pipeline::ScoringPipeline;
use logic::report::Report;
use logic::sandbox::{SandboxApi, SandboxClient, SandboxConfig};
use logic::task::{Orchestrator, TaskStore};
use logic::training::{ArtifactStore, TrainingController};

#[derive(Parser)]
#[command(name = constants::APP_NAME, version = constants::APP_VERSION)]
#[command(about = "Sandbox report classification engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train the ensemble from a labelled report corpus
    Train {
        /// Directory with clean/ and malicious/ report subdirectories
        dataset: PathBuf,
        /// Retrain even when models match the current corpus
        #[arg(long)]
        force: bool,
    },
    /// Score one or more sandbox report files
    Score {
        /// Paths to report JSON files
        #[arg(required = true)]
        reports: Vec<PathBuf>,
    },
    /// Submit a sample to the sandbox and score its report
    Submit {
        /// Path to the sample file
        file: PathBuf,
        /// Give up after this many seconds of waiting for the report
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },
    /// List tracked tasks and their states
    Tasks,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Train { dataset, force } => {
            let store = ArtifactStore::new(constants::get_artifact_dir())?;
            let controller = TrainingController::new(store);
            let report = controller.ensure_trained(&dataset, force)?;
            print!("{}", report.summary());
        }
        Command::Score { reports } => {
            let store = ArtifactStore::new(constants::get_artifact_dir())?;
            let pipeline = ScoringPipeline::load(&store)?;
            for path in reports {
                let report = Report::from_path(&path)?;
                let verdict = pipeline.score_report(&report)?;
                println!("{}\n{}", path.display(), verdict.summary());
            }
        }
        Command::Submit { file, timeout_secs } => {
            submit_and_wait(file, timeout_secs).await?;
        }
        Command::Tasks => {
            let store = TaskStore::open(std::path::Path::new(&constants::get_task_db()))?;
            for task in store.list()? {
                let score = task
                    .verdict
                    .map(|v| format!("{} {:.1}", v.label.as_str(), v.score))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {:<10}  {:<24}  {}",
                    task.id,
                    task.state.as_str(),
                    task.filename,
                    score
                );
            }
        }
    }
    Ok(())
}

async fn submit_and_wait(file: PathBuf, timeout_secs: u64) -> Result<()> {
    let artifact_store = ArtifactStore::new(constants::get_artifact_dir())?;
    let pipeline = Arc::new(ScoringPipeline::load(&artifact_store)?);
    let task_store = Arc::new(TaskStore::open(std::path::Path::new(
        &constants::get_task_db(),
    ))?);
    let sandbox = SandboxClient::new(SandboxConfig::default())?;

    let mut orchestrator = Orchestrator::new(
        task_store.clone(),
        pipeline,
        sandbox.clone(),
        constants::get_processing_expiry_secs(),
    );

    let task_id = orchestrator.submit(file).await?;
    let events = orchestrator.event_sender();
    let event_loop = tokio::spawn(async move { orchestrator.run().await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
    loop {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let Some(task) = task_store.get(task_id)? else {
            break;
        };

        if task.state.is_terminal() {
            match task.verdict {
                Some(verdict) => println!("{}", verdict.summary()),
                None => println!(
                    "task failed: {}",
                    task.reason.unwrap_or_else(|| "unknown".to_string())
                ),
            }
            break;
        }

        // The sandbox does not call back; poll for the report once the
        // submission is in flight. A not-ready report is an expected
        // error here, scoring happens only when the fetch succeeds.
        if let Some(tracking_id) = task.tracking_id {
            match sandbox.fetch_report(tracking_id).await {
                Ok(report) => {
                    let event = logic::task::TaskEvent::analysis_result(tracking_id, report);
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => info!("Report for tracking id {} not ready: {}", tracking_id, e),
            }
        }

        if tokio::time::Instant::now() >= deadline {
            info!("Timed out waiting for task {}", task_id);
            break;
        }
    }

    drop(events);
    event_loop.abort();
    Ok(())
}
