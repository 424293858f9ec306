//! Exam Proctor - Offline Analyzer
//!
//! Runs the detectors over local files and prints verdict JSON. Handy for
//! calibrating thresholds against recorded sessions.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use proctor_core::constants::{default_data_dir, APP_NAME, APP_VERSION, JOURNAL_FILE};
use proctor_core::logic::model::ProviderSet;
use proctor_core::logic::storage::{AlertFilter, JsonlAlertJournal, MemoryFaceStore};
use proctor_core::{
    DetectionConfig, ProctorError, ProctorResult, ProctoringOrchestrator, RawAudioSubmission, StudentId, Verdict,
};

#[derive(Parser)]
#[command(name = "proctor-analyze", version, about = "Run exam proctoring detectors on local files")]
struct Cli {
    /// JSON detection config; defaults plus PROCTOR_* overrides when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Student the input belongs to; alerting verdicts are journaled for them
    #[arg(long, global = true)]
    student: Option<String>,

    /// JSON-lines alert journal to append to / read from
    /// [default: <local data dir>/proctor/alerts.jsonl]
    #[arg(long, global = true)]
    journal: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Head pose / gaze direction of the primary face
    Head { image: PathBuf },
    /// Forbidden objects and extra persons
    Objects { image: PathBuf },
    /// Audio anomaly check on a `{student_id, audio_features}` JSON file
    Audio { payload: PathBuf },
    /// Print journaled alerts, newest first
    Alerts {
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("{{\"error\":{},\"status\":\"{}\"}}", json!(e.to_string()), e.kind());
            match e {
                ProctorError::InvalidInput(_) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: Cli) -> ProctorResult<()> {
    log::info!("{} analyzer v{}", APP_NAME, APP_VERSION);

    let config = match &cli.config {
        Some(path) => DetectionConfig::load(path)?,
        None => DetectionConfig::from_env()?,
    };
    let journal_path = cli.journal.unwrap_or_else(|| default_data_dir().join(JOURNAL_FILE));
    let journal = Arc::new(JsonlAlertJournal::open(&journal_path)?);
    log::debug!("Alert journal: {:?}", journal_path);
    let providers = ProviderSet::from_config(&config.models, &config.objects.person_label);
    let orchestrator = ProctoringOrchestrator::new(config, providers, Arc::new(MemoryFaceStore::new()), journal)?;
    let student = cli.student.as_deref();

    let output = match cli.command {
        Command::Head { image } => {
            let verdict = orchestrator.analyze_head(student, read(&image)?).await?;
            render(&verdict)
        }
        Command::Objects { image } => {
            let verdict = orchestrator.detect_objects(student, read(&image)?).await?;
            render(&verdict)
        }
        Command::Audio { payload } => {
            let mut submission: RawAudioSubmission = serde_json::from_slice(&read(&payload)?)
                .map_err(|e| ProctorError::invalid(format!("{:?} is not an audio payload: {}", payload, e)))?;
            if let Some(student) = student {
                submission.student_id = Some(student.to_string());
            }
            let verdict = orchestrator.analyze_audio(&submission).await?;
            render(&verdict)
        }
        Command::Alerts { limit } => {
            let filter = AlertFilter {
                student_id: student.map(StudentId::parse).transpose()?,
                limit,
                ..AlertFilter::default()
            };
            json!(orchestrator.alerts(&filter).await?)
        }
    };

    let pretty = serde_json::to_string_pretty(&output)
        .map_err(|e| ProctorError::Decode(format!("cannot render output: {}", e)))?;
    println!("{}", pretty);
    Ok(())
}

fn read(path: &Path) -> ProctorResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| ProctorError::invalid(format!("cannot read {:?}: {}", path, e)))
}

fn render<V: Verdict>(verdict: &V) -> serde_json::Value {
    json!({
        "signal_kind": verdict.signal_kind(),
        "status": verdict.status(),
        "label": verdict.label(),
        "details": verdict.details(),
    })
}
