mod commands;

use std::fs;
use std::path::Path;
use std::process;

use clap::{CommandFactory, Parser};
use commands::{Cli, Commands};
use tracing::{error, info};
use tripwire::encoder::{self, TrapEncoder};
use tripwire::interview::InterviewScript;
use tripwire::processor::ExtractorRegistry;
use tripwire::telemetry::{self, LogFormat};
use tripwire::{ai, detection, load_config, Config, DiffEngine, Modification};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    if let Err(e) = telemetry::init(format) {
        eprintln!("{}", e);
    }

    let config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Error loading configuration: {}", e);
                process::exit(2);
            }
        },
        None => Config::default(),
    };

    let result = match args.command {
        Some(Commands::Diff {
            original,
            suggested,
        }) => run_diff(&config, &original, &suggested),
        Some(Commands::Suggest { original }) => run_suggest(&config, &original).await,
        Some(Commands::Encode {
            original,
            modifications,
            output,
        }) => run_encode(&config, &original, &modifications, &output),
        Some(Commands::Extract { file, visible }) => run_extract(&file, visible),
        Some(Commands::Score {
            submission,
            modifications,
        }) => run_score(&config, &submission, &modifications),
        Some(Commands::Verify { file, hash }) => run_verify(&file, &hash),
        Some(Commands::InterviewPrompt) => {
            let script = InterviewScript::standard(&config.interview.verdict_marker);
            println!("{}", script.agent_prompt());
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        process::exit(1);
    }
}

fn read_modifications(path: &Path) -> CliResult<Vec<Modification>> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

fn run_diff(config: &Config, original: &Path, suggested: &Path) -> CliResult<()> {
    let original = fs::read_to_string(original)?;
    let suggested = fs::read_to_string(suggested)?;

    let modifications = DiffEngine::new(config.diff.max_cells).compute(&original, &suggested)?;
    info!(count = modifications.len(), "Trap set computed");
    println!("{}", serde_json::to_string_pretty(&modifications)?);
    Ok(())
}

async fn run_suggest(config: &Config, original: &Path) -> CliResult<()> {
    let original = fs::read_to_string(original)?;
    let service = ai::from_config(&config.suggestion)?;

    let suggestion = service.suggest(&original).await?;
    let modifications =
        DiffEngine::new(config.diff.max_cells).compute(&original, &suggestion.text)?;
    info!(service = service.name(), count = modifications.len(), "Trap set computed");
    println!("{}", serde_json::to_string_pretty(&modifications)?);
    Ok(())
}

fn run_encode(
    config: &Config,
    original: &Path,
    modifications: &Path,
    output: &Path,
) -> CliResult<()> {
    let original = fs::read_to_string(original)?;
    let modifications = read_modifications(modifications)?;

    let document = TrapEncoder::new(config.encoder.clone()).encode(&original, &modifications)?;
    fs::write(output, &document.bytes)?;
    info!(
        pages = document.page_count,
        traps = modifications.len(),
        "Trap document written"
    );
    println!("{}", document.content_hash);
    Ok(())
}

fn run_extract(file: &Path, visible: bool) -> CliResult<()> {
    let bytes = fs::read(file)?;
    let text = if visible {
        encoder::decode_layers(&bytes)?.visible
    } else {
        let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        ExtractorRegistry::new().extract_named(&bytes, name)?
    };
    println!("{}", text);
    Ok(())
}

fn run_score(config: &Config, submission: &Path, modifications: &Path) -> CliResult<()> {
    let bytes = fs::read(submission)?;
    let name = submission
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let text = ExtractorRegistry::new().extract_named(&bytes, name)?;
    let modifications = read_modifications(modifications)?;

    let report = detection::analyze(&text, &modifications, &config.detection.options());
    if tripwire::decision::requires_interview(report.score, config.detection.threshold) {
        info!(score = report.score, "Score above threshold, interview required");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_verify(file: &Path, hash: &str) -> CliResult<()> {
    let bytes = fs::read(file)?;
    if encoder::verify_hash(&bytes, hash) {
        println!("ok");
        Ok(())
    } else {
        Err(format!("hash mismatch, actual {}", encoder::content_hash(&bytes)).into())
    }
}
