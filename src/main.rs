use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facematch::protocol::{Command, Request};
use facematch::server::Handled;
use facematch::{config, model, Server};
use log::{error, info};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "facematch")]
#[command(version, about = "Face embedding extraction and matching worker")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the persistent worker: JSON requests on stdin, responses on stdout
    Serve {
        /// Worker threads (overrides the config file)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Extract the single face of a registration selfie
    ExtractSelfie { image: PathBuf },
    /// Extract every face of an event photo
    ExtractPhoto { image: PathBuf },
    /// Extract the most confident face of an image
    ExtractEmbedding { image: PathBuf },
    /// Match a query embedding against photos (both as JSON)
    Match {
        embedding: String,
        photos: String,
        threshold: Option<f64>,
        /// all-matches or best-per-photo
        #[arg(short, long)]
        mode: Option<String>,
    },
    /// Match using a JSON input file, removed afterwards
    MatchFromFile { file: PathBuf },
    /// Compare two embeddings (JSON arrays)
    Compare { first: String, second: String },
    /// Open config file in editor
    Config {
        /// Print the effective configuration instead
        #[arg(long)]
        print: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .format_timestamp(None)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut cfg = config::load_config(cli.config.as_deref())?;

    let (command, args) = match cli.command {
        Commands::Serve { workers } => {
            if let Some(workers) = workers {
                cfg.server.workers = workers;
            }
            return serve(cfg);
        }
        Commands::Config { print } => return open_config(&cfg, cli.config, print),
        Commands::ExtractSelfie { image } => (Command::ExtractSelfie, vec![path_arg(&image)]),
        Commands::ExtractPhoto { image } => (Command::ExtractPhoto, vec![path_arg(&image)]),
        Commands::ExtractEmbedding { image } => {
            (Command::ExtractEmbedding, vec![path_arg(&image)])
        }
        Commands::Match {
            embedding,
            photos,
            threshold,
            mode,
        } => (
            Command::Match,
            vec![
                Value::from(embedding),
                Value::from(photos),
                threshold.map(Value::from).unwrap_or(Value::Null),
                mode.map(Value::from).unwrap_or(Value::Null),
            ],
        ),
        Commands::MatchFromFile { file } => (Command::MatchFromFile, vec![path_arg(&file)]),
        Commands::Compare { first, second } => {
            (Command::Compare, vec![Value::from(first), Value::from(second)])
        }
    };

    one_shot(cfg, command, args)
}

fn path_arg(path: &std::path::Path) -> Value {
    Value::from(path.to_string_lossy().into_owned())
}

/// Run one request and print its result object as the only stdout line.
fn one_shot(cfg: config::Config, command: Command, args: Vec<Value>) -> Result<ExitCode> {
    let model = model::onnx_model(&cfg);
    let server = Server::new(cfg, model);
    let request = Request {
        request_id: Value::Null,
        command,
        args,
    };

    let handled = server.handle(&request);
    let line = serde_json::to_string(&handled.response().result)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    stdout.flush()?;

    Ok(match handled {
        Handled::Fatal(..) => ExitCode::from(2),
        Handled::Reply(r) if r.result.success => ExitCode::SUCCESS,
        Handled::Reply(_) => ExitCode::from(1),
    })
}

fn serve(cfg: config::Config) -> Result<ExitCode> {
    let model = model::onnx_model(&cfg);
    let server = Server::new(cfg, model);
    let models = &server.config().models;
    info!(
        "models: detector={} recognizer={}",
        models.detector.display(),
        models.recognizer.display()
    );

    let stdin = io::stdin().lock();
    let stdout = io::stdout();
    match server.run(stdin, stdout) {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(e) if e.is_fatal() => {
            error!("{}", e);
            Ok(ExitCode::from(2))
        }
        Err(e) => Err(e).context("request loop failed"),
    }
}

fn open_config(cfg: &config::Config, path: Option<PathBuf>, print: bool) -> Result<ExitCode> {
    if print {
        print!("{}", toml::to_string_pretty(cfg)?);
        return Ok(ExitCode::SUCCESS);
    }

    let config_path = path.unwrap_or_else(|| config::CONFIG_PATH.clone());
    if !config_path.exists() {
        config::save_config(cfg, Some(&config_path))
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(ExitCode::SUCCESS)
}
