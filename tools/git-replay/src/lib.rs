pub mod config;
pub mod engine;
pub mod errors;
pub mod fsm;
pub mod git;
pub mod identity;
pub mod logging;
pub mod resolver;
pub mod runtime;
pub mod types;

use clap::{error::ErrorKind, Parser};
use config::{absolutize_path, load_config, AppConfig, CliOverrides};
use engine::{ReplayEngine, ReplayOptions};
use errors::ReplayError;
use git::GitClient;
use logging::{append_run_log, install_run_logger, JsonlLogger};
use runtime::ProductionRuntime;
use serde_json::json;
use std::path::{Path, PathBuf};
use types::{Identity, ReplayContext, RuntimeScope};

#[derive(Debug, Clone, Parser)]
#[command(name = "git-replay")]
#[command(about = "Replay a commit range onto a new branch, rewriting one mis-recorded identity")]
pub struct Cli {
    /// TOML file with [git], [replay] and [logging] settings
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Repository to operate in (defaults to the enclosing repository)
    #[arg(long)]
    pub working_dir: Option<PathBuf>,
    /// Append a JSONL run log here
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    /// Name recorded by mistake
    #[arg(value_name = "BAD_NAME")]
    pub bad_name: String,
    /// Email recorded by mistake
    #[arg(value_name = "BAD_EMAIL")]
    pub bad_email: String,
    /// Name to record instead
    #[arg(value_name = "GOOD_NAME")]
    pub good_name: String,
    /// Email to record instead
    #[arg(value_name = "GOOD_EMAIL")]
    pub good_email: String,
    /// Replay commits after this reference (exclusive)
    #[arg(value_name = "RELATIVE")]
    pub relative: String,
    /// Replay commits up to this reference (inclusive); checked out again when done
    #[arg(value_name = "UPTO")]
    pub upto: String,
    /// Branch to create and replay onto
    #[arg(value_name = "INTO")]
    pub into: String,
}

impl Cli {
    pub fn context(&self) -> Result<ReplayContext, ReplayError> {
        ReplayContext::new(
            Identity::new(&self.bad_name, &self.bad_email),
            Identity::new(&self.good_name, &self.good_email),
            &self.relative,
            &self.upto,
            &self.into,
        )
    }
}

pub fn run() -> Result<i32, ReplayError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| ReplayError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, ReplayError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(ReplayError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        working_dir: cli.working_dir.clone(),
        log_file: cli.log_file.clone(),
    };
    let (cfg, scope) = load_config(
        &overrides,
        cwd,
        runtime.file_system.as_ref(),
        runtime.process_runner.as_ref(),
    )?;
    install_logger(&cfg, &scope);
    let context = cli.context()?;

    let git = GitClient::new(runtime.process_runner.as_ref(), &scope.working_dir)
        .with_program(&cfg.git.program)
        .with_empty_marker(&cfg.replay.empty_marker);
    let options = ReplayOptions {
        cross_reference: cfg.replay.cross_reference,
    };
    let engine = ReplayEngine::new(&git, runtime.terminal.as_ref(), &context, options);
    let report = engine.run().inspect_err(|error| {
        append_run_log(
            "error",
            "replay.run.aborted",
            json!({
                "into": context.into,
                "error": error.to_string()
            }),
        );
    })?;

    runtime.terminal.write_line(&format!(
        "replayed {} commit(s) onto `{}` from base {} ({} skipped as empty)",
        report.replayed.len(), context.into, report.base.short(), report.skipped().len()
    ))?;
    Ok(0)
}

fn install_logger(cfg: &AppConfig, scope: &RuntimeScope) {
    let Some(path) = &cfg.logging.path else {
        return;
    };
    let mut logger = JsonlLogger::new(absolutize_path(&scope.working_dir, path));
    logger.max_payload_bytes = cfg.logging.max_payload_bytes;
    logger.budget_bytes = cfg.logging.budget_bytes;
    install_run_logger(logger);
}
