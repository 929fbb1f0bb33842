use crate::errors::ReplayError;
use crate::git::{DEFAULT_EMPTY_MARKER, DEFAULT_GIT_PROGRAM};
use crate::logging::{DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::runtime::{FileSystem, ProcessRequest, ProcessRunner};
use crate::types::RuntimeScope;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub git: GitConfig,
    pub replay: ReplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitConfig {
    pub program: String,
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayConfig {
    pub cross_reference: bool,
    pub empty_marker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            git: GitConfig {
                program: DEFAULT_GIT_PROGRAM.to_string(),
                working_dir: None,
            },
            replay: ReplayConfig {
                cross_reference: true,
                empty_marker: DEFAULT_EMPTY_MARKER.to_string(),
            },
            logging: LoggingConfig {
                path: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    git: Option<PartialGitConfig>,
    replay: Option<PartialReplayConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialGitConfig {
    program: Option<String>,
    working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialReplayConfig {
    cross_reference: Option<bool>,
    empty_marker: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
    process_runner: &dyn ProcessRunner,
) -> Result<(AppConfig, RuntimeScope), ReplayError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| ReplayError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides, process_cwd);
    validate_config(&cfg)?;

    let scope = resolve_scope(process_cwd, &cfg, overrides, process_runner);
    Ok((cfg, scope))
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(git) = partial.git {
        if let Some(program) = git.program {
            cfg.git.program = program;
        }
        if let Some(working_dir) = git.working_dir {
            cfg.git.working_dir = Some(working_dir);
        }
    }

    if let Some(replay) = partial.replay {
        if let Some(value) = replay.cross_reference {
            cfg.replay.cross_reference = value;
        }
        if let Some(value) = replay.empty_marker {
            cfg.replay.empty_marker = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.logging.path = Some(path);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }
}

/// CLI paths are relative to where the operator ran the command, not the repository.
fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides, process_cwd: &Path) {
    if let Some(log_file) = &overrides.log_file {
        cfg.logging.path = Some(absolutize_path(process_cwd, log_file));
    }
}

pub fn resolve_scope(
    process_cwd: &Path,
    cfg: &AppConfig,
    overrides: &CliOverrides,
    process_runner: &dyn ProcessRunner,
) -> RuntimeScope {
    let process_cwd = process_cwd.to_path_buf();
    let explicit = overrides
        .working_dir
        .as_ref()
        .or(cfg.git.working_dir.as_ref())
        .map(|path| absolutize_path(&process_cwd, path));
    let repo_root = detect_repo_root(
        explicit.as_deref().unwrap_or(&process_cwd),
        &cfg.git.program,
        process_runner,
    );

    let working_dir = explicit
        .or_else(|| repo_root.clone())
        .unwrap_or_else(|| process_cwd.clone());

    RuntimeScope {
        process_cwd,
        repo_root,
        working_dir,
    }
}

pub fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn detect_repo_root(
    dir: &Path,
    program: &str,
    process_runner: &dyn ProcessRunner,
) -> Option<PathBuf> {
    let output = process_runner
        .run(ProcessRequest {
            program: program.to_string(),
            args: vec!["rev-parse".to_string(), "--show-toplevel".to_string()],
            cwd: Some(dir.to_path_buf()),
            env: Vec::new(),
        })
        .ok()?;

    if output.exit_code != 0 {
        return None;
    }

    let trimmed = output.stdout.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(PathBuf::from(trimmed))
}

fn validate_config(cfg: &AppConfig) -> Result<(), ReplayError> {
    if cfg.git.program.trim().is_empty() {
        return Err(ReplayError::InvalidConfig(
            "git.program must not be empty".to_string(),
        ));
    }

    if cfg.replay.empty_marker.trim().is_empty() {
        return Err(ReplayError::InvalidConfig(
            "replay.empty_marker must not be empty".to_string(),
        ));
    }

    if cfg.logging.max_payload_bytes == 0 {
        return Err(ReplayError::InvalidConfig(
            "logging.max_payload_bytes must be greater than zero".to_string(),
        ));
    }

    Ok(())
}
