use thiserror::Error;

/// Failure reported by the version-control collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitError {
    #[error("failed to spawn `{program}`: {message}")]
    Spawn { program: String, message: String },
    #[error("`{command}` exited with status {exit_code}: {stderr}")]
    Command {
        command: String,
        exit_code: i32,
        stderr: String,
    },
    /// The cherry-pick applied cleanly but left nothing to commit.
    #[error("cherry-pick of {commit} is now empty: {stderr}")]
    EmptyReplay { commit: String, stderr: String },
    #[error("unexpected output from `{command}`: {detail}")]
    Output { command: String, detail: String },
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("invalid phase transition: {0}")]
    Phase(String),
    #[error("cannot resolve replay range: {0}")]
    Resolution(String),
    #[error("cannot prepare branch `{branch}`: {reason}")]
    BaseSetup { branch: String, reason: String },
    #[error("cannot read metadata of {commit}: {source}")]
    Inspection { commit: String, source: GitError },
    #[error("replay of {commit} failed: {source}")]
    ReplayConflict { commit: String, source: GitError },
    #[error("submodule sync after {commit} failed: {source}")]
    SubmoduleSync { commit: String, source: GitError },
    #[error("amending replay of {commit} failed: {reason}")]
    Amendment { commit: String, reason: String },
    #[error("cannot restore checkout of `{target}`: {source}")]
    Restore { target: String, source: GitError },
}
