use crate::errors::{GitError, ReplayError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Added on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl ProcessRequest {
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs one external command to completion. Only spawn failures are errors; a
/// non-zero exit is reported through [`ProcessOutput::exit_code`].
pub trait ProcessRunner: Send + Sync {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, GitError>;
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, ReplayError>;
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), ReplayError>;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, ReplayError> {
        std::fs::read_to_string(path)
            .map_err(|e| ReplayError::Io(format!("{}: {e}", path.display())))
    }
}

pub struct ProductionProcessRunner;

impl ProcessRunner for ProductionProcessRunner {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, GitError> {
        let mut cmd = std::process::Command::new(&request.program);
        cmd.args(&request.args);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let output = cmd.output().map_err(|e| GitError::Spawn {
            program: request.program.clone(),
            message: e.to_string(),
        })?;
        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), ReplayError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| ReplayError::Io(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub file_system: Arc<dyn FileSystem>,
    pub process_runner: Arc<dyn ProcessRunner>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            file_system: Arc::new(ProductionFileSystem),
            process_runner: Arc::new(ProductionProcessRunner),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, ReplayError> {
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| ReplayError::Io(format!("missing file {}", path.display())))
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    writes: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), ReplayError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }
}

/// Replays queued responses in order and records every request it was given.
#[derive(Default, Clone)]
pub struct FakeProcessRunner {
    responses: Arc<Mutex<Vec<Result<ProcessOutput, GitError>>>>,
    requests: Arc<Mutex<Vec<ProcessRequest>>>,
}

impl FakeProcessRunner {
    pub fn push_response(&self, output: Result<ProcessOutput, GitError>) {
        self.responses.lock().expect("responses lock").push(output);
    }

    pub fn requests(&self) -> Vec<ProcessRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(ProcessRequest::command_line)
            .collect()
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, GitError> {
        let program = request.program.clone();
        self.requests.lock().expect("requests lock").push(request);
        let mut responses = self.responses.lock().expect("responses lock");
        if responses.is_empty() {
            return Err(GitError::Spawn {
                program,
                message: "no fake response queued".to_string(),
            });
        }
        responses.remove(0)
    }
}
