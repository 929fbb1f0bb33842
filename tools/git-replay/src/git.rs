use crate::errors::GitError;
use crate::logging::append_run_log;
use crate::runtime::{ProcessOutput, ProcessRequest, ProcessRunner};
use crate::types::{CommitMetadata, CommitRef, Identity, Signature};
use serde_json::json;
use std::path::{Path, PathBuf};

pub const DEFAULT_GIT_PROGRAM: &str = "git";
pub const DEFAULT_EMPTY_MARKER: &str = "cherry-pick is now empty";

const COMMITTER_NAME_ENV: &str = "GIT_COMMITTER_NAME";
const COMMITTER_EMAIL_ENV: &str = "GIT_COMMITTER_EMAIL";
const COMMITTER_DATE_ENV: &str = "GIT_COMMITTER_DATE";
const LOCALE_ENV: &str = "LC_ALL";

// Six NUL-separated fields; `--date=raw` keeps dates lossless so they can be fed back verbatim.
const METADATA_FORMAT: &str = "--pretty=format:%an%x00%ae%x00%ad%x00%cn%x00%ce%x00%cd";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CherryPickRequest {
    pub commit: CommitRef,
    pub mainline: Option<u32>,
    pub cross_reference: bool,
    /// Exported as `GIT_COMMITTER_*` for the pick.
    pub committer: Option<Signature>,
}

/// The version-control operations the replay needs. Every call is synchronous
/// and observes the effects of the previous one.
pub trait VersionControl {
    fn resolve_commit(&self, reference: &str) -> Result<CommitRef, GitError>;

    fn head(&self) -> Result<CommitRef, GitError> {
        self.resolve_commit("HEAD")
    }

    fn checkout(&self, reference: &str) -> Result<String, GitError>;
    fn create_branch(&self, name: &str) -> Result<String, GitError>;
    fn commit_metadata(&self, commit: &CommitRef) -> Result<CommitMetadata, GitError>;

    /// `<id> <parent>...` per line, newest first.
    fn log_with_parents(&self, relative: &str, upto: &str) -> Result<String, GitError>;

    /// Fails with [`GitError::EmptyReplay`] when the pick leaves nothing to commit.
    fn cherry_pick(&self, request: &CherryPickRequest) -> Result<String, GitError>;
    fn skip_cherry_pick(&self) -> Result<String, GitError>;

    /// Rewrites HEAD's author and committer without touching its tree or message.
    fn amend_signatures(
        &self,
        author: &Signature,
        committer: &Signature,
    ) -> Result<String, GitError>;

    fn update_submodules(&self) -> Result<String, GitError>;
}

pub struct GitClient<'a> {
    runner: &'a dyn ProcessRunner,
    cwd: PathBuf,
    program: String,
    empty_marker: String,
}

impl<'a> GitClient<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, cwd: impl AsRef<Path>) -> Self {
        Self {
            runner,
            cwd: cwd.as_ref().to_path_buf(),
            program: DEFAULT_GIT_PROGRAM.to_string(),
            empty_marker: DEFAULT_EMPTY_MARKER.to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_empty_marker(mut self, marker: impl Into<String>) -> Self {
        self.empty_marker = marker.into();
        self
    }

    fn request(&self, args: &[String], env: Vec<(String, String)>) -> ProcessRequest {
        // Output is matched against `empty_marker`, so git messages stay untranslated.
        let mut vars = vec![(LOCALE_ENV.to_string(), "C".to_string())];
        vars.extend(env);
        ProcessRequest {
            program: self.program.clone(),
            args: args.to_vec(),
            cwd: Some(self.cwd.clone()),
            env: vars,
        }
    }

    fn spawn(
        &self,
        args: &[String],
        env: Vec<(String, String)>,
    ) -> Result<(ProcessRequest, ProcessOutput), GitError> {
        let request = self.request(args, env);
        let output = self.runner.run(request.clone()).inspect_err(|err| {
            append_run_log(
                "error",
                "git.command.spawn_failed",
                json!({
                    "cwd": self.cwd.display().to_string(),
                    "command": request.command_line(),
                    "error": err.to_string()
                }),
            );
        })?;
        Ok((request, output))
    }

    fn run_with_env(
        &self,
        args: &[String],
        env: Vec<(String, String)>,
    ) -> Result<String, GitError> {
        let (request, out) = self.spawn(args, env)?;
        if out.exit_code != 0 {
            return Err(self.command_failed(&request, out));
        }
        append_run_log(
            "debug",
            "git.command.succeeded",
            json!({
                "cwd": self.cwd.display().to_string(),
                "command": request.command_line()
            }),
        );
        Ok(out.stdout.trim_end().to_string())
    }

    fn run<I, S>(&self, args: I) -> Result<String, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args = args
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>();
        self.run_with_env(&args, Vec::new())
    }

    fn command_failed(&self, request: &ProcessRequest, out: ProcessOutput) -> GitError {
        append_run_log(
            "error",
            "git.command.failed",
            json!({
                "cwd": self.cwd.display().to_string(),
                "command": request.command_line(),
                "exit_code": out.exit_code,
                "stderr": out.stderr
            }),
        );
        GitError::Command {
            command: request.command_line(),
            exit_code: out.exit_code,
            stderr: out.stderr.trim_end().to_string(),
        }
    }
}

impl VersionControl for GitClient<'_> {
    fn resolve_commit(&self, reference: &str) -> Result<CommitRef, GitError> {
        let target = format!("{reference}^{{commit}}");
        let out = self.run(["rev-parse", "--verify", target.as_str()])?;
        let id = out.trim();
        if id.is_empty() {
            return Err(GitError::Output {
                command: format!("rev-parse --verify {target}"),
                detail: "no commit id printed".to_string(),
            });
        }
        Ok(CommitRef::new(id))
    }

    fn checkout(&self, reference: &str) -> Result<String, GitError> {
        self.run(["checkout", reference])
    }

    fn create_branch(&self, name: &str) -> Result<String, GitError> {
        self.run(["checkout", "-b", name])
    }

    fn commit_metadata(&self, commit: &CommitRef) -> Result<CommitMetadata, GitError> {
        let args = ["log", "-1", "--date=raw", METADATA_FORMAT, commit.as_str()];
        let out = self.run(args)?;
        parse_metadata(&out).ok_or_else(|| GitError::Output {
            command: format!("log -1 {commit}"),
            detail: format!("expected 6 metadata fields, got {out:?}"),
        })
    }

    fn log_with_parents(&self, relative: &str, upto: &str) -> Result<String, GitError> {
        let range = format!("{relative}..{upto}");
        self.run([
            "log",
            "--topo-order",
            "--no-decorate",
            "--pretty=format:%H %P",
            range.as_str(),
        ])
    }

    fn cherry_pick(&self, request: &CherryPickRequest) -> Result<String, GitError> {
        let mut args = vec!["cherry-pick".to_string()];
        if let Some(mainline) = request.mainline {
            args.push("-m".to_string());
            args.push(mainline.to_string());
        }
        if request.cross_reference {
            args.push("-x".to_string());
        }
        args.push(request.commit.to_string());
        let env = request
            .committer
            .as_ref()
            .map(committer_env)
            .unwrap_or_default();

        let (process, out) = self.spawn(&args, env)?;
        if out.exit_code == 0 {
            append_run_log(
                "debug",
                "git.cherry_pick.applied",
                json!({
                    "cwd": self.cwd.display().to_string(),
                    "commit": request.commit.as_str(),
                    "mainline": request.mainline
                }),
            );
            return Ok(out.stdout.trim_end().to_string());
        }
        if out.stderr.contains(&self.empty_marker) || out.stdout.contains(&self.empty_marker) {
            append_run_log(
                "warn",
                "git.cherry_pick.empty",
                json!({
                    "cwd": self.cwd.display().to_string(),
                    "commit": request.commit.as_str(),
                    "exit_code": out.exit_code
                }),
            );
            return Err(GitError::EmptyReplay {
                commit: request.commit.to_string(),
                stderr: out.stderr.trim_end().to_string(),
            });
        }
        Err(self.command_failed(&process, out))
    }

    fn skip_cherry_pick(&self) -> Result<String, GitError> {
        self.run(["cherry-pick", "--skip"])
    }

    fn amend_signatures(
        &self,
        author: &Signature,
        committer: &Signature,
    ) -> Result<String, GitError> {
        let args = [
            "commit".to_string(),
            "--amend".to_string(),
            "--no-edit".to_string(),
            format!("--author={}", author.identity),
            format!("--date={}", author.date),
        ];
        self.run_with_env(&args, committer_env(committer))
    }

    fn update_submodules(&self) -> Result<String, GitError> {
        self.run(["submodule", "update"])
    }
}

fn committer_env(committer: &Signature) -> Vec<(String, String)> {
    vec![
        (
            COMMITTER_NAME_ENV.to_string(),
            committer.identity.name.clone(),
        ),
        (
            COMMITTER_EMAIL_ENV.to_string(),
            committer.identity.email.clone(),
        ),
        (COMMITTER_DATE_ENV.to_string(), committer.date.clone()),
    ]
}

fn parse_metadata(raw: &str) -> Option<CommitMetadata> {
    let fields = raw.split('\0').collect::<Vec<_>>();
    let [an, ae, ad, cn, ce, cd] = fields.as_slice() else {
        return None;
    };
    Some(CommitMetadata {
        author: Signature {
            identity: Identity::new(*an, *ae),
            date: ad.to_string(),
        },
        committer: Signature {
            identity: Identity::new(*cn, *ce),
            date: cd.to_string(),
        },
    })
}
